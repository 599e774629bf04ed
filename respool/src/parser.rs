use std::io::{self, BufRead, Read};

use crate::{
    errors::{ErrorKind, RespError, ServerError},
    types::{RespResult, Value},
};

const MAX_RECURSE_DEPTH: usize = 100;

/// Largest bulk string accepted, matching the server's default
/// `proto-max-bulk-len`.
const MAX_BULK_LEN: u64 = 512 * 1024 * 1024;

fn parse_error(desc: &'static str, line: &[u8]) -> RespError {
    RespError::from((
        ErrorKind::ParseError,
        desc,
        String::from_utf8_lossy(line).into_owned(),
    ))
}

/// A blocking RESP2 reply parser.
///
/// The parser keeps a line buffer between calls so that reading many
/// replies off one connection does not allocate a new buffer per line.
#[derive(Default)]
pub struct Parser {
    line: Vec<u8>,
}

impl Parser {
    /// Creates a new parser.
    pub fn new() -> Parser {
        Parser::default()
    }

    /// Parses exactly one reply from `reader`.
    ///
    /// A reader that reaches end of stream before a full reply was read
    /// yields an `UnexpectedEof` I/O error.
    pub fn parse_value<R: BufRead>(&mut self, reader: &mut R) -> RespResult<Value> {
        self.parse_nested(reader, 0)
    }

    fn parse_nested<R: BufRead>(&mut self, reader: &mut R, depth: usize) -> RespResult<Value> {
        self.read_line(reader)?;
        let Some((&prefix, rest)) = self.line.split_first() else {
            return Err(parse_error("Empty reply line", &[]));
        };

        match prefix {
            b'+' => {
                if rest == b"OK" {
                    return Ok(Value::Okay);
                }
                Ok(Value::SimpleString(
                    String::from_utf8_lossy(rest).into_owned(),
                ))
            }
            b'-' => Ok(Value::ServerError(ServerError::from_line(
                &String::from_utf8_lossy(rest),
            ))),
            b':' => Ok(Value::Int(parse_integer(rest)?)),
            b'$' => {
                let len = parse_integer(rest)?;
                if len < 0 {
                    return Ok(Value::Nil);
                }
                let len = len as u64;
                if len > MAX_BULK_LEN {
                    return Err(parse_error("Bulk string length out of range", &self.line));
                }
                let mut data = Vec::new();
                reader.by_ref().take(len + 2).read_to_end(&mut data)?;
                if (data.len() as u64) < len + 2 {
                    fail!(io::Error::from(io::ErrorKind::UnexpectedEof));
                }
                if !data.ends_with(b"\r\n") {
                    return Err(parse_error("Bulk string is not terminated", &data));
                }
                data.truncate(data.len() - 2);
                Ok(Value::BulkString(data))
            }
            b'*' => {
                let len = parse_integer(rest)?;
                if len < 0 {
                    return Ok(Value::Nil);
                }
                if depth >= MAX_RECURSE_DEPTH {
                    return Err(parse_error("Maximum recursion depth exceeded", &self.line));
                }
                let mut items = Vec::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    items.push(self.parse_nested(reader, depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            _ => Err(parse_error("Unexpected reply type", &self.line)),
        }
    }

    fn read_line<R: BufRead>(&mut self, reader: &mut R) -> RespResult<()> {
        self.line.clear();
        let read = reader.read_until(b'\n', &mut self.line)?;
        if read == 0 {
            fail!(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        if !self.line.ends_with(b"\r\n") {
            if self.line.ends_with(b"\n") {
                return Err(parse_error("Reply line is not CRLF terminated", &self.line));
            }
            fail!(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        self.line.truncate(self.line.len() - 2);
        Ok(())
    }
}

fn parse_integer(bytes: &[u8]) -> RespResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| parse_error("Expected an integer", bytes))
}

/// Parses a single reply from a byte slice.
pub fn parse_resp_value(bytes: &[u8]) -> RespResult<Value> {
    let mut parser = Parser::new();
    parser.parse_value(&mut &bytes[..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerErrorKind;

    #[test]
    fn parses_status_replies() {
        assert_eq!(parse_resp_value(b"+OK\r\n").unwrap(), Value::Okay);
        assert_eq!(
            parse_resp_value(b"+PONG\r\n").unwrap(),
            Value::SimpleString("PONG".into())
        );
    }

    #[test]
    fn parses_error_replies() {
        let value = parse_resp_value(b"-READONLY You can't write against a read only replica.\r\n")
            .unwrap();
        let err = value.extract_error().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerError(ServerErrorKind::ReadOnly));
    }

    #[test]
    fn parses_nested_arrays() {
        let value = parse_resp_value(b"*3\r\n:1\r\n$3\r\nfoo\r\n*1\r\n$-1\r\n").unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Int(1),
                Value::BulkString(b"foo".to_vec()),
                Value::Array(vec![Value::Nil]),
            ])
        );
    }

    #[test]
    fn binary_bulk_strings_are_kept() {
        let value = parse_resp_value(b"$4\r\na\r\nb\r\n").unwrap();
        assert_eq!(value, Value::BulkString(b"a\r\nb".to_vec()));
    }

    #[test]
    fn truncated_input_is_an_eof() {
        let err = parse_resp_value(b"$10\r\nabc").unwrap_err();
        assert!(err.is_connection_dropped());

        let err = parse_resp_value(b"").unwrap_err();
        assert!(err.is_connection_dropped());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_resp_value(b"?what\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);

        let err = parse_resp_value(b":12a\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn oversized_bulk_length_is_a_parse_error() {
        let err = parse_resp_value(b"$9223372036854775000\r\nabc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);

        let err = parse_resp_value(b"$536870913\r\nabc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_max_recursion_depth() {
        let mut bytes = b"*1\r\n".repeat(200_000);
        bytes.extend_from_slice(b":1\r\n");
        let err = parse_resp_value(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);

        let mut bytes = b"*1\r\n".repeat(MAX_RECURSE_DEPTH);
        bytes.extend_from_slice(b":1\r\n");
        assert!(parse_resp_value(&bytes).is_ok());
    }

    #[test]
    fn replies_are_read_one_at_a_time() {
        let mut parser = Parser::new();
        let mut input: &[u8] = b"+OK\r\n:7\r\n";
        assert_eq!(parser.parse_value(&mut input).unwrap(), Value::Okay);
        assert_eq!(parser.parse_value(&mut input).unwrap(), Value::Int(7));
        assert!(input.is_empty());
    }
}
