use std::fmt;

use crate::errors::{RespError, ServerError};

/// Library generic result type.
pub type RespResult<T> = Result<T, RespError>;

/// Internal low-level reply value.
///
/// Only the RESP2 shapes are represented. Error replies are kept as values so
/// that a batch of replies can be inspected one by one; use
/// [`Value::extract_error`] to turn them into a [`RespError`].
#[derive(PartialEq, Clone)]
pub enum Value {
    /// A nil response from the server.
    Nil,
    /// An integer response.
    Int(i64),
    /// Arbitrary binary data, usually represents a binary-safe string.
    BulkString(Vec<u8>),
    /// A response containing an array with more data.
    Array(Vec<Value>),
    /// A simple string response, without line breaks and not binary safe.
    SimpleString(String),
    /// A status response which represents the string "OK".
    Okay,
    /// An error reply.
    ServerError(ServerError),
}

impl Value {
    /// Returns the value, or the server error it carries as an `Err`.
    pub fn extract_error(self) -> RespResult<Self> {
        match self {
            Self::ServerError(err) => Err(err.into()),
            _ => Ok(self),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::Nil => write!(fmt, "nil"),
            Value::Int(val) => write!(fmt, "int({val:?})"),
            Value::BulkString(ref val) => match std::str::from_utf8(val) {
                Ok(x) => write!(fmt, "bulk-string('{x:?}')"),
                Err(_) => write!(fmt, "binary-data({val:?})"),
            },
            Value::Array(ref values) => write!(fmt, "array({values:?})"),
            Value::Okay => write!(fmt, "ok"),
            Value::SimpleString(ref s) => write!(fmt, "simple-string({s:?})"),
            Value::ServerError(ref err) => write!(fmt, "server-error({err})"),
        }
    }
}
