//! Testing support
//!
//! This crate provides [`MockDriver`], a [`ConnectionDriver`] that serves
//! canned replies and records everything written to it, and [`MockServer`],
//! an in-process server that speaks enough of the protocol to exercise
//! connection initialization, reply modes and TLS without a real server.
//!
//! # Example
//!
//! ```rust
//! use respool::{cmd, Connection, Value};
//! use respool_test::MockDriver;
//!
//! let driver = MockDriver::new(["+PONG\r\n"]);
//! let handle = driver.handle();
//! let mut con = Connection::from_driver(driver);
//!
//! let reply = con.req_command(&cmd("PING")).unwrap();
//! assert_eq!(reply, Some(Value::SimpleString("PONG".into())));
//! assert_eq!(handle.commands(), vec![vec!["PING".to_string()]]);
//! assert_eq!(handle.writes(), 1);
//! ```

pub mod server;

use std::{
    collections::VecDeque,
    io::{self, BufRead},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use respool::{parse_resp_value, ConnectionDriver, Parser, RespResult, Value};

pub use server::{MockServer, MockServerBuilder};

/// Reads one request, an array of bulk strings, off `reader`.
///
/// Returns `Ok(None)` on a clean end of stream.
pub fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Ok(None);
    }
    let count = parse_header(&line, b'*')?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_until(b'\n', &mut line)?;
        let len = parse_header(&line, b'$')?;
        let mut arg = vec![0; len + 2];
        reader.read_exact(&mut arg)?;
        arg.truncate(len);
        args.push(arg);
    }
    Ok(Some(args))
}

fn parse_header(line: &[u8], prefix: u8) -> io::Result<usize> {
    let invalid = || {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad request line: {:?}", String::from_utf8_lossy(line)),
        )
    };
    let body = line
        .strip_prefix(&[prefix])
        .and_then(|rest| rest.strip_suffix(b"\r\n"))
        .ok_or_else(invalid)?;
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)
}

fn lossy(args: Vec<Vec<u8>>) -> Vec<String> {
    args.into_iter()
        .map(|arg| String::from_utf8_lossy(&arg).into_owned())
        .collect()
}

#[derive(Default)]
struct DriverLog {
    writes: Vec<Vec<u8>>,
    reads: usize,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    closed: bool,
}

/// A view on what a [`MockDriver`] saw, usable after the driver was moved
/// into a connection.
#[derive(Clone)]
pub struct MockDriverHandle {
    log: Arc<Mutex<DriverLog>>,
}

impl MockDriverHandle {
    fn lock(&self) -> MutexGuard<'_, DriverLog> {
        self.log.lock().unwrap()
    }

    /// Number of separate writes, i.e. round trips started.
    pub fn writes(&self) -> usize {
        self.lock().writes.len()
    }

    /// Number of replies read.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Every command written, decoded, in order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands_per_write().into_iter().flatten().collect()
    }

    /// The commands written, grouped by the write that carried them.
    pub fn commands_per_write(&self) -> Vec<Vec<Vec<String>>> {
        self.lock()
            .writes
            .iter()
            .map(|bytes| {
                let mut reader = &bytes[..];
                let mut commands = Vec::new();
                while let Some(args) = read_request(&mut reader).unwrap() {
                    commands.push(lossy(args));
                }
                commands
            })
            .collect()
    }

    /// The last read timeout set.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.lock().read_timeout
    }

    /// The last write timeout set.
    pub fn write_timeout(&self) -> Option<Duration> {
        self.lock().write_timeout
    }

    /// Returns true once the driver was dropped.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// A [`ConnectionDriver`] replaying canned replies.
///
/// Replies are raw protocol bytes, one entry per reply. Reading past the
/// last reply fails like a closed socket would.
pub struct MockDriver {
    replies: VecDeque<Vec<u8>>,
    log: Arc<Mutex<DriverLog>>,
    write_error: Option<io::ErrorKind>,
    open: bool,
}

impl MockDriver {
    /// Creates a driver answering with `replies`, in order.
    pub fn new<I, B>(replies: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        MockDriver {
            replies: replies.into_iter().map(|r| r.as_ref().to_vec()).collect(),
            log: Arc::default(),
            write_error: None,
            open: true,
        }
    }

    /// Makes every write fail with `kind`.
    pub fn failing_writes(mut self, kind: io::ErrorKind) -> Self {
        self.write_error = Some(kind);
        self
    }

    /// Returns a handle for inspecting the driver later on.
    pub fn handle(&self) -> MockDriverHandle {
        MockDriverHandle {
            log: self.log.clone(),
        }
    }
}

impl ConnectionDriver for MockDriver {
    fn set_write_timeout(&self, dur: Option<Duration>) -> RespResult<()> {
        self.log.lock().unwrap().write_timeout = dur;
        Ok(())
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> RespResult<()> {
        self.log.lock().unwrap().read_timeout = dur;
        Ok(())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> RespResult<()> {
        if let Some(kind) = self.write_error {
            self.open = false;
            return Err(io::Error::from(kind).into());
        }
        if !self.open {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        self.log.lock().unwrap().writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_value(&mut self, _parser: &mut Parser) -> RespResult<Value> {
        let Some(reply) = self.replies.pop_front() else {
            self.open = false;
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        };
        self.log.lock().unwrap().reads += 1;
        parse_resp_value(&reply)
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for MockDriver {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.closed = true;
        }
    }
}
