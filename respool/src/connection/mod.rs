use std::{fmt, time::Duration};

use crate::{
    cmd::cmd, pipeline::encode_pipeline, Cmd, ErrorKind, Parser, Pipeline, RespError, RespResult,
    Value,
};

pub(crate) mod info;
pub mod io;
pub(crate) mod reply_mode;

pub use info::{InitOptions, TcpSettings, DEFAULT_PORT, DEFAULT_TIMEOUT};
use io::{ActualConnection, ConnectionDriver};
pub use reply_mode::{ReplyMode, ReplyOp, Transition};

fn closed_error() -> RespError {
    RespError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
}

/// A single connection to a node.
///
/// The connection owns its transport exclusively and tracks the server's
/// reply mode, reading exactly as many replies as the server sends. Any I/O
/// or parse failure closes the connection: once a read went wrong there is no
/// telling which reply the next read would return.
///
/// A connection must be in [`ReplyMode::On`] when it is handed back to a
/// pool, otherwise the next borrower inherits a server that does not answer.
pub struct Connection<D: ConnectionDriver = ActualConnection> {
    con: Option<D>,
    parser: Parser,
    reply_mode: ReplyMode,
}

impl<D: ConnectionDriver> fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("open", &self.is_open())
            .field("reply_mode", &self.reply_mode)
            .finish()
    }
}

impl<D: ConnectionDriver> Connection<D> {
    /// Wraps an already established driver. No command is sent.
    pub fn from_driver(driver: D) -> Self {
        Connection {
            con: Some(driver),
            parser: Parser::new(),
            reply_mode: ReplyMode::On,
        }
    }

    /// The reply mode the server is believed to be in.
    pub fn reply_mode(&self) -> ReplyMode {
        self.reply_mode
    }

    /// Returns true until the connection is closed or its transport failed.
    pub fn is_open(&self) -> bool {
        self.con.as_ref().map(|c| c.is_open()).unwrap_or_default()
    }

    /// Releases the transport. Closing a closed connection does nothing.
    pub fn close(&mut self) {
        if self.con.take().is_some() {
            log::trace!("Connection closed");
        }
    }

    /// Sets the write timeout for the connection.
    ///
    /// If the provided value is `None`, writes block indefinitely. It is an
    /// error to pass the zero `Duration` to this method.
    pub fn set_write_timeout(&self, dur: Option<Duration>) -> RespResult<()> {
        match self.con.as_ref() {
            Some(con) => con.set_write_timeout(dur),
            None => Err(closed_error()),
        }
    }

    /// Sets the read timeout for the connection.
    ///
    /// If the provided value is `None`, reads block indefinitely. It is an
    /// error to pass the zero `Duration` to this method.
    pub fn set_read_timeout(&self, dur: Option<Duration>) -> RespResult<()> {
        match self.con.as_ref() {
            Some(con) => con.set_read_timeout(dur),
            None => Err(closed_error()),
        }
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> RespResult<()> {
        let result = match self.con.as_mut() {
            Some(con) => con.send_bytes(bytes),
            None => Err(closed_error()),
        };
        if result.is_err() {
            self.close();
        }
        result
    }

    fn read_reply(&mut self) -> RespResult<Value> {
        let result = match self.con.as_mut() {
            Some(con) => con.read_value(&mut self.parser),
            None => Err(closed_error()),
        };
        if result.is_err() {
            self.close();
        }
        result
    }

    fn apply(&mut self, transition: Transition) {
        if transition.next != self.reply_mode {
            log::trace!(
                "Reply mode changed from {:?} to {:?}",
                self.reply_mode,
                transition.next
            );
        }
        self.reply_mode = transition.next;
    }

    /// Sends a command and reads its reply if the server will send one.
    ///
    /// Error replies are returned as [`Value::ServerError`]. `None` means
    /// the server was told not to answer. A `CLIENT REPLY ON` sent while
    /// replies are already on is not written and answers `OK` locally.
    pub(crate) fn request(&mut self, cmd: &Cmd) -> RespResult<Option<Value>> {
        let op = ReplyOp::of(cmd);
        let transition = self.reply_mode.transition(op);
        if !transition.send {
            self.apply(transition);
            return Ok((op == ReplyOp::ReplyOn).then_some(Value::Okay));
        }

        self.send_bytes(&cmd.get_packed_command())?;
        self.apply(transition);
        if !transition.read_reply {
            return Ok(None);
        }
        self.read_reply().map(Some)
    }

    /// Sends a command and returns its reply, or `None` if the reply mode
    /// suppresses it.
    ///
    /// Commands that change the reply mode (`CLIENT REPLY ON|OFF|SKIP`) are
    /// recognized and tracked, whichever way they are issued.
    pub fn req_command(&mut self, cmd: &Cmd) -> RespResult<Option<Value>> {
        self.request(cmd)?.map(Value::extract_error).transpose()
    }

    /// Writes all commands of the pipeline at once, then reads the replies
    /// the server will send, in order.
    ///
    /// The result has one entry per command: `None` where no reply is sent,
    /// and error replies kept as [`Value::ServerError`] so that every reply is
    /// consumed even if one of them failed.
    pub fn req_pipeline(&mut self, pipeline: &Pipeline) -> RespResult<Vec<Option<Value>>> {
        let mut mode = self.reply_mode;
        let mut plan = Vec::with_capacity(pipeline.len());
        for cmd in pipeline.cmd_iter() {
            let op = ReplyOp::of(cmd);
            let transition = mode.transition(op);
            plan.push((op, transition));
            mode = transition.next;
        }
        let packed = encode_pipeline(
            pipeline
                .cmd_iter()
                .zip(&plan)
                .filter(|(_, (_, transition))| transition.send)
                .map(|(cmd, _)| cmd),
        );

        if !packed.is_empty() {
            self.send_bytes(&packed)?;
        }

        let mut replies = Vec::with_capacity(plan.len());
        for (op, transition) in plan {
            self.apply(transition);
            let reply = if transition.read_reply {
                Some(self.read_reply()?)
            } else if !transition.send && op == ReplyOp::ReplyOn {
                Some(Value::Okay)
            } else {
                None
            };
            replies.push(reply);
        }
        Ok(replies)
    }

    /// Tells the server to stop sending replies.
    pub fn reply_off(&mut self) -> RespResult<()> {
        self.reply_op(ReplyOp::ReplyOff).map(drop)
    }

    /// Tells the server not to answer the next command.
    pub fn skip(&mut self) -> RespResult<()> {
        self.reply_op(ReplyOp::Skip).map(drop)
    }

    /// Tells the server to send replies again and returns its answer.
    pub fn reply_on(&mut self) -> RespResult<Value> {
        match self.reply_op(ReplyOp::ReplyOn)? {
            Some(value) => Ok(value),
            None => fail!((
                ErrorKind::ClientError,
                "No reply to CLIENT REPLY ON"
            )),
        }
    }

    fn reply_op(&mut self, op: ReplyOp) -> RespResult<Option<Value>> {
        match op.command() {
            Some(cmd) => self.req_command(&cmd),
            None => fail!((ErrorKind::ClientError, "Not a reply mode operation")),
        }
    }

    /// Sends a `PING` and checks that the server answered.
    ///
    /// Returns false without touching the wire if the connection is closed
    /// or replies are not on, since no answer could be expected.
    pub fn check_connection(&mut self) -> bool {
        if !self.is_open() || self.reply_mode != ReplyMode::On {
            return false;
        }
        matches!(self.req_command(&cmd("PING")), Ok(Some(_)))
    }
}
