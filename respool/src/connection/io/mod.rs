use std::{
    io::{BufReader, Write as _},
    net,
    time::Duration,
};

use crate::{
    connection::info::TcpSettings, Node, Parser, RespError, RespResult, TlsConfig, Value,
};

pub(crate) mod tcp;
pub use tcp::TcpConnection;

pub(crate) mod tls_rustls;
pub use tls_rustls::TcpRustlsConnection;

/// Driver trait that can be implemented
/// to bring your own IO.
///
/// Most users however will probably just use [`ActualConnection`] instead.
/// Dropping a driver is expected to release its socket.
pub trait ConnectionDriver: Sized {
    /// Sets the write timeout for the connection.
    fn set_write_timeout(&self, dur: Option<Duration>) -> RespResult<()>;
    /// Sets the read timeout for the connection.
    fn set_read_timeout(&self, dur: Option<Duration>) -> RespResult<()>;

    /// Send bytes over the connection driver.
    fn send_bytes(&mut self, bytes: &[u8]) -> RespResult<()>;

    /// Read one reply from the connection driver.
    fn read_value(&mut self, parser: &mut Parser) -> RespResult<Value>;

    /// Reports if the connection driver is open.
    fn is_open(&self) -> bool;
}

/// A socket to a node, plain or encrypted.
pub enum ActualConnection {
    /// Plain TCP.
    Tcp(tcp::TcpConnection),
    /// TCP wrapped in a rustls client session.
    TcpRustls(Box<tls_rustls::TcpRustlsConnection>),
}

impl ActualConnection {
    /// Opens a socket to `node`, upgrading it to TLS if `tls` is enabled.
    ///
    /// The TLS handshake and the hostname verification both happen here, so
    /// a returned connection is ready for commands.
    pub fn establish(node: &Node, tcp: &TcpSettings, tls: &TlsConfig) -> RespResult<Self> {
        let connection = match tls.connector() {
            Some(connector) => ActualConnection::TcpRustls(Box::new(
                TcpRustlsConnection::try_new(node, tcp, connector, tls)?,
            )),
            None => ActualConnection::Tcp(TcpConnection::try_new(node, tcp)?),
        };
        Ok(connection)
    }
}

fn mark_closed_on_error<T>(result: std::io::Result<T>, open: &mut bool) -> RespResult<T> {
    result.map_err(|err| {
        let err = RespError::from(err);
        if err.is_unrecoverable_error() {
            *open = false;
        }
        err
    })
}

impl ConnectionDriver for ActualConnection {
    fn set_write_timeout(&self, dur: Option<Duration>) -> RespResult<()> {
        match *self {
            ActualConnection::Tcp(TcpConnection { ref reader, .. }) => {
                reader.get_ref().set_write_timeout(dur)?;
            }
            ActualConnection::TcpRustls(ref boxed_tls_connection) => {
                let reader = &(boxed_tls_connection.reader);
                reader.get_ref().get_ref().set_write_timeout(dur)?;
            }
        }
        Ok(())
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> RespResult<()> {
        match *self {
            ActualConnection::Tcp(TcpConnection { ref reader, .. }) => {
                reader.get_ref().set_read_timeout(dur)?;
            }
            ActualConnection::TcpRustls(ref boxed_tls_connection) => {
                let reader = &(boxed_tls_connection.reader);
                reader.get_ref().get_ref().set_read_timeout(dur)?;
            }
        }
        Ok(())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> RespResult<()> {
        match *self {
            ActualConnection::Tcp(ref mut connection) => mark_closed_on_error(
                connection.reader.get_mut().write_all(bytes),
                &mut connection.open,
            ),
            ActualConnection::TcpRustls(ref mut connection) => {
                let stream = connection.reader.get_mut();
                let result = stream.write_all(bytes).and_then(|_| stream.flush());
                mark_closed_on_error(result, &mut connection.open)
            }
        }
    }

    fn read_value(&mut self, parser: &mut Parser) -> RespResult<Value> {
        let (result, open) = match self {
            ActualConnection::Tcp(TcpConnection {
                ref mut reader,
                ref mut open,
            }) => (parser.parse_value(reader), open),
            ActualConnection::TcpRustls(ref mut boxed_tls_connection) => {
                let TcpRustlsConnection { reader, open } = &mut **boxed_tls_connection;
                (parser.parse_value(reader), open)
            }
        };
        if let Err(err) = &result {
            if err.is_unrecoverable_error() {
                *open = false;
            }
        }
        result
    }

    fn is_open(&self) -> bool {
        match *self {
            ActualConnection::Tcp(TcpConnection { open, .. }) => open,
            ActualConnection::TcpRustls(ref boxed_tls_connection) => boxed_tls_connection.open,
        }
    }
}

impl Drop for ActualConnection {
    fn drop(&mut self) {
        match self {
            ActualConnection::Tcp(ref mut connection) => {
                let _ = connection.reader.get_ref().shutdown(net::Shutdown::Both);
                connection.open = false;
            }
            ActualConnection::TcpRustls(ref mut connection) => {
                let stream = connection.reader.get_mut();
                stream.conn.send_close_notify();
                let _ = stream.flush();
                let _ = stream.get_ref().shutdown(net::Shutdown::Both);
                connection.open = false;
            }
        }
    }
}

pub(crate) type BufferedTcp = BufReader<net::TcpStream>;
