use std::{
    io::BufReader,
    net::{SocketAddr, TcpStream, ToSocketAddrs as _},
    time::Duration,
};

use crate::{connection::info::TcpSettings, ErrorKind, Node, RespResult};

use super::BufferedTcp;

#[inline(always)]
fn connect_tcp_timeout(
    addr: &SocketAddr,
    timeout: Duration,
    settings: &TcpSettings,
) -> std::io::Result<TcpStream> {
    let socket = TcpStream::connect_timeout(addr, timeout)?;
    socket.set_nodelay(settings.nodelay)?;
    #[cfg(feature = "keep-alive")]
    if settings.keep_alive {
        //For now rely on system defaults
        const KEEP_ALIVE: socket2::TcpKeepalive = socket2::TcpKeepalive::new();
        let socket2 = socket2::SockRef::from(&socket);
        socket2.set_tcp_keepalive(&KEEP_ALIVE)?;
    }
    Ok(socket)
}

/// Connects to the first address `node` resolves to that accepts within the
/// connect timeout, then applies the socket timeout.
pub(super) fn connect_node(node: &Node, settings: &TcpSettings) -> RespResult<TcpStream> {
    let mut tcp = None;
    let mut last_error = None;
    for addr in (node.host(), node.port()).to_socket_addrs()? {
        match connect_tcp_timeout(&addr, settings.connect_timeout, settings) {
            Ok(l) => {
                tcp = Some(l);
                break;
            }
            Err(e) => {
                log::trace!("Connecting to {addr} for {node} failed: {e}");
                last_error = Some(e);
            }
        };
    }
    let tcp = match (tcp, last_error) {
        (Some(tcp), _) => tcp,
        (None, Some(e)) => {
            fail!(e);
        }
        (None, None) => {
            fail!((
                ErrorKind::InvalidClientConfig,
                "could not resolve to any addresses",
                node.to_string()
            ));
        }
    };
    tcp.set_read_timeout(Some(settings.socket_timeout))?;
    tcp.set_write_timeout(Some(settings.socket_timeout))?;
    Ok(tcp)
}

/// A plain TCP connection.
pub struct TcpConnection {
    pub(super) reader: BufferedTcp,
    pub(super) open: bool,
}

impl TcpConnection {
    pub(super) fn try_new(node: &Node, settings: &TcpSettings) -> RespResult<Self> {
        let tcp = connect_node(node, settings)?;
        Ok(Self {
            reader: BufReader::new(tcp),
            open: true,
        })
    }
}
