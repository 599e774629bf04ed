use std::{io::BufReader, net::TcpStream, sync::Arc};

use rustls::{pki_types::ServerName, ClientConfig, ClientConnection, StreamOwned};

use crate::{connection::info::TcpSettings, ErrorKind, Node, RespResult, TlsConfig};

use super::tcp::connect_node;

/// A TCP connection wrapped in a rustls client session.
pub struct TcpRustlsConnection {
    pub(super) reader: BufReader<StreamOwned<ClientConnection, TcpStream>>,
    pub(super) open: bool,
}

impl TcpRustlsConnection {
    pub(super) fn try_new(
        node: &Node,
        settings: &TcpSettings,
        connector: &Arc<ClientConfig>,
        tls: &TlsConfig,
    ) -> RespResult<Self> {
        let server_name = tls
            .params()
            .server_name
            .clone()
            .unwrap_or_else(|| node.host().to_string());
        let mut conn =
            ClientConnection::new(connector.clone(), ServerName::try_from(server_name.clone())?)?;
        let mut tcp = connect_node(node, settings)?;

        // finish the handshake before any command is written, so that
        // certificate problems surface while opening the connection
        while conn.is_handshaking() {
            conn.complete_io(&mut tcp)?;
        }

        if let Some(verifier) = tls.hostname_verifier() {
            let peer_certificates = conn.peer_certificates().unwrap_or_default();
            if !verifier.verify(&server_name, peer_certificates) {
                fail!((
                    ErrorKind::IoError,
                    "TLS hostname verification failed",
                    server_name
                ));
            }
        }
        log::trace!(
            "TLS session with {node} established using {:?}",
            conn.protocol_version()
        );

        Ok(TcpRustlsConnection {
            reader: BufReader::new(StreamOwned::new(conn, tcp)),
            open: true,
        })
    }
}
