use std::{fmt, str::FromStr};

use crate::{ErrorKind, RespError, RespResult};

/// The address of one endpoint of a (possibly clustered) store.
///
/// Nodes compare by `(host, port)` and are cheap to clone, so they are
/// suitable as map keys for routing layers built on top of this crate.
/// Every node-scoped [`RespError`] carries the node that failed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    host: String,
    port: u16,
}

impl Node {
    /// Creates a node from a host name or IP literal and a port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Node {
            host: host.into(),
            port,
        }
    }

    /// The host name or IP literal of the node.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port of the node.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

pub(crate) fn split_node_address(node: &str) -> RespResult<(&str, u16)> {
    let invalid_error =
        || RespError::from((ErrorKind::InvalidClientConfig, "Invalid node string"));
    node.rsplit_once(':')
        .and_then(|(host, port)| {
            Some(host.trim_start_matches('[').trim_end_matches(']'))
                .filter(|h| !h.is_empty())
                .zip(u16::from_str(port).ok())
        })
        .ok_or_else(invalid_error)
}

impl FromStr for Node {
    type Err = RespError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = split_node_address(s)?;
        Ok(Node::new(host, port))
    }
}

impl From<(&str, u16)> for Node {
    fn from((host, port): (&str, u16)) -> Self {
        Node::new(host, port)
    }
}

impl From<(String, u16)> for Node {
    fn from((host, port): (String, u16)) -> Self {
        Node::new(host, port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn parses_host_and_port() {
        let node: Node = "cache-1.internal:7001".parse().unwrap();
        assert_eq!(node.host(), "cache-1.internal");
        assert_eq!(node.port(), 7001);
        assert_eq!(node.to_string(), "cache-1.internal:7001");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let node: Node = "[::1]:6379".parse().unwrap();
        assert_eq!(node.host(), "::1");
        assert_eq!(node.to_string(), "[::1]:6379");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for input in ["cache-1", ":6379", "cache-1:port", "cache-1:70000"] {
            let err = input.parse::<Node>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidClientConfig, "{input}");
        }
    }

    #[test]
    fn equality_is_structural() {
        let mut nodes = HashSet::new();
        nodes.insert(Node::new("10.0.0.1", 6379));
        nodes.insert(Node::from(("10.0.0.1", 6379)));
        nodes.insert(Node::new("10.0.0.1", 6380));
        assert_eq!(nodes.len(), 2);
    }
}
