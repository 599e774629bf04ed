use std::{error, fmt, io};

use arcstr::ArcStr;

use crate::{
    errors::server_error::{ServerError, ServerErrorKind},
    Node,
};

/// An enum of all error kinds.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The parser failed to parse the server response.
    ParseError,
    /// The authentication with the server failed.
    AuthenticationFailed,
    /// The server answered with a reply of an unexpected type.
    UnexpectedReturnType,
    /// An error that was caused because the parameters to the
    /// client were wrong.
    InvalidClientConfig,
    /// This kind is returned if the error is one that is
    /// not native to the system.  This is usually the case if
    /// the cause is another error.
    IoError,
    /// An error raised that was identified on the client before execution.
    ClientError,
    /// An extension error.  This is an error created by the server
    /// that is not directly understood by the library.
    ExtensionError,
    /// An error returned from the server
    ServerError(ServerErrorKind),
}

/// Classification of a failure observed while talking to one node.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
pub enum NodeFailure {
    /// The transport could not be established or timed out, TLS handshake
    /// included. The node may be unreachable; fail over or back off.
    Connect,
    /// The transport opened but the node rejected an initialization
    /// command. Retrying without a configuration change will not help.
    Protocol,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeFailure::Connect => f.write_str("connect failure"),
            NodeFailure::Protocol => f.write_str("protocol failure"),
        }
    }
}

/// Represents a client error.
///
/// For the most part you should be using the Error trait to interact with this
/// rather than the actual struct.
pub struct RespError {
    repr: ErrorRepr,
}

#[derive(Debug)]
struct NodeError {
    node: Node,
    failure: NodeFailure,
    cause: RespError,
}

#[derive(Debug)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, ArcStr),
    IoError(io::Error),
    ServerError(ServerError),
    Node(Box<NodeError>),
}

impl PartialEq for RespError {
    fn eq(&self, other: &RespError) -> bool {
        match (&self.repr, &other.repr) {
            (&ErrorRepr::WithDescription(kind_a, _), &ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                &ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                &ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::ServerError(a), ErrorRepr::ServerError(b)) => *a == *b,
            (ErrorRepr::Node(a), ErrorRepr::Node(b)) => {
                a.node == b.node && a.failure == b.failure && a.cause == b.cause
            }
            _ => false,
        }
    }
}

impl From<io::Error> for RespError {
    fn from(err: io::Error) -> RespError {
        RespError {
            repr: ErrorRepr::IoError(err),
        }
    }
}

impl From<rustls::pki_types::InvalidDnsNameError> for RespError {
    fn from(err: rustls::pki_types::InvalidDnsNameError) -> RespError {
        RespError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "TLS Error",
                err.to_string().into(),
            ),
        }
    }
}

impl From<rustls::Error> for RespError {
    fn from(err: rustls::Error) -> RespError {
        RespError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "TLS error",
                err.to_string().into(),
            ),
        }
    }
}

impl From<url::ParseError> for RespError {
    fn from(err: url::ParseError) -> RespError {
        RespError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::InvalidClientConfig,
                "Invalid connection URL",
                err.to_string().into(),
            ),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RespError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RespError {
        RespError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for RespError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RespError {
        RespError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail.into()),
        }
    }
}

impl From<ServerError> for RespError {
    fn from(err: ServerError) -> Self {
        Self {
            repr: ErrorRepr::ServerError(err),
        }
    }
}

impl From<ServerErrorKind> for ErrorKind {
    fn from(kind: ServerErrorKind) -> Self {
        ErrorKind::ServerError(kind)
    }
}

impl error::Error for RespError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::IoError(err) => Some(err),
            ErrorRepr::ServerError(err) => Some(err),
            ErrorRepr::Node(inner) => Some(&inner.cause),
            _ => None,
        }
    }
}

impl fmt::Debug for RespError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for RespError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, detail) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::IoError(err) => err.fmt(f),
            ErrorRepr::ServerError(err) => err.fmt(f),
            ErrorRepr::Node(inner) => {
                write!(f, "{} on {}: ", inner.failure, inner.node)?;
                inner.cause.fmt(f)
            }
        }
    }
}

/// What method should be used if retrying this request.
#[non_exhaustive]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum RetryMethod {
    /// Create a fresh connection, since the current connection is no longer usable.
    Reconnect,
    /// Don't retry, this is a permanent error.
    NoRetry,
    /// Retry immediately, this doesn't require a wait.
    RetryImmediately,
    /// Retry after sleeping to avoid overloading the external service.
    WaitAndRetry,
}

/// Indicates a general failure in the library.
impl RespError {
    /// Attaches a node and a failure classification to `cause`.
    ///
    /// If `cause` is already scoped to a node, its inner cause is re-scoped
    /// rather than nested.
    pub fn for_node(node: Node, failure: NodeFailure, cause: RespError) -> RespError {
        let cause = match cause.repr {
            ErrorRepr::Node(inner) => inner.cause,
            repr => RespError { repr },
        };
        RespError {
            repr: ErrorRepr::Node(Box::new(NodeError {
                node,
                failure,
                cause,
            })),
        }
    }

    /// Returns the node this error is scoped to, if any.
    pub fn node(&self) -> Option<&Node> {
        match &self.repr {
            ErrorRepr::Node(inner) => Some(&inner.node),
            _ => None,
        }
    }

    /// Returns how the failure of the node was classified, if this error is
    /// scoped to a node.
    pub fn node_failure(&self) -> Option<NodeFailure> {
        match &self.repr {
            ErrorRepr::Node(inner) => Some(inner.failure),
            _ => None,
        }
    }

    /// Returns true if the node could not be reached.
    pub fn is_connect_failure(&self) -> bool {
        self.node_failure() == Some(NodeFailure::Connect)
    }

    /// Returns true if the node refused to be initialized.
    pub fn is_protocol_failure(&self) -> bool {
        self.node_failure() == Some(NodeFailure::Protocol)
    }

    /// Strips the node context, if any, and returns the underlying error.
    pub fn cause(&self) -> &RespError {
        match &self.repr {
            ErrorRepr::Node(inner) => &inner.cause,
            _ => self,
        }
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => *kind,
            ErrorRepr::IoError(_) => ErrorKind::IoError,
            ErrorRepr::ServerError(err) => match err.kind() {
                Some(kind) => ErrorKind::ServerError(kind),
                None => ErrorKind::ExtensionError,
            },
            ErrorRepr::Node(inner) => inner.cause.kind(),
        }
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, detail) => Some(detail.as_str()),
            ErrorRepr::ServerError(err) => err.details(),
            ErrorRepr::Node(inner) => inner.cause.detail(),
            _ => None,
        }
    }

    /// Returns the raw error code if available.
    pub fn code(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::ServerError(err) => Some(err.code()),
            ErrorRepr::Node(inner) => inner.cause.code(),
            _ => None,
        }
    }

    /// Indicates that this failure is an IO failure.
    pub fn is_io_error(&self) -> bool {
        self.kind() == ErrorKind::IoError
    }

    pub(crate) fn as_io_error(&self) -> Option<&io::Error> {
        match &self.repr {
            ErrorRepr::IoError(e) => Some(e),
            ErrorRepr::Node(inner) => inner.cause.as_io_error(),
            _ => None,
        }
    }

    /// Returns true if this error indicates that the connection was
    /// refused.  You should generally not rely much on this function
    /// unless you are writing unit tests that want to detect if a
    /// local server is available.
    pub fn is_connection_refusal(&self) -> bool {
        self.as_io_error()
            .is_some_and(|err| err.kind() == io::ErrorKind::ConnectionRefused)
    }

    /// Returns true if error was caused by I/O time out.
    /// Note that this may not be accurate depending on platform.
    pub fn is_timeout(&self) -> bool {
        self.as_io_error().is_some_and(|err| {
            matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        })
    }

    /// Returns true if error was caused by a dropped connection.
    pub fn is_connection_dropped(&self) -> bool {
        self.as_io_error().is_some_and(|err| {
            matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::UnexpectedEof
            )
        })
    }

    /// Returns true if the error is likely to not be recoverable, and the connection must be replaced.
    pub fn is_unrecoverable_error(&self) -> bool {
        match self.retry_method() {
            RetryMethod::Reconnect => true,

            RetryMethod::NoRetry => false,
            RetryMethod::RetryImmediately => false,
            RetryMethod::WaitAndRetry => false,
        }
    }

    /// Specifies what method (if any) should be used to retry this request.
    ///
    /// Node-scoped errors are routed by their classification: a node that
    /// could not be reached calls for a fresh connection (possibly to another
    /// node, after a backoff), a node that rejected initialization does not
    /// warrant a retry at all.
    pub fn retry_method(&self) -> RetryMethod {
        if let ErrorRepr::Node(inner) = &self.repr {
            return match inner.failure {
                NodeFailure::Connect => RetryMethod::Reconnect,
                NodeFailure::Protocol => RetryMethod::NoRetry,
            };
        }

        match self.kind() {
            ErrorKind::ServerError(kind) => kind.retry_method(),

            ErrorKind::ExtensionError => RetryMethod::NoRetry,
            ErrorKind::UnexpectedReturnType => RetryMethod::NoRetry,
            ErrorKind::InvalidClientConfig => RetryMethod::NoRetry,
            ErrorKind::ClientError => RetryMethod::NoRetry,

            ErrorKind::ParseError => RetryMethod::Reconnect,
            ErrorKind::AuthenticationFailed => RetryMethod::Reconnect,

            ErrorKind::IoError => match &self.repr {
                ErrorRepr::IoError(err) => match err.kind() {
                    io::ErrorKind::ConnectionRefused => RetryMethod::Reconnect,
                    io::ErrorKind::NotFound => RetryMethod::Reconnect,
                    io::ErrorKind::ConnectionReset => RetryMethod::Reconnect,
                    io::ErrorKind::ConnectionAborted => RetryMethod::Reconnect,
                    io::ErrorKind::NotConnected => RetryMethod::Reconnect,
                    io::ErrorKind::BrokenPipe => RetryMethod::Reconnect,
                    io::ErrorKind::UnexpectedEof => RetryMethod::Reconnect,

                    io::ErrorKind::PermissionDenied => RetryMethod::NoRetry,
                    io::ErrorKind::Unsupported => RetryMethod::NoRetry,

                    _ => RetryMethod::RetryImmediately,
                },
                _ => RetryMethod::RetryImmediately,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new("cache-1.internal", 7001)
    }

    #[test]
    fn node_scope_keeps_the_cause() {
        let cause = RespError::from(io::Error::from(io::ErrorKind::ConnectionRefused));
        let err = RespError::for_node(node(), NodeFailure::Connect, cause);

        assert_eq!(err.node(), Some(&node()));
        assert!(err.is_connect_failure());
        assert!(!err.is_protocol_failure());
        assert!(err.is_io_error());
        assert!(err.is_connection_refusal());
        assert_eq!(err.retry_method(), RetryMethod::Reconnect);
        assert!(err
            .to_string()
            .starts_with("connect failure on cache-1.internal:7001: "));
    }

    #[test]
    fn protocol_failures_are_not_retried() {
        let cause = RespError::from(ServerError::from_line("WRONGPASS invalid password"));
        let err = RespError::for_node(node(), NodeFailure::Protocol, cause);

        assert_eq!(
            err.kind(),
            ErrorKind::ServerError(ServerErrorKind::WrongPass)
        );
        assert_eq!(err.code(), Some("WRONGPASS"));
        assert_eq!(err.detail(), Some("invalid password"));
        assert_eq!(err.retry_method(), RetryMethod::NoRetry);
        assert!(!err.is_unrecoverable_error());
    }

    #[test]
    fn rescoping_does_not_nest() {
        let cause = RespError::from((ErrorKind::ClientError, "boom"));
        let first = RespError::for_node(node(), NodeFailure::Protocol, cause);
        let other = Node::new("cache-2.internal", 7002);
        let second = RespError::for_node(other.clone(), NodeFailure::Connect, first);

        assert_eq!(second.node(), Some(&other));
        assert_eq!(second.cause().node(), None);
        assert_eq!(second.kind(), ErrorKind::ClientError);
    }

    #[test]
    fn plain_errors_have_no_node() {
        let err = RespError::from(io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.node(), None);
        assert_eq!(err.node_failure(), None);
        assert!(err.is_timeout());
        assert_eq!(err.retry_method(), RetryMethod::RetryImmediately);
    }
}
