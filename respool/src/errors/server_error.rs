use arcstr::ArcStr;
use std::fmt;

use crate::RetryMethod;

/// Kinds of errors returned from the server
#[derive(PartialEq, Debug, Clone, Copy, Eq)]
#[non_exhaustive]
pub enum ServerErrorKind {
    /// The server returned a general error.
    ResponseError,
    /// The command requires authentication first.
    NoAuth,
    /// The supplied credentials were rejected.
    WrongPass,
    /// Attempted to use a command without ACL permission.
    NoPerm,
    /// The server cannot respond because it's loading a dump.
    BusyLoading,
    /// Raised if a request needs to be retried.
    TryAgain,
    /// Raised if the cluster is down.
    ClusterDown,
    /// A cluster master is unavailable.
    MasterDown,
    /// Attempt to write to a read-only server
    ReadOnly,
}

impl ServerErrorKind {
    pub(crate) fn code(&self) -> &'static str {
        match self {
            Self::ResponseError => "ERR",
            Self::NoAuth => "NOAUTH",
            Self::WrongPass => "WRONGPASS",
            Self::NoPerm => "NOPERM",
            Self::BusyLoading => "LOADING",
            Self::TryAgain => "TRYAGAIN",
            Self::ClusterDown => "CLUSTERDOWN",
            Self::MasterDown => "MASTERDOWN",
            Self::ReadOnly => "READONLY",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "ERR" => Self::ResponseError,
            "NOAUTH" => Self::NoAuth,
            "WRONGPASS" => Self::WrongPass,
            "NOPERM" => Self::NoPerm,
            "LOADING" => Self::BusyLoading,
            "TRYAGAIN" => Self::TryAgain,
            "CLUSTERDOWN" => Self::ClusterDown,
            "MASTERDOWN" => Self::MasterDown,
            "READONLY" => Self::ReadOnly,
            _ => return None,
        })
    }

    pub(crate) fn retry_method(&self) -> RetryMethod {
        match self {
            Self::TryAgain => RetryMethod::WaitAndRetry,
            Self::MasterDown => RetryMethod::WaitAndRetry,
            Self::ClusterDown => RetryMethod::WaitAndRetry,
            Self::BusyLoading => RetryMethod::WaitAndRetry,

            Self::ResponseError => RetryMethod::NoRetry,
            Self::NoAuth => RetryMethod::NoRetry,
            Self::WrongPass => RetryMethod::NoRetry,
            Self::NoPerm => RetryMethod::NoRetry,
            Self::ReadOnly => RetryMethod::NoRetry,
        }
    }
}

/// An error that was returned from the server
#[derive(PartialEq, Debug, Clone)]
pub struct ServerError(pub(crate) Repr);

#[derive(PartialEq, Debug, Clone)]
pub(crate) enum Repr {
    Extension {
        code: ArcStr,
        detail: Option<ArcStr>,
    },
    Known {
        kind: ServerErrorKind,
        detail: Option<ArcStr>,
    },
}

impl ServerError {
    /// Builds a server error from the text of an error reply, without the
    /// leading `-` and the trailing CRLF.
    pub fn from_line(line: &str) -> Self {
        let (code, detail) = match line.split_once(' ') {
            Some((code, detail)) => (code, Some(ArcStr::from(detail))),
            None => (line, None),
        };
        match ServerErrorKind::from_code(code) {
            Some(kind) => ServerError(Repr::Known { kind, detail }),
            None => ServerError(Repr::Extension {
                code: code.into(),
                detail,
            }),
        }
    }

    /// Returns the kind of error. If `None`, try [`ServerError::code`] to get the error code.
    pub fn kind(&self) -> Option<ServerErrorKind> {
        match &self.0 {
            Repr::Extension { .. } => None,
            Repr::Known { kind, .. } => Some(*kind),
        }
    }

    /// The error code returned from the server
    pub fn code(&self) -> &str {
        match &self.0 {
            Repr::Extension { code, .. } => code,
            Repr::Known { kind, .. } => kind.code(),
        }
    }

    /// Additional details about the error, if exist
    pub fn details(&self) -> Option<&str> {
        match &self.0 {
            Repr::Extension { detail, .. } => detail.as_ref().map(|str| str.as_str()),
            Repr::Known { detail, .. } => detail.as_ref().map(|str| str.as_str()),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Extension { code, detail } => {
                fmt::Debug::fmt(&code, f)?;
                if let Some(detail) = detail {
                    f.write_str(": ")?;
                    detail.fmt(f)?;
                }
                Ok(())
            }
            Repr::Known { kind, detail } => {
                fmt::Debug::fmt(&kind, f)?;
                if let Some(detail) = detail {
                    f.write_str(": ")?;
                    detail.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ServerError {}
