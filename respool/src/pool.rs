use std::{
    ops::{Deref, DerefMut},
    time::{Duration, Instant},
};

/// A pooled object together with the time it was created.
///
/// This is the envelope returned by [`ConnectionFactory::wrap`]. It has no
/// behavior of its own and derefs to the wrapped object.
///
/// [`ConnectionFactory::wrap`]: crate::ConnectionFactory::wrap
#[derive(Debug)]
pub struct Pooled<T> {
    object: T,
    created_at: Instant,
}

impl<T> Pooled<T> {
    pub(crate) fn new(object: T) -> Self {
        Pooled {
            object,
            created_at: Instant::now(),
        }
    }

    /// When the object was wrapped.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time elapsed since the object was wrapped.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Returns the wrapped object.
    pub fn into_inner(self) -> T {
        self.object
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.object
    }
}

#[cfg(feature = "r2d2")]
mod r2d2_impl {
    use std::io;

    use crate::{Connection, ConnectionFactory, ReplyMode, RespError};

    impl r2d2::ManageConnection for ConnectionFactory {
        type Connection = Connection;
        type Error = RespError;

        fn connect(&self) -> Result<Self::Connection, Self::Error> {
            self.create()
        }

        fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
            if self.validate(conn) {
                Ok(())
            } else {
                Err(RespError::from(io::Error::from(io::ErrorKind::BrokenPipe)))
            }
        }

        fn has_broken(&self, conn: &mut Self::Connection) -> bool {
            if conn.reply_mode() != ReplyMode::On {
                log::warn!(
                    "Connection to {} returned in reply mode {:?}, discarding it",
                    self.node(),
                    conn.reply_mode()
                );
                return true;
            }
            !conn.is_open()
        }
    }
}
