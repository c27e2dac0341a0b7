//! Error types for the server.
//!
//! Failures fall into four groups:
//! - framing configuration errors, raised where a terminator is set
//! - per-connection I/O errors and timeouts
//! - errors returned by protocol handlers
//! - bind/listen errors at startup, which are fatal

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Error type returned by protocol handler callbacks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid terminator configuration or a decoder misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// A delimiter terminator must contain at least one byte.
    #[error("delimiter terminator must not be empty")]
    EmptyDelimiter,

    /// Bytes arrived after a byte-count frame completed and no new
    /// terminator was set.
    #[error("byte-count terminator exhausted with {pending} byte(s) pending")]
    ByteCountExhausted { pending: usize },
}

/// Anything that ends a single connection.
///
/// These never escape the connection's own thread.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("handler error: {0}")]
    Handler(HandlerError),
}

impl SessionError {
    /// Classify a failed socket read or write, mapping expired socket
    /// timeouts to `Timeout`.
    pub(crate) fn from_read(err: io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => SessionError::Timeout(timeout),
            _ => SessionError::Io(err),
        }
    }

    /// Classify an error returned by a handler callback.
    ///
    /// Handlers usually fail on a socket write propagated with `?`, so an
    /// expired write timeout surfaces as `Timeout` and other I/O failures as
    /// `Io`. Anything else stays a `Handler` error.
    pub(crate) fn from_handler(err: HandlerError, timeout: Duration) -> Self {
        let err = match err.downcast::<io::Error>() {
            Ok(io_err) => return SessionError::from_read(*io_err, timeout),
            Err(err) => err,
        };
        match err.downcast::<SessionError>() {
            Ok(session_err) => *session_err,
            Err(err) => SessionError::Handler(err),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Startup failures. The process does not serve when one of these occurs.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_timeout_classification() {
        let timeout = Duration::from_secs(3);

        let err = SessionError::from_read(io::Error::from(io::ErrorKind::WouldBlock), timeout);
        assert!(matches!(err, SessionError::Timeout(t) if t == timeout));

        let err = SessionError::from_read(io::Error::from(io::ErrorKind::TimedOut), timeout);
        assert!(matches!(err, SessionError::Timeout(_)));

        let err = SessionError::from_read(io::Error::from(io::ErrorKind::ConnectionReset), timeout);
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[test]
    fn test_handler_error_classification() {
        let timeout = Duration::from_secs(3);

        let stalled: HandlerError = Box::new(io::Error::from(io::ErrorKind::WouldBlock));
        let err = SessionError::from_handler(stalled, timeout);
        assert!(matches!(err, SessionError::Timeout(t) if t == timeout));

        let reset: HandlerError = Box::new(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(SessionError::from_handler(reset, timeout), SessionError::Io(_)));

        let framing: HandlerError = Box::new(SessionError::Framing(FramingError::EmptyDelimiter));
        assert!(matches!(
            SessionError::from_handler(framing, timeout),
            SessionError::Framing(FramingError::EmptyDelimiter)
        ));

        let other: HandlerError = "bad command".into();
        let err = SessionError::from_handler(other, timeout);
        assert_eq!(err.to_string(), "handler error: bad command");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FramingError::EmptyDelimiter.to_string(),
            "delimiter terminator must not be empty"
        );
        let err = SessionError::from(FramingError::ByteCountExhausted { pending: 4 });
        assert_eq!(
            err.to_string(),
            "framing error: byte-count terminator exhausted with 4 byte(s) pending"
        );
    }
}
