//! Error types for nodesync

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Transport Errors ===
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Payload error: {0}")]
    Payload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // === Protocol Errors ===
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Protocol error: request for group '{requested}' sent to coordinator of group '{served}'")]
    WrongGroup { requested: String, served: String },

    // === Rendezvous Errors ===
    #[error("Rendezvous timeout for group '{group}' after {attempts} attempts ({elapsed:?})")]
    RendezvousTimeout {
        group: String,
        attempts: u32,
        elapsed: Duration,
    },

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// Only failures of one connect/send/receive cycle qualify. A truncated
    /// reply means the coordinator went away mid-exchange, so it is retried
    /// like a reset.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConnectionFailed(_) | Error::Payload(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Is this a transport-level error (codec failure on the current connection)?
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Framing(_) | Error::Payload(_))
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::ConnectionFailed("refused".into()).is_retryable());
        assert!(Error::Payload("truncated".into()).is_retryable());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)).is_retryable());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_retryable());

        assert!(!Error::Protocol("bad group".into()).is_retryable());
        assert!(!Error::WrongGroup {
            requested: "g2".into(),
            served: "g1".into()
        }
        .is_retryable());
        assert!(!Error::Framing("bad header".into()).is_retryable());
        assert!(!Error::InvalidConfig("port".into()).is_retryable());
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)).is_retryable());
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::RendezvousTimeout {
            group: "g1".into(),
            attempts: 3,
            elapsed: Duration::from_secs(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("g1"));
        assert!(msg.contains("3 attempts"));
    }
}
