//! Error types for the ZooKeeper session.
//!
//! Connection bootstrap failures are reported as [`CoordinationError`]. Errors
//! of individual requests are translated to the store-neutral
//! [`ErrorCode`] the sync cycle classifies.

use node_sync::ErrorCode;
use thiserror::Error;
use zookeeper_client as zk;

/// Top-level error type for the zk-coordination crate.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// ZooKeeper connection or transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation timed out waiting for the ensemble.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Configuration error (e.g. missing required fields).
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoordinationError {
    /// Returns true if this error indicates a transient failure that may
    /// succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinationError::Transport(_) | CoordinationError::Timeout(_)
        )
    }
}

/// Shorthand result alias for coordination operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Translate a client error into the store result code.
///
/// Client-side conditions without a server code (closed client, unreachable
/// hosts, ...) become [`ErrorCode::SystemError`] and are therefore fatal for
/// the cycle.
pub fn error_code(err: &zk::Error) -> ErrorCode {
    match err {
        zk::Error::ConnectionLoss => ErrorCode::ConnectionLoss,
        zk::Error::NoNode => ErrorCode::NoNode,
        zk::Error::NoAuth => ErrorCode::NoAuth,
        zk::Error::AuthFailed => ErrorCode::AuthFailed,
        zk::Error::SessionExpired => ErrorCode::SessionExpired,
        _ => ErrorCode::SystemError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            error_code(&zk::Error::ConnectionLoss),
            ErrorCode::ConnectionLoss
        );
        assert!(error_code(&zk::Error::ConnectionLoss).is_retryable());
        assert_eq!(error_code(&zk::Error::NoNode), ErrorCode::NoNode);
        assert_eq!(error_code(&zk::Error::NoAuth), ErrorCode::NoAuth);
        assert_eq!(error_code(&zk::Error::AuthFailed), ErrorCode::AuthFailed);
        assert_eq!(
            error_code(&zk::Error::SessionExpired),
            ErrorCode::SessionExpired
        );
        assert!(!error_code(&zk::Error::SessionExpired).is_retryable());
    }

    #[test]
    fn test_error_classification() {
        assert!(CoordinationError::Transport("conn reset".into()).is_retryable());
        assert!(CoordinationError::Timeout("deadline exceeded".into()).is_retryable());
        assert!(!CoordinationError::Config("missing servers".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = CoordinationError::Config("no servers configured".into());
        assert_eq!(format!("{err}"), "configuration error: no servers configured");
    }
}
