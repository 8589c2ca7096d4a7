//! Error types for endpoint synchronization.
//!
//! [`ErrorCode`] is the result code a coordination store reports for a single
//! fetch. Only [`ErrorCode::ConnectionLoss`] is retryable; every other code
//! ends the current cycle. [`SyncError`] covers failures of the component
//! itself (configuration, startup).

use std::time::Duration;

use thiserror::Error;

/// Result code reported by the coordination store for a failed request.
///
/// Numbering follows the ZooKeeper wire protocol so that adapters can map raw
/// codes with [`ErrorCode::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorCode {
    /// Server-side system error.
    #[error("system error")]
    SystemError,
    /// A runtime inconsistency was found.
    #[error("runtime inconsistency")]
    RuntimeInconsistency,
    /// A data inconsistency was found.
    #[error("data inconsistency")]
    DataInconsistency,
    /// Connection to the server has been lost.
    #[error("connection loss")]
    ConnectionLoss,
    /// Error while marshalling or unmarshalling data.
    #[error("marshalling error")]
    MarshallingError,
    /// Operation is unimplemented.
    #[error("unimplemented")]
    Unimplemented,
    /// Operation timeout.
    #[error("operation timeout")]
    OperationTimeout,
    /// Invalid arguments.
    #[error("bad arguments")]
    BadArguments,
    /// The session is not known to the server.
    #[error("unknown session")]
    UnknownSession,
    /// The node does not exist.
    #[error("no node")]
    NoNode,
    /// Not authorized.
    #[error("not authorized")]
    NoAuth,
    /// Version conflict.
    #[error("bad version")]
    BadVersion,
    /// Ephemeral nodes may not have children.
    #[error("no children for ephemerals")]
    NoChildrenForEphemerals,
    /// The node already exists.
    #[error("node exists")]
    NodeExists,
    /// The node has children.
    #[error("directory not empty")]
    NotEmpty,
    /// The session has been expired by the server.
    #[error("session expired")]
    SessionExpired,
    /// Invalid callback specified.
    #[error("invalid callback")]
    InvalidCallback,
    /// Invalid ACL specified.
    #[error("invalid acl")]
    InvalidAcl,
    /// Client authentication failed.
    #[error("authentication failed")]
    AuthFailed,
    /// Session moved to another server.
    #[error("session moved")]
    SessionMoved,
    /// State-changing request is passed to a read-only server.
    #[error("not a read-only call")]
    NotReadOnly,
    /// Attempt to remove a non-existing watcher.
    #[error("no watcher")]
    NoWatcher,
    /// Request not completed within the maximum allowed time.
    #[error("request timeout")]
    RequestTimeout,
    /// The request was rejected due to throttling.
    #[error("throttled")]
    Throttled,
    /// A code this crate does not know about.
    #[error("unknown error code {0}")]
    Unknown(i32),
}

impl ErrorCode {
    /// Map a raw store result code. Returns `None` for `0` (OK).
    pub fn from_code(code: i32) -> Option<Self> {
        use ErrorCode::*;
        Some(match code {
            0 => return None,
            -1 => SystemError,
            -2 => RuntimeInconsistency,
            -3 => DataInconsistency,
            -4 => ConnectionLoss,
            -5 => MarshallingError,
            -6 => Unimplemented,
            -7 => OperationTimeout,
            -8 => BadArguments,
            -12 => UnknownSession,
            -101 => NoNode,
            -102 => NoAuth,
            -103 => BadVersion,
            -108 => NoChildrenForEphemerals,
            -110 => NodeExists,
            -111 => NotEmpty,
            -112 => SessionExpired,
            -113 => InvalidCallback,
            -114 => InvalidAcl,
            -115 => AuthFailed,
            -118 => SessionMoved,
            -119 => NotReadOnly,
            -121 => NoWatcher,
            -122 => RequestTimeout,
            -127 => Throttled,
            other => Unknown(other),
        })
    }

    /// The raw store result code.
    pub fn code(&self) -> i32 {
        use ErrorCode::*;
        match *self {
            SystemError => -1,
            RuntimeInconsistency => -2,
            DataInconsistency => -3,
            ConnectionLoss => -4,
            MarshallingError => -5,
            Unimplemented => -6,
            OperationTimeout => -7,
            BadArguments => -8,
            UnknownSession => -12,
            NoNode => -101,
            NoAuth => -102,
            BadVersion => -103,
            NoChildrenForEphemerals => -108,
            NodeExists => -110,
            NotEmpty => -111,
            SessionExpired => -112,
            InvalidCallback => -113,
            InvalidAcl => -114,
            AuthFailed => -115,
            SessionMoved => -118,
            NotReadOnly => -119,
            NoWatcher => -121,
            RequestTimeout => -122,
            Throttled => -127,
            Unknown(code) => code,
        }
    }

    /// Returns true if the fetch that produced this code should be re-issued.
    ///
    /// The session reconnects on its own after a connection loss and the store
    /// keeps the semantics of the outstanding request, so only that code is
    /// retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::ConnectionLoss)
    }
}

/// Errors returned by [`NodeSync`](crate::NodeSync).
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration rejected at construction.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// `start` was called on an instance that is already running.
    #[error("node sync already started")]
    AlreadyStarted,

    /// The session dropped its connectivity channel; it will never connect.
    #[error("coordination session closed")]
    SessionClosed,

    /// Startup did not complete within the configured bound.
    #[error("startup timed out after {after:?} waiting for {waiting_for}")]
    StartupTimeout {
        /// What startup was blocked on when the bound expired.
        waiting_for: &'static str,
        /// The configured bound.
        after: Duration,
    },
}

/// Shorthand result alias for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
