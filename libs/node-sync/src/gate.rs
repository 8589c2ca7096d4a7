//! Startup gate: connectivity and first-outcome waits.
//!
//! Both waits ride on `tokio::sync::watch` channels, so the startup task is
//! woken by the change itself rather than by polling. The first-outcome cell
//! is written from the cycle task and read from the startup task.

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

use crate::error::{ErrorCode, SyncError, SyncResult};
use crate::session::ConnectionState;

/// What the first fetch after startup produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// A snapshot was delivered to the consumer.
    Synced {
        /// number of endpoints in the snapshot
        endpoints: usize,
    },
    /// The fetch hit a retryable failure; a retry is already under way but
    /// the consumer has not received any data yet.
    Retrying(ErrorCode),
    /// The fetch failed for good. No snapshot was delivered and, with no watch
    /// armed, none will be until the process restarts.
    Failed(ErrorCode),
}

impl StartupOutcome {
    /// true if the consumer holds an initial snapshot
    pub fn is_synced(&self) -> bool {
        matches!(self, StartupOutcome::Synced { .. })
    }
}

impl fmt::Display for StartupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupOutcome::Synced { endpoints } => write!(f, "synced {endpoints} endpoint(s)"),
            StartupOutcome::Retrying(code) => write!(f, "retrying after {code}"),
            StartupOutcome::Failed(code) => write!(f, "failed with {code}"),
        }
    }
}

/// Lets the owning process block until the session is connected and until the
/// first fetch outcome is known.
#[derive(Debug)]
pub struct StartupGate {
    connection: watch::Receiver<ConnectionState>,
    first: watch::Sender<Option<StartupOutcome>>,
}

impl StartupGate {
    /// Create a gate observing the session connectivity `connection`
    pub fn new(connection: watch::Receiver<ConnectionState>) -> Self {
        let (first, _) = watch::channel(None);
        Self { connection, first }
    }

    /// Wait until the session reports [`ConnectionState::Connected`].
    ///
    /// Returns immediately if it already does. Fails if the session dropped
    /// its state channel, since it can then never connect.
    pub async fn wait_for_connection(&self) -> SyncResult<()> {
        let mut rx = self.connection.clone();
        rx.wait_for(|state| *state == ConnectionState::Connected)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::SessionClosed)
    }

    /// true if the session currently reports connected
    pub fn is_connected(&self) -> bool {
        *self.connection.borrow() == ConnectionState::Connected
    }

    /// Record the first outcome. Later calls are ignored; returns true only
    /// for the call that set it.
    pub fn record(&self, outcome: StartupOutcome) -> bool {
        let set = self.first.send_if_modified(|first| {
            if first.is_none() {
                *first = Some(outcome);
                true
            } else {
                false
            }
        });
        if set {
            debug!(%outcome, "first outcome recorded");
        }
        set
    }

    /// The first outcome, if already known
    pub fn first_outcome(&self) -> Option<StartupOutcome> {
        *self.first.borrow()
    }

    /// Wait until the first outcome is known and return it.
    pub async fn wait_for_first_outcome(&self) -> StartupOutcome {
        let mut rx = self.first.subscribe();
        // the sender lives in `self`, so the channel cannot close under us
        match rx.wait_for(Option::is_some).await {
            Ok(first) => (*first).unwrap_or(StartupOutcome::Failed(ErrorCode::SystemError)),
            Err(_) => StartupOutcome::Failed(ErrorCode::SystemError),
        }
    }
}
