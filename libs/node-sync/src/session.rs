//! The coordination-store session seen from the sync side.
//!
//! A store delivers two kinds of asynchronous notifications for a watched
//! children fetch: the fetch result, and later at most one watch trigger for
//! the registration that fetch created. Both are funnelled into a single
//! ordered channel of [`SessionEvent`]s owned by the [`WatchCycle`].
//!
//! The sinks are type-state: [`FetchSink::complete`] consumes the fetch sink
//! and hands back the [`WatchSink`], which itself is consumed when fired. An
//! implementation therefore cannot report a watch before its fetch result, nor
//! fire a registration twice.
//!
//! [`WatchCycle`]: crate::WatchCycle

use tokio::sync::{mpsc, watch};

use crate::config::GroupPath;
use crate::error::ErrorCode;

/// Connection state observable by consumers for startup checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and operating normally.
    Connected,
    /// Attempting to reconnect after a failure.
    Reconnecting,
    /// Not connected; connection was never established or has been shut down.
    Disconnected,
}

/// Identifies one watched fetch and the watch it arms.
pub type RegistrationId = u64;

/// Kind of a watch notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Session state change delivered on the watch channel.
    Session,
    /// The watched node was created.
    NodeCreated,
    /// The watched node was deleted.
    NodeDeleted,
    /// The watched node's data changed.
    NodeDataChanged,
    /// A child was added to or removed from the watched node.
    NodeChildrenChanged,
    /// Anything else the store may report.
    Other,
}

/// One notification from the session, in store order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Result of a watched children fetch.
    FetchCompleted {
        /// registration created by the fetch
        registration: RegistrationId,
        /// raw child names, or the store's error code
        result: Result<Vec<String>, ErrorCode>,
    },
    /// A watch armed by a successful fetch fired.
    Watch {
        /// registration that fired
        registration: RegistrationId,
        /// what happened
        kind: WatchEventKind,
    },
}

/// Reports the result of one watched fetch. Consumed by [`complete`].
///
/// [`complete`]: FetchSink::complete
#[derive(Debug)]
pub struct FetchSink {
    registration: RegistrationId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl FetchSink {
    /// Create a sink delivering into `tx`
    pub fn new(registration: RegistrationId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { registration, tx }
    }

    /// registration this sink reports for
    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    /// Deliver the fetch result and return the sink for the watch it armed.
    ///
    /// A failed fetch arms nothing; the returned sink may simply be dropped.
    /// Delivery to a cycle that has already stopped is silently discarded.
    pub fn complete(self, result: Result<Vec<String>, ErrorCode>) -> WatchSink {
        let _ = self.tx.send(SessionEvent::FetchCompleted {
            registration: self.registration,
            result,
        });
        WatchSink {
            registration: self.registration,
            tx: self.tx,
        }
    }
}

/// Reports the single trigger of a watch. Consumed by [`fire`].
///
/// [`fire`]: WatchSink::fire
#[derive(Debug)]
pub struct WatchSink {
    registration: RegistrationId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl WatchSink {
    /// registration this sink reports for
    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    /// Deliver the watch notification. Returns false if nobody is listening.
    pub fn fire(self, kind: WatchEventKind) -> bool {
        self.tx
            .send(SessionEvent::Watch {
                registration: self.registration,
                kind,
            })
            .is_ok()
    }

    /// true once the receiving cycle has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes once the receiving cycle has gone away, so implementations
    /// can stop waiting on a watch nobody will handle.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Connection to a hierarchical coordination store.
///
/// Session lifecycle (connect, reconnect, authentication) belongs to the
/// implementation; the sync side only observes connectivity and issues
/// watched fetches.
pub trait CoordinationSession: Send + Sync + 'static {
    /// Subscribe to connectivity changes.
    fn state(&self) -> watch::Receiver<ConnectionState>;

    /// Returns true if the session is currently connected.
    fn is_connected(&self) -> bool {
        *self.state().borrow() == ConnectionState::Connected
    }

    /// Fetch the children of `path` and, in the same store operation, arm a
    /// one-shot watch for child-set changes on it.
    ///
    /// Must not block. The implementation calls [`FetchSink::complete`]
    /// exactly once, and on success may fire the returned [`WatchSink`] at
    /// most once afterwards.
    fn fetch_children_with_watch(&self, path: &GroupPath, sink: FetchSink);
}
