//! Receivers of refreshed endpoint lists.

use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Receives the full endpoint list after every successful fetch.
///
/// Called from the cycle task, never re-entrantly, at most once per
/// successful cycle. Implementations must not block; hand the list off and
/// return.
pub trait NodeListConsumer: Send + 'static {
    /// Replace the consumer's view with `endpoints`
    fn sync_endpoints(&self, endpoints: Vec<String>);
}

impl NodeListConsumer for watch::Sender<Vec<String>> {
    fn sync_endpoints(&self, endpoints: Vec<String>) {
        // keep the value even if no receiver is subscribed yet
        self.send_replace(endpoints);
    }
}

impl NodeListConsumer for mpsc::UnboundedSender<Vec<String>> {
    fn sync_endpoints(&self, endpoints: Vec<String>) {
        if self.send(endpoints).is_err() {
            warn!("endpoint receiver dropped, discarding refreshed list");
        }
    }
}

impl<F> NodeListConsumer for F
where
    F: Fn(Vec<String>) + Send + Sync + 'static,
{
    fn sync_endpoints(&self, endpoints: Vec<String>) {
        self(endpoints)
    }
}
