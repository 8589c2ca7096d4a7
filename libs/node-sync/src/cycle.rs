//! The fetch → watch → notify → re-fetch loop.
//!
//! Every fetch is issued together with its watch as one store operation, and a
//! new watch is only ever armed by a fetch. All results and triggers arrive on
//! one ordered channel handled by one task, so at most one registration is
//! pending at any time: either its fetch is in flight, or its watch is armed.

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::GroupPath;
use crate::consumer::NodeListConsumer;
use crate::error::ErrorCode;
use crate::formatter::{EndpointSet, NodeSetFormatter};
use crate::gate::{StartupGate, StartupOutcome};
use crate::metrics::{
    NODE_SYNC_DELIVERIES, NODE_SYNC_ENDPOINTS, NODE_SYNC_FAILURES, NODE_SYNC_FETCHES,
    NODE_SYNC_RETRIES, NODE_SYNC_WATCH_IGNORED, NODE_SYNC_WATCH_TRIGGERS,
};
use crate::session::{
    CoordinationSession, FetchSink, RegistrationId, SessionEvent, WatchEventKind,
};

/// Result of one watched fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Children fetched and formatted.
    Success(EndpointSet),
    /// Failed, the fetch is re-issued.
    RetryableFailure(ErrorCode),
    /// Failed, nothing is re-issued from this cycle.
    FatalFailure(ErrorCode),
}

impl CycleOutcome {
    /// Classify a raw fetch result.
    pub fn classify(
        result: Result<Vec<String>, ErrorCode>,
        formatter: &NodeSetFormatter,
    ) -> Self {
        match result {
            Ok(children) => CycleOutcome::Success(formatter.format(children)),
            Err(code) if code.is_retryable() => CycleOutcome::RetryableFailure(code),
            Err(code) => CycleOutcome::FatalFailure(code),
        }
    }

    /// What this outcome means to a caller waiting on startup
    pub fn startup_outcome(&self) -> StartupOutcome {
        match self {
            CycleOutcome::Success(endpoints) => StartupOutcome::Synced {
                endpoints: endpoints.len(),
            },
            CycleOutcome::RetryableFailure(code) => StartupOutcome::Retrying(*code),
            CycleOutcome::FatalFailure(code) => StartupOutcome::Failed(*code),
        }
    }
}

/// State of the single pending registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    /// fetch issued, result not yet seen
    Fetching(RegistrationId),
    /// fetch succeeded, its watch may fire
    Armed(RegistrationId),
}

/// Drives the watch-and-refresh protocol for one group path.
#[derive(Debug)]
pub struct WatchCycle<S, C> {
    session: Arc<S>,
    consumer: C,
    path: GroupPath,
    formatter: NodeSetFormatter,
    gate: Arc<StartupGate>,
    retry_delay: Duration,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    next_registration: RegistrationId,
    pending: Option<Registration>,
}

impl<S, C> WatchCycle<S, C>
where
    S: CoordinationSession,
    C: NodeListConsumer,
{
    /// Create a cycle. Nothing is fetched until [`run`] or [`trigger_fetch`].
    ///
    /// [`run`]: WatchCycle::run
    /// [`trigger_fetch`]: WatchCycle::trigger_fetch
    pub fn new(
        session: Arc<S>,
        consumer: C,
        path: GroupPath,
        formatter: NodeSetFormatter,
        gate: Arc<StartupGate>,
        retry_delay: Duration,
        token: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session,
            consumer,
            path,
            formatter,
            gate,
            retry_delay,
            token,
            tx,
            rx,
            next_registration: 0,
            pending: None,
        }
    }

    /// Issue the first fetch and handle events until cancelled.
    pub async fn run(mut self) {
        info!(path = %self.path, scheme = self.formatter.scheme(), "starting watch cycle");
        self.trigger_fetch();
        while self.step().await {}
        debug!(path = %self.path, "watch cycle stopped");
    }

    /// Wait for and handle a single event. Returns false once cancelled.
    pub async fn step(&mut self) -> bool {
        let event = tokio::select! {
            // a result racing cancellation is discarded
            biased;
            _ = self.token.cancelled() => return false,
            event = self.rx.recv() => event,
        };
        match event {
            Some(event) => {
                self.handle(event).await;
                !self.token.is_cancelled()
            }
            // unreachable while `self.tx` is alive
            None => false,
        }
    }

    /// Registration currently pending, if any
    pub fn pending_registration(&self) -> Option<RegistrationId> {
        self.pending.map(|reg| match reg {
            Registration::Fetching(id) | Registration::Armed(id) => id,
        })
    }

    /// true while a fetch is in flight
    pub fn is_fetching(&self) -> bool {
        matches!(self.pending, Some(Registration::Fetching(_)))
    }

    /// Issue one watched children fetch for the group path.
    ///
    /// Creates exactly one new registration. Refused (returns false) after
    /// cancellation or while another registration is still pending.
    pub fn trigger_fetch(&mut self) -> bool {
        if self.token.is_cancelled() {
            debug!(path = %self.path, "cycle cancelled, not fetching");
            return false;
        }
        if let Some(pending) = self.pending {
            warn!(path = %self.path, ?pending, "registration already pending, refusing to arm another");
            return false;
        }
        let registration = self.next_registration;
        self.next_registration += 1;
        self.pending = Some(Registration::Fetching(registration));

        NODE_SYNC_FETCHES.inc();
        debug!(path = %self.path, registration, "issuing watched children fetch");
        self.session
            .fetch_children_with_watch(&self.path, FetchSink::new(registration, self.tx.clone()));
        true
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::FetchCompleted {
                registration,
                result,
            } => self.on_fetch_result(registration, result).await,
            SessionEvent::Watch { registration, kind } => {
                self.on_children_changed(registration, kind)
            }
        }
    }

    async fn on_fetch_result(
        &mut self,
        registration: RegistrationId,
        result: Result<Vec<String>, ErrorCode>,
    ) {
        if self.pending != Some(Registration::Fetching(registration)) {
            debug!(path = %self.path, registration, "discarding stale fetch result");
            return;
        }
        let outcome = CycleOutcome::classify(result, &self.formatter);
        let startup = outcome.startup_outcome();
        match outcome {
            CycleOutcome::Success(endpoints) => {
                self.pending = Some(Registration::Armed(registration));
                info!(
                    path = %self.path,
                    endpoints = endpoints.len(),
                    "successfully got a list of mq nodes"
                );
                NODE_SYNC_DELIVERIES.inc();
                NODE_SYNC_ENDPOINTS.set(endpoints.len() as i64);
                self.consumer.sync_endpoints(endpoints.into_inner());
                self.gate.record(startup);
            }
            CycleOutcome::RetryableFailure(code) => {
                self.pending = None;
                error!(path = %self.path, %code, "connection loss in getting children, retrying");
                NODE_SYNC_RETRIES.inc();
                self.gate.record(startup);
                self.retry().await;
            }
            CycleOutcome::FatalFailure(code) => {
                self.pending = None;
                NODE_SYNC_FAILURES.inc();
                self.gate.record(startup);
                error!(
                    path = %self.path,
                    %code,
                    code_num = code.code(),
                    "getting children failed, no watch armed; endpoint list will not refresh until restart"
                );
            }
        }
    }

    /// Re-issue the fetch once the session is connected again.
    async fn retry(&mut self) {
        let token = self.token.clone();
        let gate = Arc::clone(&self.gate);
        let delay = self.retry_delay;
        let ready = async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            gate.wait_for_connection().await
        };
        tokio::select! {
            _ = token.cancelled() => {
                debug!(path = %self.path, "cycle cancelled before retry");
            }
            res = ready => match res {
                Ok(()) => {
                    self.trigger_fetch();
                }
                Err(err) => {
                    error!(path = %self.path, ?err, "session closed, giving up retry");
                }
            }
        }
    }

    fn on_children_changed(&mut self, registration: RegistrationId, kind: WatchEventKind) {
        if kind != WatchEventKind::NodeChildrenChanged {
            NODE_SYNC_WATCH_IGNORED.inc();
            debug!(path = %self.path, registration, ?kind, "ignoring watch event");
            return;
        }
        if self.pending != Some(Registration::Armed(registration)) {
            NODE_SYNC_WATCH_IGNORED.inc();
            debug!(path = %self.path, registration, "ignoring stale watch trigger");
            return;
        }
        NODE_SYNC_WATCH_TRIGGERS.inc();
        debug!(path = %self.path, registration, "children changed, refreshing");
        self.pending = None;
        self.trigger_fetch();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::watch;
    use tracing_test::traced_test;

    use super::*;
    use crate::memory::MemorySession;
    use crate::session::ConnectionState;

    const PATH: &str = "/mqs/orders";

    type Cycle = WatchCycle<MemorySession, mpsc::UnboundedSender<Vec<String>>>;

    fn cycle(
        session: &Arc<MemorySession>,
    ) -> (Cycle, mpsc::UnboundedReceiver<Vec<String>>, Arc<StartupGate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(StartupGate::new(session.state()));
        let cycle = WatchCycle::new(
            Arc::clone(session),
            tx,
            GroupPath::new("/mqs", "orders").unwrap(),
            NodeSetFormatter::new("tcp://"),
            Arc::clone(&gate),
            Duration::ZERO,
            CancellationToken::new(),
        );
        (cycle, rx, gate)
    }

    #[test]
    fn test_classify() {
        let fmt = NodeSetFormatter::new("tcp://");
        assert_eq!(
            CycleOutcome::classify(Ok(vec!["a:1".into()]), &fmt).startup_outcome(),
            StartupOutcome::Synced { endpoints: 1 }
        );
        assert_eq!(
            CycleOutcome::classify(Err(ErrorCode::ConnectionLoss), &fmt),
            CycleOutcome::RetryableFailure(ErrorCode::ConnectionLoss)
        );
        assert_eq!(
            CycleOutcome::classify(Err(ErrorCode::NoNode), &fmt),
            CycleOutcome::FatalFailure(ErrorCode::NoNode)
        );
    }

    #[tokio::test]
    async fn test_success_arms_watch() {
        let session = Arc::new(MemorySession::new());
        session.set_children(PATH, ["10.0.0.1:9000", "10.0.0.2:9000"]);
        let (mut cycle, mut rx, gate) = cycle(&session);

        assert!(cycle.trigger_fetch());
        assert!(cycle.is_fetching());
        assert!(cycle.step().await);

        assert_eq!(
            rx.try_recv().unwrap(),
            vec!["tcp://10.0.0.1:9000", "tcp://10.0.0.2:9000"]
        );
        assert!(!cycle.is_fetching());
        assert_eq!(cycle.pending_registration(), Some(0));
        assert_eq!(session.armed_watches(PATH), 1);
        assert_eq!(
            gate.first_outcome(),
            Some(StartupOutcome::Synced { endpoints: 2 })
        );
    }

    #[tokio::test]
    async fn test_refuses_double_registration() {
        let session = Arc::new(MemorySession::new());
        session.set_children(PATH, ["10.0.0.1:9000"]);
        let (mut cycle, _rx, _gate) = cycle(&session);

        assert!(cycle.trigger_fetch());
        assert!(!cycle.trigger_fetch());
        assert!(cycle.step().await);
        // watch armed, still pending
        assert!(!cycle.trigger_fetch());
        assert_eq!(session.fetch_count(), 1);
        assert_eq!(session.armed_watches(PATH), 1);
    }

    #[tokio::test]
    async fn test_children_changed_refetches_once() {
        let session = Arc::new(MemorySession::new());
        session.set_children(PATH, ["10.0.0.1:9000", "10.0.0.2:9000"]);
        let (mut cycle, mut rx, _gate) = cycle(&session);

        cycle.trigger_fetch();
        cycle.step().await;
        rx.try_recv().unwrap();

        session.add_child(PATH, "10.0.0.3:9000");
        // watch trigger -> new fetch
        assert!(cycle.step().await);
        assert_eq!(session.fetch_count(), 2);
        assert_eq!(cycle.pending_registration(), Some(1));
        // fetch result
        assert!(cycle.step().await);
        assert_eq!(
            rx.try_recv().unwrap(),
            vec![
                "tcp://10.0.0.1:9000",
                "tcp://10.0.0.2:9000",
                "tcp://10.0.0.3:9000"
            ]
        );
        assert_eq!(session.armed_watches(PATH), 1);
    }

    #[tokio::test]
    async fn test_ignores_other_event_kinds() {
        let session = Arc::new(MemorySession::new());
        session.set_children(PATH, ["10.0.0.1:9000"]);
        let (mut cycle, mut rx, _gate) = cycle(&session);

        cycle.trigger_fetch();
        cycle.step().await;
        rx.try_recv().unwrap();

        assert_eq!(session.fire_watches(PATH, WatchEventKind::Session), 1);
        assert!(cycle.step().await);
        assert_eq!(session.fetch_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_events_ignored() {
        let session = Arc::new(MemorySession::new());
        let (mut cycle, mut rx, _gate) = cycle(&session);

        cycle
            .handle(SessionEvent::FetchCompleted {
                registration: 42,
                result: Ok(vec!["a:1".into()]),
            })
            .await;
        cycle
            .handle(SessionEvent::Watch {
                registration: 42,
                kind: WatchEventKind::NodeChildrenChanged,
            })
            .await;
        assert!(rx.try_recv().is_err());
        assert_eq!(session.fetch_count(), 0);
        assert_eq!(cycle.pending_registration(), None);
    }

    #[tokio::test]
    async fn test_connection_loss_retries() {
        let session = Arc::new(MemorySession::new());
        session.set_children(PATH, ["10.0.0.1:9000"]);
        session.fail_next(ErrorCode::ConnectionLoss);
        let (mut cycle, mut rx, gate) = cycle(&session);

        cycle.trigger_fetch();
        // failure handled, retry issued inline
        assert!(cycle.step().await);
        assert_eq!(session.fetch_count(), 2);
        assert_eq!(
            gate.first_outcome(),
            Some(StartupOutcome::Retrying(ErrorCode::ConnectionLoss))
        );
        assert!(rx.try_recv().is_err());

        assert!(cycle.step().await);
        assert_eq!(rx.try_recv().unwrap(), vec!["tcp://10.0.0.1:9000"]);
    }

    #[tokio::test]
    async fn test_retry_waits_for_connection() {
        let session = Arc::new(MemorySession::new());
        session.set_children(PATH, ["10.0.0.1:9000"]);
        session.fail_next(ErrorCode::ConnectionLoss);
        let (mut cycle, mut rx, _gate) = cycle(&session);

        cycle.trigger_fetch();
        session.set_state(ConnectionState::Reconnecting);

        let reconnect = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                assert_eq!(session.fetch_count(), 1);
                session.set_state(ConnectionState::Connected);
            })
        };
        assert!(cycle.step().await);
        reconnect.await.unwrap();
        assert_eq!(session.fetch_count(), 2);
        assert!(cycle.step().await);
        assert_eq!(rx.try_recv().unwrap(), vec!["tcp://10.0.0.1:9000"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fatal_failure_does_not_retry() {
        let session = Arc::new(MemorySession::new());
        // no children set for PATH: NoNode
        let (mut cycle, mut rx, gate) = cycle(&session);

        cycle.trigger_fetch();
        assert!(cycle.step().await);
        assert_eq!(session.fetch_count(), 1);
        assert_eq!(cycle.pending_registration(), None);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            gate.first_outcome(),
            Some(StartupOutcome::Failed(ErrorCode::NoNode))
        );
        assert_eq!(session.armed_watches(PATH), 0);
        assert!(logs_contain("endpoint list will not refresh until restart"));
    }

    #[tokio::test]
    async fn test_cancelled_cycle_stops() {
        let session = Arc::new(MemorySession::new());
        session.set_children(PATH, ["10.0.0.1:9000"]);
        let (mut cycle, mut rx, _gate) = cycle(&session);
        cycle.token.cancel();

        assert!(!cycle.trigger_fetch());
        assert!(!cycle.step().await);
        assert_eq!(session.fetch_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let session = Arc::new(MemorySession::new());
        session.set_children(PATH, ["10.0.0.1:9000"]);
        let (tx, mut rx) = watch::channel(Vec::new());
        let gate = Arc::new(StartupGate::new(session.state()));
        let token = CancellationToken::new();
        let cycle = WatchCycle::new(
            Arc::clone(&session),
            tx,
            GroupPath::new("/mqs", "orders").unwrap(),
            NodeSetFormatter::new("tcp://"),
            Arc::clone(&gate),
            Duration::ZERO,
            token.clone(),
        );
        let task = tokio::spawn(cycle.run());

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), vec!["tcp://10.0.0.1:9000"]);

        session.remove_child(PATH, "10.0.0.1:9000");
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_empty());

        token.cancel();
        task.await.unwrap();
    }
}
