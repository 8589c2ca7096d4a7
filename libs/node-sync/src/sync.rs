//! Process-facing entry point: start, wait for the first snapshot, shut down.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{GroupPath, SyncConfig};
use crate::consumer::NodeListConsumer;
use crate::cycle::WatchCycle;
use crate::error::{SyncError, SyncResult};
use crate::formatter::NodeSetFormatter;
use crate::gate::{StartupGate, StartupOutcome};
use crate::session::CoordinationSession;

/// Keeps a consumer in sync with the endpoints under one group path.
///
/// Owns the startup gate and the watch cycle task. Dropping it cancels the
/// cycle; [`shutdown`] additionally waits for the task to finish.
///
/// [`shutdown`]: NodeSync::shutdown
pub struct NodeSync<S> {
    session: Arc<S>,
    config: SyncConfig,
    path: GroupPath,
    gate: Arc<StartupGate>,
    token: CancellationToken,
    started: bool,
    task: Option<JoinHandle<()>>,
}

impl<S: CoordinationSession> NodeSync<S> {
    /// Create a new instance for `session`, without starting it.
    pub fn new(session: Arc<S>, config: SyncConfig) -> SyncResult<Self> {
        let path = config.group_path()?;
        let gate = Arc::new(StartupGate::new(session.state()));
        Ok(Self {
            session,
            config,
            path,
            gate,
            token: CancellationToken::new(),
            started: false,
            task: None,
        })
    }

    /// Stop the cycle when `token` is cancelled, in addition to
    /// [`shutdown`](NodeSync::shutdown) and drop.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Wait for the session to connect, begin watching the group path and
    /// wait until the first fetch outcome is known.
    ///
    /// On return the consumer has received zero or one initial snapshot; the
    /// returned [`StartupOutcome`] says which. Later snapshots arrive on the
    /// cycle task. With a `startup_timeout` configured the whole sequence is
    /// bounded and the cycle is cancelled if the bound expires.
    pub async fn start<C: NodeListConsumer>(&mut self, consumer: C) -> SyncResult<StartupOutcome> {
        if self.started {
            return Err(SyncError::AlreadyStarted);
        }
        self.started = true;

        let Some(after) = self.config.startup_timeout else {
            return self.startup(consumer).await;
        };
        let res = tokio::time::timeout(after, self.startup(consumer)).await;
        match res {
            Ok(res) => res,
            Err(_) => {
                let waiting_for = if self.task.is_some() {
                    "first outcome"
                } else {
                    "connection"
                };
                error!(path = %self.path, ?after, waiting_for, "startup timed out");
                self.token.cancel();
                Err(SyncError::StartupTimeout { waiting_for, after })
            }
        }
    }

    async fn startup<C: NodeListConsumer>(&mut self, consumer: C) -> SyncResult<StartupOutcome> {
        info!(path = %self.path, "waiting for coordination session to connect");
        self.gate.wait_for_connection().await?;
        debug!(path = %self.path, "coordination session connected");

        let cycle = WatchCycle::new(
            Arc::clone(&self.session),
            consumer,
            self.path.clone(),
            NodeSetFormatter::new(self.config.scheme.clone()),
            Arc::clone(&self.gate),
            self.config.retry_delay,
            self.token.clone(),
        );
        self.task = Some(tokio::spawn(cycle.run()));

        let outcome = self.gate.wait_for_first_outcome().await;
        match outcome {
            StartupOutcome::Synced { .. } => info!(path = %self.path, %outcome, "initial sync done"),
            StartupOutcome::Retrying(_) => {
                warn!(path = %self.path, %outcome, "startup continuing without endpoints")
            }
            StartupOutcome::Failed(_) => {
                error!(path = %self.path, %outcome, "startup continuing without endpoints")
            }
        }
        Ok(outcome)
    }

    /// Stop issuing fetches and wait for the cycle task to exit. Results still
    /// in flight are discarded.
    pub async fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!(?err, "watch cycle task failed");
            }
        }
        info!(path = %self.path, "node sync stopped");
    }

    /// true while the cycle task is alive
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// The watched path
    pub fn group_path(&self) -> &GroupPath {
        &self.path
    }

    /// The first outcome, once known
    pub fn first_outcome(&self) -> Option<StartupOutcome> {
        self.gate.first_outcome()
    }

    /// Token cancelling the cycle
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl<S> Drop for NodeSync<S> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<S> std::fmt::Debug for NodeSync<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSync")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
