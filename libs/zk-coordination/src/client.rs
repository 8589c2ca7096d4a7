//! ZooKeeper session with connect retry/backoff and observable state.
//!
//! Wraps `zookeeper-client`, which reconnects on its own once a session is
//! established. This layer adds bounded initial connection attempts and
//! republishes the client's session state as a [`ConnectionState`] watch
//! channel for the startup gate.

use std::time::Duration;

use node_sync::{ConnectionState, CoordinationSession, FetchSink, GroupPath, WatchEventKind};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use zookeeper_client as zk;

use crate::error::{CoordinationError, CoordinationResult, error_code};

/// Default connection timeout if not configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Base delay for retrying initial connections.
const CONNECT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for retry backoff during initial connect.
const MAX_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Settings for reaching the ensemble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkConfig {
    /// comma separated `host:port` list, optionally followed by a chroot
    pub servers: String,
    /// bound on each connection attempt
    pub connect_timeout: Duration,
    /// retries after the first failed attempt
    pub connect_retry_max: u32,
}

impl ZkConfig {
    /// Config for `servers` with default timeout and no retries
    pub fn new(servers: impl Into<String>) -> Self {
        Self {
            servers: servers.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_retry_max: 0,
        }
    }

    fn validate(&self) -> CoordinationResult<()> {
        if self.servers.trim().is_empty() {
            return Err(CoordinationError::Config(
                "at least one ZooKeeper server is required".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(CoordinationError::Config(
                "connect timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Connected ZooKeeper session.
#[derive(Clone)]
pub struct ZkSession {
    client: zk::Client,
    state: watch::Receiver<ConnectionState>,
    servers: String,
}

impl ZkSession {
    /// Establish the session.
    ///
    /// Each attempt is bounded by `connect_timeout`; failed attempts are
    /// retried with exponential backoff up to `connect_retry_max` times.
    pub async fn connect(config: ZkConfig) -> CoordinationResult<Self> {
        config.validate()?;
        info!(
            servers = %config.servers,
            connect_retry_max = config.connect_retry_max,
            "connecting to ZooKeeper"
        );

        let total_attempts = config.connect_retry_max.saturating_add(1);
        for attempt in 0..total_attempts {
            let err = match tokio::time::timeout(
                config.connect_timeout,
                zk::Client::connect(&config.servers),
            )
            .await
            {
                Ok(Ok(client)) => {
                    info!(
                        attempt = attempt + 1,
                        total_attempts, "ZooKeeper session established"
                    );
                    return Ok(Self::from_client(client, config.servers));
                }
                Ok(Err(err)) => CoordinationError::Transport(format!(
                    "connecting to '{}' failed: {err}",
                    config.servers
                )),
                Err(_) => CoordinationError::Timeout(format!(
                    "connecting to '{}' timed out after {:?}",
                    config.servers, config.connect_timeout
                )),
            };

            let attempt_num = attempt + 1;
            if attempt_num >= total_attempts {
                error!(
                    attempts = total_attempts,
                    error = %err,
                    "ZooKeeper connection failed after all retry attempts"
                );
                return Err(err);
            }

            let delay = CONNECT_RETRY_BASE_DELAY
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(MAX_CONNECT_RETRY_DELAY);
            warn!(
                attempt = attempt_num,
                total_attempts,
                retry_in_ms = delay.as_millis(),
                error = %err,
                "ZooKeeper connection attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }

        unreachable!("initial ZooKeeper connect loop should return on success or terminal failure")
    }

    fn from_client(client: zk::Client, servers: String) -> Self {
        let mut watcher = client.state_watcher();
        let (tx, state) = watch::channel(connection_state(watcher.state()));
        tokio::spawn(forward_state(watcher, tx));
        Self {
            client,
            state,
            servers,
        }
    }

    /// Returns the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Servers this session was created for
    pub fn servers(&self) -> &str {
        &self.servers
    }
}

impl CoordinationSession for ZkSession {
    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn fetch_children_with_watch(&self, path: &GroupPath, sink: FetchSink) {
        let client = self.client.clone();
        let path = path.to_string();
        tokio::spawn(async move {
            let registration = sink.registration();
            match client.get_and_watch_children(&path).await {
                Ok((children, _stat, watcher)) => {
                    trace!(%path, registration, children = children.len(), "children fetched, watch armed");
                    let watch = sink.complete(Ok(children));
                    tokio::select! {
                        event = watcher.changed() => {
                            trace!(%path, registration, event_type = ?event.event_type, "watch fired");
                            watch.fire(event_kind(event.event_type));
                        }
                        _ = watch.closed() => {
                            trace!(%path, registration, "sync stopped, abandoning watch");
                        }
                    }
                }
                Err(err) => {
                    let code = error_code(&err);
                    debug!(%path, registration, error = %err, %code, "children fetch failed");
                    sink.complete(Err(code));
                }
            }
        });
    }
}

impl std::fmt::Debug for ZkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZkSession")
            .field("servers", &self.servers)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Republish session state changes until the session terminates or nobody
/// listens any more.
async fn forward_state(mut watcher: zk::StateWatcher, tx: watch::Sender<ConnectionState>) {
    loop {
        let session_state = tokio::select! {
            _ = tx.closed() => {
                debug!("no connection state subscribers left");
                return;
            }
            session_state = watcher.changed() => session_state,
        };
        let state = connection_state(session_state);
        match state {
            ConnectionState::Connected => info!(?session_state, "ZooKeeper session connected"),
            ConnectionState::Reconnecting => {
                warn!(?session_state, "ZooKeeper connection lost, reconnecting")
            }
            ConnectionState::Disconnected => {
                error!(?session_state, "ZooKeeper session terminated")
            }
        }
        tx.send_replace(state);
        if is_terminal(session_state) {
            return;
        }
    }
}

fn connection_state(state: zk::SessionState) -> ConnectionState {
    match state {
        zk::SessionState::SyncConnected | zk::SessionState::ConnectedReadOnly => {
            ConnectionState::Connected
        }
        zk::SessionState::Disconnected => ConnectionState::Reconnecting,
        #[allow(unreachable_patterns)]
        _ => ConnectionState::Disconnected,
    }
}

fn is_terminal(state: zk::SessionState) -> bool {
    matches!(
        state,
        zk::SessionState::Expired | zk::SessionState::Closed | zk::SessionState::AuthFailed
    )
}

fn event_kind(event_type: zk::EventType) -> WatchEventKind {
    match event_type {
        zk::EventType::Session => WatchEventKind::Session,
        zk::EventType::NodeCreated => WatchEventKind::NodeCreated,
        zk::EventType::NodeDeleted => WatchEventKind::NodeDeleted,
        zk::EventType::NodeDataChanged => WatchEventKind::NodeDataChanged,
        zk::EventType::NodeChildrenChanged => WatchEventKind::NodeChildrenChanged,
        #[allow(unreachable_patterns)]
        _ => WatchEventKind::Other,
    }
}
