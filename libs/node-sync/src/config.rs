//! sync configuration

use std::{fmt, time::Duration};

use crate::error::{SyncError, SyncResult};

/// Top-level path under which every broker group is published
pub const DEFAULT_BASE_DIR: &str = "/mqs";
/// Transport scheme prefixed to each broker address
pub const DEFAULT_SCHEME: &str = "tcp://";
/// Delay before re-issuing a fetch that failed with a connection loss
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Immutable settings for one [`NodeSync`](crate::NodeSync) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// parent path of all groups, ex. "/mqs"
    pub base_dir: String,
    /// group name, appended to `base_dir`
    pub group: String,
    /// prefix for every endpoint, ex. "tcp://"
    pub scheme: String,
    /// wait applied before retrying after a connection loss
    pub retry_delay: Duration,
    /// upper bound on `start`, `None` waits forever
    pub startup_timeout: Option<Duration>,
}

impl SyncConfig {
    /// Config for `group` with every other field defaulted
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            ..Self::default()
        }
    }

    /// Build the [`GroupPath`] this config points at
    pub fn group_path(&self) -> SyncResult<GroupPath> {
        GroupPath::new(&self.base_dir, &self.group)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_dir: DEFAULT_BASE_DIR.to_owned(),
            group: String::new(),
            scheme: DEFAULT_SCHEME.to_owned(),
            retry_delay: DEFAULT_RETRY_DELAY,
            startup_timeout: None,
        }
    }
}

/// Store path of one group of endpoints: `base_dir + "/" + group`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupPath(String);

impl GroupPath {
    /// Join `base_dir` and `group`.
    ///
    /// `base_dir` must be absolute; a trailing `/` is dropped. `group` must be
    /// a single non-empty path segment.
    pub fn new(base_dir: &str, group: &str) -> SyncResult<Self> {
        if !base_dir.starts_with('/') {
            return Err(SyncError::InvalidConfig(format!(
                "base dir '{base_dir}' must be an absolute path"
            )));
        }
        if group.trim().is_empty() {
            return Err(SyncError::InvalidConfig("group must not be empty".into()));
        }
        if group.contains('/') {
            return Err(SyncError::InvalidConfig(format!(
                "group '{group}' must be a single path segment"
            )));
        }
        let base = base_dir.trim_end_matches('/');
        Ok(Self(format!("{base}/{group}")))
    }

    /// The full path
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GroupPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
