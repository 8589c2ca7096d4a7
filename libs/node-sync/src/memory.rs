//! In-process coordination store.
//!
//! Holds a flat map of path to children and behaves like the real store for
//! the one primitive the sync needs: a children fetch atomically arms a
//! one-shot watch, and every change to that path's child set fires (and
//! drops) the watches armed on it. Connectivity and failures are scriptable.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use crate::config::GroupPath;
use crate::error::ErrorCode;
use crate::session::{
    ConnectionState, CoordinationSession, FetchSink, WatchEventKind, WatchSink,
};

#[derive(Debug, Default)]
struct Tree {
    children: HashMap<String, Vec<String>>,
    watches: HashMap<String, Vec<WatchSink>>,
    failures: VecDeque<ErrorCode>,
    fetches: usize,
}

impl Tree {
    fn fire(&mut self, path: &str, kind: WatchEventKind) -> usize {
        let fired = self
            .watches
            .remove(path)
            .unwrap_or_default()
            .into_iter()
            .map(|sink| sink.fire(kind))
            .filter(|delivered| *delivered)
            .count();
        trace!(path, ?kind, fired, "fired watches");
        fired
    }

    fn replace(&mut self, path: &str, children: Vec<String>) {
        let changed = self.children.get(path) != Some(&children);
        self.children.insert(path.to_owned(), children);
        if changed {
            self.fire(path, WatchEventKind::NodeChildrenChanged);
        }
    }
}

/// In-memory [`CoordinationSession`].
#[derive(Debug)]
pub struct MemorySession {
    state: watch::Sender<ConnectionState>,
    tree: Mutex<Tree>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// A connected, empty store
    pub fn new() -> Self {
        Self::with_state(ConnectionState::Connected)
    }

    /// An empty store starting in `state`
    pub fn with_state(state: ConnectionState) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state,
            tree: Mutex::new(Tree::default()),
        }
    }

    /// Change the reported connectivity
    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Replace the children of `path`, creating it if needed. Fires the
    /// watches on `path` if the child set changed.
    pub fn set_children<I, T>(&self, path: &str, children: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let children = children.into_iter().map(Into::into).collect();
        self.tree.lock().replace(path, children);
    }

    /// Add one child to `path`, creating it if needed
    pub fn add_child(&self, path: &str, name: impl Into<String>) {
        let mut tree = self.tree.lock();
        let mut children = tree.children.get(path).cloned().unwrap_or_default();
        children.push(name.into());
        tree.replace(path, children);
    }

    /// Remove one child from `path`, if present
    pub fn remove_child(&self, path: &str, name: &str) {
        let mut tree = self.tree.lock();
        if let Some(children) = tree.children.get(path) {
            let children = children.iter().filter(|c| *c != name).cloned().collect();
            tree.replace(path, children);
        }
    }

    /// Delete `path`. Watches on it fire with [`WatchEventKind::NodeDeleted`].
    pub fn delete_node(&self, path: &str) {
        let mut tree = self.tree.lock();
        if tree.children.remove(path).is_some() {
            tree.fire(path, WatchEventKind::NodeDeleted);
        }
    }

    /// Make the next fetch fail with `code`. Queued failures are consumed in
    /// order, one per fetch.
    pub fn fail_next(&self, code: ErrorCode) {
        self.tree.lock().failures.push_back(code);
    }

    /// Fire every watch armed on `path` with `kind`; returns how many were
    /// delivered.
    pub fn fire_watches(&self, path: &str, kind: WatchEventKind) -> usize {
        self.tree.lock().fire(path, kind)
    }

    /// Number of fetches issued so far
    pub fn fetch_count(&self) -> usize {
        self.tree.lock().fetches
    }

    /// Number of watches currently armed on `path` whose receiver is alive
    pub fn armed_watches(&self, path: &str) -> usize {
        self.tree
            .lock()
            .watches
            .get(path)
            .map(|sinks| sinks.iter().filter(|sink| !sink.is_closed()).count())
            .unwrap_or(0)
    }
}

impl CoordinationSession for MemorySession {
    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn fetch_children_with_watch(&self, path: &GroupPath, sink: FetchSink) {
        // read and arm under one lock so no change can slip in between
        let mut tree = self.tree.lock();
        tree.fetches += 1;

        if let Some(code) = tree.failures.pop_front() {
            sink.complete(Err(code));
            return;
        }
        if *self.state.borrow() != ConnectionState::Connected {
            sink.complete(Err(ErrorCode::ConnectionLoss));
            return;
        }
        match tree.children.get(path.as_str()).cloned() {
            Some(children) => {
                let watch = sink.complete(Ok(children));
                tree.watches
                    .entry(path.as_str().to_owned())
                    .or_default()
                    .push(watch);
            }
            None => {
                sink.complete(Err(ErrorCode::NoNode));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::session::SessionEvent;

    fn path() -> GroupPath {
        GroupPath::new("/mqs", "orders").unwrap()
    }

    #[test]
    fn test_fetch_arms_one_shot_watch() {
        let store = MemorySession::new();
        store.set_children("/mqs/orders", ["a:1"]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        store.fetch_children_with_watch(&path(), FetchSink::new(0, tx));
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(store.armed_watches("/mqs/orders"), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::FetchCompleted {
                registration: 0,
                result: Ok(vec!["a:1".into()]),
            }
        );

        store.add_child("/mqs/orders", "b:2");
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Watch {
                registration: 0,
                kind: WatchEventKind::NodeChildrenChanged,
            }
        );
        // one-shot: a second change fires nothing
        store.add_child("/mqs/orders", "c:3");
        assert!(rx.try_recv().is_err());
        assert_eq!(store.armed_watches("/mqs/orders"), 0);
    }

    #[test]
    fn test_unchanged_set_does_not_fire() {
        let store = MemorySession::new();
        store.set_children("/mqs/orders", ["a:1"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.fetch_children_with_watch(&path(), FetchSink::new(0, tx));
        rx.try_recv().unwrap();

        store.set_children("/mqs/orders", ["a:1"]);
        store.remove_child("/mqs/orders", "missing");
        assert!(rx.try_recv().is_err());
        assert_eq!(store.armed_watches("/mqs/orders"), 1);
    }

    #[test]
    fn test_failures() {
        let store = MemorySession::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // missing node
        store.fetch_children_with_watch(&path(), FetchSink::new(0, tx.clone()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::FetchCompleted { result: Err(ErrorCode::NoNode), .. }
        ));

        // scripted
        store.set_children("/mqs/orders", ["a:1"]);
        store.fail_next(ErrorCode::NoAuth);
        store.fetch_children_with_watch(&path(), FetchSink::new(1, tx.clone()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::FetchCompleted { result: Err(ErrorCode::NoAuth), .. }
        ));

        // disconnected
        store.set_state(ConnectionState::Reconnecting);
        store.fetch_children_with_watch(&path(), FetchSink::new(2, tx));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::FetchCompleted { result: Err(ErrorCode::ConnectionLoss), .. }
        ));
        assert!(!store.is_connected());
        assert_eq!(store.fetch_count(), 3);
        assert_eq!(store.armed_watches("/mqs/orders"), 0);
    }

    #[test]
    fn test_delete_fires_node_deleted() {
        let store = MemorySession::new();
        store.set_children("/mqs/orders", ["a:1"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.fetch_children_with_watch(&path(), FetchSink::new(0, tx));
        rx.try_recv().unwrap();

        store.delete_node("/mqs/orders");
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Watch {
                registration: 0,
                kind: WatchEventKind::NodeDeleted,
            }
        );
    }
}
