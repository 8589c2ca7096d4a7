//! # node-sync
//!
//! Keeps a consumer's view of the message-queue broker endpoints published as
//! child entries under one group path of a coordination store.
//!
//! This library provides:
//! - **Session trait** ([`CoordinationSession`]) describing the only store
//!   primitive the protocol needs: fetch children with a one-shot watch.
//! - **Watch cycle** that issues the watched fetch, re-arms on every
//!   children-changed notification and retries on connection loss.
//! - **Startup gate** letting the owning process wait for connectivity and for
//!   the outcome of the first fetch.
//! - **Formatter** turning raw child names into scheme-prefixed endpoints.
//! - **In-memory store** ([`memory::MemorySession`]) for tests and local runs.
//!
//! ## Example
//!
//! ```no_run
//! # async fn run() -> node_sync::SyncResult<()> {
//! use std::sync::Arc;
//! use node_sync::{NodeSync, SyncConfig, memory::MemorySession};
//!
//! let session = Arc::new(MemorySession::new());
//! session.set_children("/mqs/orders", ["10.0.0.1:9000"]);
//!
//! let (tx, rx) = tokio::sync::watch::channel(Vec::new());
//! let mut sync = NodeSync::new(session, SyncConfig::new("orders"))?;
//! let outcome = sync.start(tx).await?;
//! println!("{outcome}: {:?}", *rx.borrow());
//! # Ok(())
//! # }
//! ```
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![allow(clippy::cognitive_complexity)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

pub mod config;
pub mod consumer;
pub mod cycle;
pub mod error;
pub mod formatter;
pub mod gate;
pub mod memory;
pub mod metrics;
pub mod session;
pub mod sync;

// Re-export key types for convenient access
pub use config::{DEFAULT_BASE_DIR, DEFAULT_SCHEME, GroupPath, SyncConfig};
pub use consumer::NodeListConsumer;
pub use cycle::{CycleOutcome, WatchCycle};
pub use error::{ErrorCode, SyncError, SyncResult};
pub use formatter::{EndpointSet, NodeSetFormatter};
pub use gate::{StartupGate, StartupOutcome};
pub use session::{
    ConnectionState, CoordinationSession, FetchSink, RegistrationId, SessionEvent, WatchEventKind,
    WatchSink,
};
pub use sync::NodeSync;
