//! # zk-coordination
//!
//! ZooKeeper implementation of [`node_sync::CoordinationSession`].
//!
//! - **Connection bootstrap** with per-attempt timeout and exponential
//!   backoff.
//! - **Connection state** republished on a watch channel so callers can wait
//!   for connectivity without polling.
//! - **Watched children fetch** issued as the single
//!   `get_and_watch_children` request, so the returned children and the armed
//!   watch always refer to the same version of the tree.
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

pub mod client;
pub mod error;

pub use client::{ZkConfig, ZkSession};
pub use error::{CoordinationError, CoordinationResult, error_code};
