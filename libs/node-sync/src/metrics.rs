#![allow(missing_docs)] // proc macros dont play nicely with docstrings

//! # metrics
//!
//! Endpoint sync counters. Lazily registered in the default prometheus
//! registry on first access.
use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntGauge, register_int_counter, register_int_gauge};

lazy_static! {
    /// When the process started
    pub static ref START_TIME: Instant = Instant::now();

    /// process uptime in seconds, refreshed on scrape
    pub static ref UPTIME: IntGauge = register_int_gauge!("uptime", "server uptime (seconds)").unwrap();

    /// watched children fetches issued
    pub static ref NODE_SYNC_FETCHES: IntCounter = register_int_counter!(
        "node_sync_fetches",
        "count of watched children fetches issued"
    ).unwrap();

    /// endpoint lists handed to the consumer
    pub static ref NODE_SYNC_DELIVERIES: IntCounter = register_int_counter!(
        "node_sync_deliveries",
        "count of refreshed endpoint lists delivered"
    ).unwrap();

    /// fetches failed with a retryable code and re-issued
    pub static ref NODE_SYNC_RETRIES: IntCounter = register_int_counter!(
        "node_sync_retries",
        "count of fetches re-issued after a connection loss"
    ).unwrap();

    /// fetches failed with a fatal code
    pub static ref NODE_SYNC_FAILURES: IntCounter = register_int_counter!(
        "node_sync_failures",
        "count of fetches failed with a non-retryable code"
    ).unwrap();

    /// children-changed notifications acted on
    pub static ref NODE_SYNC_WATCH_TRIGGERS: IntCounter = register_int_counter!(
        "node_sync_watch_triggers",
        "count of children-changed notifications that re-triggered a fetch"
    ).unwrap();

    /// notifications dropped (wrong kind or stale registration)
    pub static ref NODE_SYNC_WATCH_IGNORED: IntCounter = register_int_counter!(
        "node_sync_watch_ignored",
        "count of watch notifications ignored"
    ).unwrap();

    /// size of the last delivered endpoint list
    pub static ref NODE_SYNC_ENDPOINTS: IntGauge = register_int_gauge!(
        "node_sync_endpoints",
        "number of endpoints in the last delivered list"
    ).unwrap();
}
