//! # Pipeline Diagnostics Counters
//!
//! Lock-free counters shared across the client, engine and sink tasks through
//! a single `Arc`. Per-event failures (malformed frames, out-of-order drops,
//! undeliverable metrics) never abort the stream; they land here so the run
//! report can account for every event that went in.
//!
//! `Relaxed` ordering throughout: the counters are independent tallies, no
//! other memory operation synchronizes on them.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineCounters {
    /// Events decoded and handed to the queue by the client.
    events_received: AtomicU64,
    /// Frames dropped because they could not be decoded into an event.
    malformed_dropped: AtomicU64,
    /// Events dropped by the engine's out-of-order policy.
    out_of_order_dropped: AtomicU64,
    /// Metrics emitted by the engine.
    metrics_emitted: AtomicU64,
    /// Metrics dropped after exhausting sink write retries.
    sink_dropped: AtomicU64,
    /// Connections the client opened (first connect and reconnects alike).
    connections_opened: AtomicU64,
    /// Failed connection attempts that were retried.
    reconnect_attempts: AtomicU64,
    /// Idle keys evicted by the engine.
    keys_evicted: AtomicU64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_dropped(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_out_of_order_dropped(&self) {
        self.out_of_order_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metric_emitted(&self) {
        self.metrics_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_dropped(&self) {
        self.sink_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_keys_evicted(&self, count: u64) {
        self.keys_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn malformed_dropped(&self) -> u64 {
        self.malformed_dropped.load(Ordering::Relaxed)
    }

    pub fn out_of_order_dropped(&self) -> u64 {
        self.out_of_order_dropped.load(Ordering::Relaxed)
    }

    pub fn metrics_emitted(&self) -> u64 {
        self.metrics_emitted.load(Ordering::Relaxed)
    }

    pub fn sink_dropped(&self) -> u64 {
        self.sink_dropped.load(Ordering::Relaxed)
    }

    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn keys_evicted(&self) -> u64 {
        self.keys_evicted.load(Ordering::Relaxed)
    }
}
