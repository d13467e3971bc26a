//! # Analysis Engine
//!
//! Owns all per-key window state and turns admitted events into metrics.
//! The per-key lifecycle is a small state machine:
//!
//! ```text
//! ABSENT --first event--> ACTIVE --event--> ACTIVE (update, purge, emit)
//! ACTIVE --idle past retention--> IDLE-EVICTED (state discarded)
//! IDLE-EVICTED == ABSENT for all purposes; the next event starts fresh.
//! ```
//!
//! Late events (older than the key's window lower bound) are dropped and
//! counted, never retroactively recomputed. Eviction is event-time driven
//! (a watermark advanced by admitted timestamps), checked both on access and
//! by the periodic sweep, so replaying one sequence twice yields identical
//! metrics regardless of wall-clock timing.
//!
//! All state lives in one map owned by the single engine task; no window is
//! ever shared across execution contexts.

use std::collections::HashMap;
use std::sync::Arc;

use lib_common::config::StreamConfig;
use lib_common::diagnostics::PipelineCounters;
use lib_common::errors::ConfigError;
use lib_common::event::{Event, Metric};

use crate::window::WindowState;

pub struct AnalysisEngine {
    config: StreamConfig,
    windows: HashMap<String, WindowState>,
    /// Highest event timestamp seen across all keys.
    watermark: u64,
    counters: Arc<PipelineCounters>,
}

impl AnalysisEngine {
    /// Builds an engine over a validated configuration. A bad configuration
    /// is fatal here, before any event flows.
    pub fn new(
        config: StreamConfig,
        counters: Arc<PipelineCounters>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            windows: HashMap::new(),
            watermark: 0,
            counters,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of keys currently holding window state.
    pub fn active_keys(&self) -> usize {
        self.windows.len()
    }

    /// Admits one event and returns the metrics it produced (empty when the
    /// event was dropped by the out-of-order policy).
    pub fn admit(&mut self, event: &Event) -> Vec<Metric> {
        self.watermark = self.watermark.max(event.timestamp);

        // Idle check on access: a key silent for longer than the retention
        // period restarts from scratch, with no residual aggregates.
        if let Some(window) = self.windows.get(&event.key) {
            let gap = event.timestamp.saturating_sub(window.latest_timestamp());
            if gap > self.config.retention_ms {
                log::debug!(
                    "key {} idle for {}ms, evicting stale window",
                    event.key,
                    gap
                );
                self.windows.remove(&event.key);
                self.counters.record_keys_evicted(1);
            }
        }

        let window = self.windows.entry(event.key.clone()).or_default();

        // Out-of-order policy: drop anything older than the window lower
        // bound. No retroactive recomputation, ever.
        let lower_bound = window.lower_bound(self.config.window_ms);
        if !window.is_empty() && event.timestamp < lower_bound {
            log::debug!(
                "dropping out-of-order event for {}: ts {} < lower bound {}",
                event.key,
                event.timestamp,
                lower_bound
            );
            self.counters.record_out_of_order_dropped();
            return Vec::new();
        }

        window.admit(event, self.config.window_ms);

        let mut metrics = Vec::with_capacity(self.config.metric_types.len());
        for &metric_type in &self.config.metric_types {
            match window.compute(metric_type) {
                Ok(value) => {
                    self.counters.record_metric_emitted();
                    metrics.push(Metric {
                        key: event.key.clone(),
                        timestamp: event.timestamp,
                        metric_type,
                        value,
                    });
                }
                Err(e) => {
                    // Unreachable right after an admission, but fatal only to
                    // this one computation if it ever fires.
                    log::warn!("skipping metric for {}: {}", event.key, e);
                }
            }
        }
        metrics
    }

    /// Evicts every key idle past the retention period, relative to the
    /// watermark. Returns how many were discarded.
    pub fn sweep_idle(&mut self) -> usize {
        let retention = self.config.retention_ms;
        let watermark = self.watermark;
        let before = self.windows.len();
        self.windows
            .retain(|_, window| watermark.saturating_sub(window.latest_timestamp()) <= retention);
        let evicted = before - self.windows.len();
        if evicted > 0 {
            log::debug!("idle sweep evicted {} keys", evicted);
            self.counters.record_keys_evicted(evicted as u64);
        }
        evicted
    }
}
