//! # Reconnect Backoff State Machine
//!
//! An explicit attempt counter plus a computed delay, instead of a blocking
//! retry loop. The state machine only computes durations; the caller decides
//! when to sleep, so the schedule is testable without real time.

use lib_common::config::ReconnectPolicy;
use std::time::Duration;

/// Tracks connection attempts against a [`ReconnectPolicy`].
#[derive(Debug)]
pub struct BackoffState {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl BackoffState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Registers a failed attempt and returns the delay before the next one,
    /// or `None` once the attempt ceiling is exhausted.
    ///
    /// Delays follow `base * 2^n`, capped at the configured ceiling.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.policy.max_attempts {
            return None;
        }

        let base = self.policy.backoff_base();
        let ceiling = self.policy.backoff_ceiling();
        let exp = (self.attempt - 1).min(31);
        let delay = base.saturating_mul(1u32 << exp);
        Some(delay.min(ceiling))
    }

    /// Failed attempts so far. A successful connection gets a fresh
    /// `BackoffState`, so the count always covers one outage.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
