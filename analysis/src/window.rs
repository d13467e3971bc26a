//! # Per-Key Window State
//!
//! The mutable accumulator behind one stream key: a time-ordered buffer of
//! the events inside the current window plus incrementally maintained
//! aggregates. Updates are O(1) amortized (running sum for sum/average,
//! monotonic deques for exact min/max) instead of rescanning the buffer on
//! every admission.
//!
//! Invariants:
//! - the buffer only holds events within `window_ms` of the latest admitted
//!   timestamp for this key;
//! - the buffer is ordered by timestamp: a late but in-window admission is
//!   inserted at its position, so purging from the front always removes
//!   exactly the aged-out entries;
//! - min/max are exact (no drift); sum/average tolerate float accumulation
//!   drift, which is bounded by the window size.

use lib_common::errors::EngineError;
use lib_common::event::{Event, MetricType};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct WindowState {
    buffer: VecDeque<Event>,
    sum: f64,
    last: Option<f64>,
    /// Candidates for the window minimum: values increasing front to back.
    min_deque: VecDeque<(u64, f64)>,
    /// Candidates for the window maximum: values decreasing front to back.
    max_deque: VecDeque<(u64, f64)>,
    latest_ts: u64,
}

impl WindowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    /// Latest admitted timestamp for this key. Zero on a fresh window.
    pub fn latest_timestamp(&self) -> u64 {
        self.latest_ts
    }

    /// Oldest timestamp still allowed in the window.
    pub fn lower_bound(&self, window_ms: u64) -> u64 {
        self.latest_ts.saturating_sub(window_ms)
    }

    /// Admits an event and purges everything that just aged out.
    ///
    /// The caller (the engine) has already dropped events older than the
    /// window lower bound. In-window events behind the key's latest
    /// timestamp are still admissible; they take the slow path below.
    pub fn admit(&mut self, event: &Event, window_ms: u64) {
        let in_order = event.timestamp >= self.latest_ts;
        self.latest_ts = self.latest_ts.max(event.timestamp);

        if in_order {
            // Maintain the monotonic candidate deques. Equal values are kept
            // so the earlier entry can age out on its own timestamp.
            while matches!(self.min_deque.back(), Some(&(_, v)) if v > event.value) {
                self.min_deque.pop_back();
            }
            self.min_deque.push_back((event.timestamp, event.value));

            while matches!(self.max_deque.back(), Some(&(_, v)) if v < event.value) {
                self.max_deque.pop_back();
            }
            self.max_deque.push_back((event.timestamp, event.value));

            self.buffer.push_back(event.clone());
        } else {
            // Late but in-window: insert at timestamp position so the buffer
            // stays sorted and front purging stays sound. The candidate
            // deques assume admission in timestamp order, so they are
            // rebuilt from the retained buffer once purging is done.
            let at = self
                .buffer
                .partition_point(|e| e.timestamp <= event.timestamp);
            self.buffer.insert(at, event.clone());
        }
        self.sum += event.value;

        // Evict entries older than the window relative to the latest
        // timestamp, including candidates in the min/max deques.
        let lower = self.lower_bound(window_ms);
        while let Some(front) = self.buffer.front() {
            if front.timestamp >= lower {
                break;
            }
            self.sum -= front.value;
            self.buffer.pop_front();
        }
        if in_order {
            while matches!(self.min_deque.front(), Some(&(ts, _)) if ts < lower) {
                self.min_deque.pop_front();
            }
            while matches!(self.max_deque.front(), Some(&(ts, _)) if ts < lower) {
                self.max_deque.pop_front();
            }
        } else {
            self.rebuild_extremes();
        }
        self.last = self.buffer.back().map(|e| e.value);
    }

    /// Rebuilds the min/max candidate deques by scanning the retained
    /// buffer. Only needed after a late admission, which breaks the
    /// append-in-timestamp-order assumption the deques rely on.
    fn rebuild_extremes(&mut self) {
        self.min_deque.clear();
        self.max_deque.clear();
        for event in &self.buffer {
            while matches!(self.min_deque.back(), Some(&(_, v)) if v > event.value) {
                self.min_deque.pop_back();
            }
            self.min_deque.push_back((event.timestamp, event.value));

            while matches!(self.max_deque.back(), Some(&(_, v)) if v < event.value) {
                self.max_deque.pop_back();
            }
            self.max_deque.push_back((event.timestamp, event.value));
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.min_deque.front().map(|&(_, v)| v)
    }

    pub fn max(&self) -> Option<f64> {
        self.max_deque.front().map(|&(_, v)| v)
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// The events currently retained, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.buffer.iter()
    }

    /// Computes one aggregate over the current window.
    ///
    /// Aggregates that divide by the count fail with `EmptyWindow` on an
    /// empty buffer instead of producing NaN; `sum` and `count` are well
    /// defined as zero either way.
    pub fn compute(&self, metric_type: MetricType) -> Result<f64, EngineError> {
        match metric_type {
            MetricType::Average => {
                if self.buffer.is_empty() {
                    return Err(EngineError::EmptyWindow { metric: "average" });
                }
                Ok(self.sum / self.buffer.len() as f64)
            }
            MetricType::Min => self
                .min()
                .ok_or(EngineError::EmptyWindow { metric: "min" }),
            MetricType::Max => self
                .max()
                .ok_or(EngineError::EmptyWindow { metric: "max" }),
            MetricType::Sum => Ok(self.sum),
            MetricType::Count => Ok(self.buffer.len() as f64),
            MetricType::Last => self
                .last
                .ok_or(EngineError::EmptyWindow { metric: "last" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 60_000;

    fn admit_all(window: &mut WindowState, events: &[(u64, f64)]) {
        for &(ts, value) in events {
            window.admit(&Event::new("K", ts, value), WINDOW);
        }
    }

    /// Brute-force recomputation over the retained buffer, the ground truth
    /// the incremental aggregates must match.
    fn rescan(window: &WindowState) -> (f64, usize, Option<f64>, Option<f64>) {
        let values: Vec<f64> = window.events().map(|e| e.value).collect();
        let sum: f64 = values.iter().sum();
        let min = values.iter().cloned().reduce(f64::min);
        let max = values.iter().cloned().reduce(f64::max);
        (sum, values.len(), min, max)
    }

    #[test]
    fn incremental_aggregates_match_full_rescan() {
        // Deterministic but irregular sequence with ageing and duplicates.
        let mut window = WindowState::new();
        let mut ts = 0u64;
        let mut value = 37.0f64;
        for step in 0..500u64 {
            ts += (step * 7919) % 9_000; // bursts and gaps, some past the window
            value = (value * 1.7 + step as f64).rem_euclid(1_000.0) - 500.0;
            window.admit(&Event::new("K", ts, value), WINDOW);

            let (sum, count, min, max) = rescan(&window);
            assert_eq!(window.count(), count);
            assert!((window.sum() - sum).abs() < 1e-6, "sum drifted at step {}", step);
            assert_eq!(window.min(), min, "min wrong at step {}", step);
            assert_eq!(window.max(), max, "max wrong at step {}", step);
        }
    }

    #[test]
    fn events_age_out_of_the_window() {
        let mut window = WindowState::new();
        admit_all(&mut window, &[(0, 10.0), (30_000, 20.0), (70_000, 30.0)]);

        // At t=70_000 the event from t=0 is outside the 60s window.
        assert_eq!(window.count(), 2);
        assert_eq!(window.compute(MetricType::Average).unwrap(), 25.0);
        assert_eq!(window.min(), Some(20.0));
        assert_eq!(window.max(), Some(30.0));
    }

    #[test]
    fn min_max_handle_duplicates_exactly() {
        let mut window = WindowState::new();
        admit_all(
            &mut window,
            &[(0, 5.0), (10, 5.0), (20, 3.0), (30, 9.0), (40, 3.0)],
        );
        assert_eq!(window.min(), Some(3.0));
        assert_eq!(window.max(), Some(9.0));

        // Push the early entries out; the remaining extremes must be exact.
        window.admit(&Event::new("K", 60_025, 4.0), WINDOW);
        assert_eq!(window.min(), Some(3.0)); // t=30/40 entries still inside
        assert_eq!(window.max(), Some(9.0));
        window.admit(&Event::new("K", 60_031, 4.0), WINDOW);
        assert_eq!(window.max(), Some(4.0)); // 9.0 from t=30 aged out
    }

    #[test]
    fn stale_entries_age_out_even_after_a_late_admission() {
        let mut window = WindowState::new();
        // The second event lands exactly at the lower bound, behind the
        // key's latest timestamp; the next advance must push it out of
        // every aggregate.
        admit_all(
            &mut window,
            &[(100_000, 1.0), (40_000, 1_000.0), (100_001, 1.0)],
        );

        assert_eq!(window.count(), 2);
        assert!((window.sum() - 2.0).abs() < 1e-9);
        assert_eq!(window.compute(MetricType::Average).unwrap(), 1.0);
        assert_eq!(window.min(), Some(1.0));
        assert_eq!(window.max(), Some(1.0));
    }

    #[test]
    fn late_admission_keeps_extremes_exact() {
        let mut window = WindowState::new();
        admit_all(&mut window, &[(100_000, 5.0), (70_000, 9.0), (100_500, 2.0)]);
        assert_eq!(window.max(), Some(9.0));
        assert_eq!(window.min(), Some(2.0));

        // Advance until the late 9.0 ages out; the 5.0 it arrived behind
        // must still be the maximum.
        window.admit(&Event::new("K", 130_100, 1.0), WINDOW);
        assert_eq!(window.count(), 3);
        assert_eq!(window.max(), Some(5.0));
        assert_eq!(window.min(), Some(1.0));
    }

    #[test]
    fn empty_window_refuses_average_min_max_last() {
        let window = WindowState::new();
        assert!(matches!(
            window.compute(MetricType::Average),
            Err(EngineError::EmptyWindow { metric: "average" })
        ));
        assert!(window.compute(MetricType::Min).is_err());
        assert!(window.compute(MetricType::Max).is_err());
        assert!(window.compute(MetricType::Last).is_err());
        // Sum and count of nothing are zero, not errors.
        assert_eq!(window.compute(MetricType::Sum).unwrap(), 0.0);
        assert_eq!(window.compute(MetricType::Count).unwrap(), 0.0);
    }

    #[test]
    fn single_event_defines_every_aggregate() {
        let mut window = WindowState::new();
        window.admit(&Event::new("K", 100, 42.0), WINDOW);
        for metric_type in MetricType::ALL {
            let value = window.compute(metric_type).unwrap();
            match metric_type {
                MetricType::Count => assert_eq!(value, 1.0),
                _ => assert_eq!(value, 42.0),
            }
        }
    }
}
