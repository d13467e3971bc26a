//! # Event and Metric Model
//!
//! The records that flow through the pipeline. An `Event` is one timestamped
//! observation for a stream key, produced by the feed client (or the server in
//! replay mode) and consumed exactly once by the analysis engine. A `Metric`
//! is one derived value the engine emits per admitted event.
//!
//! Both are value types: immutable after creation, no shared mutation, no
//! back-references into engine state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One observation on a logical stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifies the logical stream (instrument, entity id, ...).
    pub key: String,
    /// Source-supplied time in milliseconds. Non-decreasing per key as
    /// delivered by the client; used for window ordering, never wall clock.
    pub timestamp: u64,
    /// Numeric payload.
    pub value: f64,
    /// Optional upstream sequence number, carried for gap detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl Event {
    pub fn new(key: impl Into<String>, timestamp: u64, value: f64) -> Self {
        Self {
            key: key.into(),
            timestamp,
            value,
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// The closed set of aggregates the engine can maintain.
///
/// Each variant has a dedicated incremental update path in the engine,
/// selected by a single `match` at admission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Average,
    Min,
    Max,
    Sum,
    Count,
    Last,
}

impl MetricType {
    /// Every supported metric, in a fixed order.
    pub const ALL: [MetricType; 6] = [
        MetricType::Average,
        MetricType::Min,
        MetricType::Max,
        MetricType::Sum,
        MetricType::Count,
        MetricType::Last,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Average => "average",
            MetricType::Min => "min",
            MetricType::Max => "max",
            MetricType::Sum => "sum",
            MetricType::Count => "count",
            MetricType::Last => "last",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One derived value, timestamped with the event that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub timestamp: u64,
    pub metric_type: MetricType,
    pub value: f64,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}@{} = {}",
            self.key, self.metric_type, self.timestamp, self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_round_trip() {
        let ev = Event::new("AAPL", 1_700_000_000_000, 182.5).with_sequence(42);
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn event_sequence_is_optional_on_the_wire() {
        let back: Event =
            serde_json::from_str(r#"{"key":"A","timestamp":10,"value":1.5}"#).unwrap();
        assert_eq!(back.sequence, None);
    }

    #[test]
    fn metric_type_names_are_stable() {
        // CSV headers and config files depend on these strings.
        assert_eq!(MetricType::Average.as_str(), "average");
        assert_eq!(
            serde_json::to_string(&MetricType::Min).unwrap(),
            r#""min""#
        );
        let back: MetricType = serde_json::from_str(r#""average""#).unwrap();
        assert_eq!(back, MetricType::Average);
    }
}
