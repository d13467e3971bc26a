//! # Event Sources
//!
//! The ordered sequences the server streams to its clients. Every connected
//! client gets an independent cursor over the same underlying sequence
//! (broadcast semantics, not load-balanced), so cursors must be cheap and
//! side-effect free.
//!
//! Two implementations:
//! - [`ReplaySource`]: a fixed sequence loaded from a JSON-lines file. Two
//!   runs over the same file produce byte-identical event order and content.
//! - [`SyntheticSource`]: a seeded generator; one seed, one sequence, so
//!   synthetic runs are just as reproducible as file replays.

use lib_common::errors::ConfigError;
use lib_common::event::Event;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;

/// An ordered event sequence that can be iterated from the start any number
/// of times.
pub trait EventSource: Send + Sync {
    /// A fresh cursor positioned at the first event.
    fn cursor(&self) -> Box<dyn Iterator<Item = Event> + Send + '_>;

    /// Total number of events, when known up front.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    fn cursor(&self) -> Box<dyn Iterator<Item = Event> + Send + '_> {
        (**self).cursor()
    }

    fn len_hint(&self) -> Option<usize> {
        (**self).len_hint()
    }
}

/// Replays a recorded sequence, exactly as held in memory.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    events: Vec<Event>,
}

impl ReplaySource {
    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Loads a JSON-lines file, one event per line. Blank lines are allowed;
    /// anything else that does not parse is a hard error, because a replay
    /// that silently skips records is not a replay.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut events = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event =
                serde_json::from_str(line).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            events.push(event);
        }
        log::info!("loaded {} events from {}", events.len(), path.display());
        Ok(Self { events })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

impl EventSource for ReplaySource {
    fn cursor(&self) -> Box<dyn Iterator<Item = Event> + Send + '_> {
        Box::new(self.events.iter().cloned())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.events.len())
    }
}

/// Deterministic synthetic feed: `count` events spread over `keys` stream
/// keys, with a globally non-decreasing timestamp (which makes per-key
/// timestamps non-decreasing too, the ordering the client contract needs).
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    keys: usize,
    count: usize,
}

impl SyntheticSource {
    pub fn new(seed: u64, keys: usize, count: usize) -> Self {
        Self {
            seed,
            keys: keys.max(1),
            count,
        }
    }
}

impl EventSource for SyntheticSource {
    fn cursor(&self) -> Box<dyn Iterator<Item = Event> + Send + '_> {
        Box::new(SyntheticCursor {
            rng: StdRng::seed_from_u64(self.seed),
            keys: self.keys,
            remaining: self.count,
            timestamp: 0,
            sequence: 0,
        })
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.count)
    }
}

struct SyntheticCursor {
    rng: StdRng,
    keys: usize,
    remaining: usize,
    timestamp: u64,
    sequence: u64,
}

impl Iterator for SyntheticCursor {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        self.timestamp += self.rng.random_range(0..50u64);
        let key = format!("K{:02}", self.rng.random_range(0..self.keys));
        let value = self.rng.random_range(0.0..100.0f64);

        let event = Event::new(key, self.timestamp, value).with_sequence(self.sequence);
        self.sequence += 1;
        Some(event)
    }
}
