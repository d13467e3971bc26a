//! # Stream Configuration
//!
//! Immutable configuration for the pipeline, supplied at construction and
//! never mutated afterward. Loadable from a JSON file for the binaries, with
//! all validation done up front: a bad configuration is fatal at startup,
//! never a runtime surprise.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::event::MetricType;

/// Engine and queue configuration. Durations are carried as milliseconds so
/// the JSON surface stays flat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Length of the per-key sliding window, in milliseconds. Must be > 0.
    pub window_ms: u64,
    /// How long an idle key keeps its window before eviction, in
    /// milliseconds. Must be >= `window_ms`.
    pub retention_ms: u64,
    /// Which aggregates to emit per admitted event. Must be non-empty.
    pub metric_types: Vec<MetricType>,
    /// Capacity of the bounded queues on both sides of the engine. Must be
    /// > 0. Producers block when full; nothing is dropped.
    pub queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            retention_ms: 300_000,
            metric_types: vec![MetricType::Average, MetricType::Min, MetricType::Max],
            queue_capacity: 1024,
        }
    }
}

impl StreamConfig {
    /// Checks every invariant of the configuration surface.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::NonPositiveWindow);
        }
        if self.retention_ms < self.window_ms {
            return Err(ConfigError::RetentionShorterThanWindow {
                retention_ms: self.retention_ms,
                window_ms: self.window_ms,
            });
        }
        if self.metric_types.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }

    /// Loads and validates a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: StreamConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

/// Reconnect policy for the feed client: bounded exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Connection attempts before the failure becomes terminal. Must be > 0.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubles per attempt.
    pub backoff_base_ms: u64,
    /// Upper bound on the computed delay, in milliseconds.
    pub backoff_ceiling_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 100,
            backoff_ceiling_ms: 5_000,
        }
    }
}

impl ReconnectPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroReconnectAttempts);
        }
        Ok(())
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }
}

/// Everything the feed client needs to reach its upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upstream address, `host:port`.
    pub endpoint: String,
    /// Optional credential sent in the HELLO frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Feed server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// When set, clients must present this token in their HELLO frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}
