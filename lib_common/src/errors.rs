//! # Error Taxonomy
//!
//! One enum per failure domain, with a clear retry contract for each variant:
//!
//! - `ConfigError` is always fatal at startup.
//! - `FeedError::Connection` is transient and retried with backoff up to the
//!   configured ceiling, after which it is terminal. `FeedError::Auth` is
//!   terminal immediately and never retried.
//! - `FeedError::Frame` (malformed message) is non-fatal: counted, dropped,
//!   and the stream continues.
//! - `EngineError::OutOfOrder` is non-fatal: counted and dropped.
//! - `EngineError::EmptyWindow` is fatal to that metric computation only.
//! - `SinkError` is retried a bounded number of times, then the affected
//!   metric is dropped with a counted diagnostic.

use thiserror::Error;

/// Fatal configuration problems, surfaced at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("window length must be positive")]
    NonPositiveWindow,

    #[error("retention period {retention_ms}ms is shorter than window length {window_ms}ms")]
    RetentionShorterThanWindow { retention_ms: u64, window_ms: u64 },

    #[error("at least one metric type must be configured")]
    NoMetrics,

    #[error("queue capacity must be positive")]
    ZeroQueueCapacity,

    #[error("reconnect max attempts must be positive")]
    ZeroReconnectAttempts,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures on the feed path between client and server.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport-level failure. Transient until the retry ceiling is reached.
    #[error("connection to {endpoint} failed: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Retry ceiling exhausted; the owning task must stop, not retry.
    #[error("giving up on {endpoint} after {attempts} connection attempts")]
    RetriesExhausted { endpoint: String, attempts: u32 },

    /// Credentials rejected by the server. Never retried.
    #[error("authentication rejected by {endpoint}")]
    Auth { endpoint: String },

    /// A frame that cannot be decoded. Non-fatal; counted and dropped.
    #[error("malformed frame: {reason}")]
    Frame { reason: String },

    /// I/O failure on an established stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures inside the analysis engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Event older than the window lower bound for its key. Dropped, never
    /// recomputed retroactively.
    #[error("out-of-order event for key {key}: ts {timestamp} < window lower bound {lower_bound}")]
    OutOfOrder {
        key: String,
        timestamp: u64,
        lower_bound: u64,
    },

    /// An aggregate was requested over a window holding no events. Fatal to
    /// that computation only; never silently NaN.
    #[error("cannot compute {metric} over an empty window")]
    EmptyWindow { metric: &'static str },
}

/// Failure to deliver a metric downstream.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),
}
