// Shared library for the streamlab workspace: the event/metric data model,
// the error taxonomy, stream configuration, the TLV wire codec and the
// pipeline diagnostics counters.

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod event;
pub mod wire;

// Re-export the types every member crate touches.
pub use config::{ClientConfig, ReconnectPolicy, ServerConfig, StreamConfig};
pub use diagnostics::PipelineCounters;
pub use errors::{ConfigError, EngineError, FeedError, SinkError};
pub use event::{Event, Metric, MetricType};
