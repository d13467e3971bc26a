// Analysis engine: per-key rolling windows, incremental aggregates, the
// bounded-queue pipeline that ties client, engine and sink together, and the
// run statistics for the simulation binary.

pub mod engine;
pub mod pipeline;
pub mod sink;
pub mod stats;
pub mod window;

pub use engine::AnalysisEngine;
pub use pipeline::{run_engine, run_sink};
pub use sink::{CsvSink, LogSink, MetricSink, VecSink};
pub use stats::RunStats;
pub use window::WindowState;
