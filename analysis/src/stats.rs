//! # Run Statistics
//!
//! Snapshot of a finished simulation round: throughput plus the pipeline's
//! drop and eviction counters, formatted for the console and for a CSV row
//! in the results directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib_common::diagnostics::PipelineCounters;
use lib_common::errors::SinkError;

#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub name: String,
    pub duration: Duration,
    pub events_received: u64,
    pub metrics_emitted: u64,
    pub malformed_dropped: u64,
    pub out_of_order_dropped: u64,
    pub sink_dropped: u64,
    pub keys_evicted: u64,
    pub connections_opened: u64,
    pub reconnect_attempts: u64,
}

impl RunStats {
    pub fn from_counters(
        name: impl Into<String>,
        duration: Duration,
        counters: &PipelineCounters,
    ) -> Self {
        Self {
            name: name.into(),
            duration,
            events_received: counters.events_received(),
            metrics_emitted: counters.metrics_emitted(),
            malformed_dropped: counters.malformed_dropped(),
            out_of_order_dropped: counters.out_of_order_dropped(),
            sink_dropped: counters.sink_dropped(),
            keys_evicted: counters.keys_evicted(),
            connections_opened: counters.connections_opened(),
            reconnect_attempts: counters.reconnect_attempts(),
        }
    }

    pub fn events_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.events_received as f64 / secs
        } else {
            0.0
        }
    }

    /// Console summary printed at the end of a run.
    pub fn report(&self) -> String {
        format!(
            "--- {} ---\n\
             duration            {:.3}s\n\
             events received     {}\n\
             events/sec          {:.0}\n\
             metrics emitted     {}\n\
             malformed dropped   {}\n\
             out-of-order drops  {}\n\
             sink drops          {}\n\
             keys evicted        {}\n\
             connections opened  {}\n\
             reconnect attempts  {}",
            self.name,
            self.duration.as_secs_f64(),
            self.events_received,
            self.events_per_sec(),
            self.metrics_emitted,
            self.malformed_dropped,
            self.out_of_order_dropped,
            self.sink_dropped,
            self.keys_evicted,
            self.connections_opened,
            self.reconnect_attempts,
        )
    }

    pub fn csv_header() -> &'static str {
        "name,duration_ms,events_received,events_per_sec,metrics_emitted,\
         malformed_dropped,out_of_order_dropped,sink_dropped,keys_evicted,\
         connections_opened,reconnect_attempts"
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{:.2},{},{},{},{},{},{},{}",
            self.name,
            self.duration.as_millis(),
            self.events_received,
            self.events_per_sec(),
            self.metrics_emitted,
            self.malformed_dropped,
            self.out_of_order_dropped,
            self.sink_dropped,
            self.keys_evicted,
            self.connections_opened,
            self.reconnect_attempts,
        )
    }

    /// Writes a one-row summary CSV under `dir`, creating the directory if
    /// needed. Returns the path of the written file.
    pub fn write_csv(&self, dir: impl AsRef<Path>) -> Result<PathBuf, SinkError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.csv", self.name, stamp));
        let mut file = fs::File::create(&path)?;
        writeln!(file, "{}", Self::csv_header())?;
        writeln!(file, "{}", self.to_csv_row())?;
        file.flush()?;
        Ok(path)
    }
}
