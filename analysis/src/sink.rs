//! # Metric Sinks
//!
//! The downstream end of the pipeline. Delivery is best-effort, not
//! transactional: the pipeline retries a failed write a bounded number of
//! times, then drops that metric with a counted diagnostic and moves on.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use lib_common::errors::SinkError;
use lib_common::event::Metric;

/// A consumer of metric records.
pub trait MetricSink: Send {
    fn write(&mut self, metric: &Metric) -> impl Future<Output = Result<(), SinkError>> + Send;

    fn flush(&mut self) -> impl Future<Output = Result<(), SinkError>> + Send {
        async { Ok(()) }
    }
}

/// Logs each metric; useful for warmups and ad-hoc runs.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricSink for LogSink {
    async fn write(&mut self, metric: &Metric) -> Result<(), SinkError> {
        log::info!("metric {}", metric);
        Ok(())
    }
}

/// Appends metrics as CSV rows, one file per run.
pub struct CsvSink {
    writer: BufWriter<File>,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "key,timestamp,metric_type,value")?;
        Ok(Self { writer })
    }
}

impl MetricSink for CsvSink {
    async fn write(&mut self, metric: &Metric) -> Result<(), SinkError> {
        writeln!(
            self.writer,
            "{},{},{},{}",
            metric.key, metric.timestamp, metric.metric_type, metric.value
        )?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects metrics in memory; the test double.
#[derive(Debug, Default)]
pub struct VecSink {
    pub metrics: Vec<Metric>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricSink for VecSink {
    async fn write(&mut self, metric: &Metric) -> Result<(), SinkError> {
        self.metrics.push(metric.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_common::event::MetricType;

    fn metric(value: f64) -> Metric {
        Metric {
            key: "A".into(),
            timestamp: 1_000,
            metric_type: MetricType::Average,
            value,
        }
    }

    #[tokio::test]
    async fn csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        let mut sink = CsvSink::create(&path).unwrap();
        sink.write(&metric(1.5)).await.unwrap();
        sink.write(&metric(2.5)).await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "key,timestamp,metric_type,value");
        assert_eq!(lines[1], "A,1000,average,1.5");
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn vec_sink_collects_in_order() {
        let mut sink = VecSink::new();
        sink.write(&metric(1.0)).await.unwrap();
        sink.write(&metric(2.0)).await.unwrap();
        assert_eq!(sink.metrics.len(), 2);
        assert_eq!(sink.metrics[1].value, 2.0);
    }
}
