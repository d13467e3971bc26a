//! # Pipeline Glue
//!
//! Connects the feed client's output to the engine and the engine's output
//! to a sink through bounded queues, keeping each stage on its own task:
//! the client task does the network waiting, the engine task is the single
//! writer of all window state, and the sink task absorbs downstream I/O.
//!
//! Backpressure: both queues are bounded; a full queue blocks the producer.
//! Nothing is ever dropped for being inconvenient.
//!
//! Shutdown: the client dropping its sender, or the cancellation token
//! firing, makes the engine drain every event already queued, emit their
//! metrics, then close the metric queue so the sink can flush and finish.
//! No event admitted before shutdown is lost.

use std::sync::Arc;
use std::time::Duration;

use lib_common::diagnostics::PipelineCounters;
use lib_common::event::{Event, Metric};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::AnalysisEngine;
use crate::sink::MetricSink;

/// Write attempts per metric before it is dropped (best-effort delivery).
const SINK_WRITE_ATTEMPTS: u32 = 3;
/// Pause between sink write retries.
const SINK_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Engine task: consumes events, emits metrics, sweeps idle keys.
///
/// Returns the engine so callers can inspect final state after a run.
pub async fn run_engine(
    mut engine: AnalysisEngine,
    mut events: mpsc::Receiver<Event>,
    metrics: mpsc::Sender<Metric>,
    cancel: CancellationToken,
) -> AnalysisEngine {
    let sweep_period = sweep_period(engine.config().retention_ms);
    let mut sweep = tokio::time::interval(sweep_period);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_event = events.recv() => match maybe_event {
                Some(event) => {
                    if !emit(&mut engine, &event, &metrics).await {
                        return engine;
                    }
                }
                // Producer closed the queue; every buffered event has
                // already been delivered to us by the channel contract.
                None => break,
            },
            _ = sweep.tick() => {
                engine.sweep_idle();
            }
            _ = cancel.cancelled() => {
                // Drain guarantee: stop accepting new sends, then process
                // everything already admitted to the queue.
                events.close();
                while let Some(event) = events.recv().await {
                    if !emit(&mut engine, &event, &metrics).await {
                        return engine;
                    }
                }
                break;
            }
        }
    }

    log::info!("engine stopped; {} keys active", engine.active_keys());
    engine
    // Dropping `metrics` here closes the sink's queue.
}

async fn emit(
    engine: &mut AnalysisEngine,
    event: &Event,
    metrics: &mpsc::Sender<Metric>,
) -> bool {
    for metric in engine.admit(event) {
        if metrics.send(metric).await.is_err() {
            log::warn!("metric queue closed; stopping engine");
            return false;
        }
    }
    true
}

fn sweep_period(retention_ms: u64) -> Duration {
    Duration::from_millis((retention_ms / 4).max(1_000))
}

/// Sink task: delivers metrics with bounded retries, then flushes.
///
/// Returns the sink so callers can inspect what it received.
pub async fn run_sink<S: MetricSink>(
    mut sink: S,
    mut metrics: mpsc::Receiver<Metric>,
    counters: Arc<PipelineCounters>,
) -> S {
    while let Some(metric) = metrics.recv().await {
        let mut delivered = false;
        for attempt in 1..=SINK_WRITE_ATTEMPTS {
            match sink.write(&metric).await {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "sink write attempt {}/{} failed: {}",
                        attempt,
                        SINK_WRITE_ATTEMPTS,
                        e
                    );
                    if attempt < SINK_WRITE_ATTEMPTS {
                        tokio::time::sleep(SINK_RETRY_DELAY).await;
                    }
                }
            }
        }
        if !delivered {
            counters.record_sink_dropped();
        }
    }

    if let Err(e) = sink.flush().await {
        log::warn!("sink flush failed: {}", e);
    }
    sink
}
