//! # Stream Analysis Simulation
//!
//! The executable tying the three layers together: it hosts a feed server on
//! a loopback listener, connects the feed client to it, pumps the events
//! through the analysis engine and writes the resulting metrics and run
//! statistics to the results directory.
//!
//! ## Execution flow
//! 1. Parse CLI arguments and load the stream configuration (file or
//!    defaults); a bad configuration aborts before anything connects.
//! 2. Build the event source: a JSON-lines replay file when `--replay` is
//!    given, otherwise a seeded synthetic sequence.
//! 3. Bind the listener and spawn the feed server.
//! 4. Run the warmup rounds (metrics discarded), then the measured round
//!    with a CSV metric sink.
//! 5. Print the run report and write the stats CSV.
//!
//! `CTRL+C` / `SIGTERM` cancel the run; buffered events are still drained
//! through the engine before the process exits.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use analysis::engine::AnalysisEngine;
use analysis::pipeline::{run_engine, run_sink};
use analysis::sink::{CsvSink, LogSink, MetricSink};
use analysis::stats::RunStats;
use client::FeedClient;
use lib_common::config::{ClientConfig, ServerConfig, StreamConfig};
use lib_common::diagnostics::PipelineCounters;
use server::{EventSource, FeedServer, ReplaySource, SyntheticSource};

#[derive(Debug, Parser)]
#[command(name = "analysis", about = "Windowed stream analysis over a local feed")]
struct Args {
    /// Listener address for the embedded feed server.
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: String,

    /// Number of distinct stream keys in the synthetic feed.
    #[arg(long, default_value_t = 8)]
    keys: usize,

    /// Number of events in the synthetic feed.
    #[arg(long, default_value_t = 100_000)]
    events: usize,

    /// Warmup rounds before the measured one; their metrics are discarded.
    #[arg(long, default_value_t = 0)]
    warmups: u32,

    /// Seed for the synthetic feed. One seed, one sequence.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Run name, used in reports and result filenames.
    #[arg(long, default_value = "simulation")]
    name: String,

    /// Replay a recorded JSON-lines event file instead of synthesizing.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Stream configuration file (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for metric and stats CSV output.
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Shared token; when set, the server requires it and the client sends it.
    #[arg(long, env = "FEED_AUTH_TOKEN")]
    auth_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // --- Phase 1: Configuration ---
    let stream_config = match &args.config {
        Some(path) => StreamConfig::from_file(path)
            .with_context(|| format!("loading stream config from {}", path.display()))?,
        None => StreamConfig::default(),
    };
    stream_config.validate().context("invalid stream config")?;

    // --- Phase 2: Event source ---
    let source: Arc<dyn EventSource> = match &args.replay {
        Some(path) => {
            let replay = ReplaySource::from_file(path)
                .with_context(|| format!("loading replay file {}", path.display()))?;
            Arc::new(replay)
        }
        None => Arc::new(SyntheticSource::new(args.seed, args.keys, args.events)),
    };
    log::info!(
        "{} run: {} events over {} keys, window {}ms, retention {}ms",
        args.name,
        source.len_hint().map_or_else(|| "?".into(), |n| n.to_string()),
        args.keys,
        stream_config.window_ms,
        stream_config.retention_ms,
    );

    // --- Phase 3: Feed server ---
    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("binding feed server to {}", args.listen))?;
    let endpoint = listener.local_addr()?.to_string();

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_config = ServerConfig {
        auth_token: args.auth_token.clone(),
    };
    tokio::spawn(async move {
        let feed_server = FeedServer::new(source, server_config);
        if let Err(e) = feed_server.serve(listener, server_cancel).await {
            log::error!("feed server failed: {}", e);
        }
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::warn!("shutdown signal received; draining pipeline");
        signal_cancel.cancel();
    });

    // --- Phase 4: Warmup rounds ---
    for round in 1..=args.warmups {
        if cancel.is_cancelled() {
            break;
        }
        log::info!("warmup round {}/{}", round, args.warmups);
        run_round(&args, &endpoint, &stream_config, LogSink, &cancel).await?;
    }

    // --- Phase 5: Measured round ---
    std::fs::create_dir_all(&args.results_dir)
        .with_context(|| format!("creating {}", args.results_dir.display()))?;
    let metrics_path = args.results_dir.join(format!("{}_metrics.csv", args.name));
    let sink = CsvSink::create(&metrics_path)
        .with_context(|| format!("creating {}", metrics_path.display()))?;

    let stats = run_round(&args, &endpoint, &stream_config, sink, &cancel).await?;

    println!("{}", stats.report());
    let stats_path = stats
        .write_csv(&args.results_dir)
        .context("writing run stats CSV")?;
    log::info!(
        "metrics in {}, stats in {}",
        metrics_path.display(),
        stats_path.display()
    );

    cancel.cancel();
    Ok(())
}

/// One full pipeline round: client, engine and sink on their own tasks,
/// joined in dependency order once the stream closes.
async fn run_round<S>(
    args: &Args,
    endpoint: &str,
    stream_config: &StreamConfig,
    sink: S,
    cancel: &CancellationToken,
) -> anyhow::Result<RunStats>
where
    S: MetricSink + 'static,
{
    let counters = Arc::new(PipelineCounters::new());

    let mut client_config = ClientConfig::new(endpoint);
    if let Some(token) = &args.auth_token {
        client_config = client_config.with_auth_token(token.clone());
    }
    let feed_client = FeedClient::new(client_config, Arc::clone(&counters))
        .context("invalid reconnect policy")?;

    let engine = AnalysisEngine::new(stream_config.clone(), Arc::clone(&counters))
        .context("invalid stream config")?;

    let (event_tx, event_rx) = tokio::sync::mpsc::channel(stream_config.queue_capacity);
    let (metric_tx, metric_rx) = tokio::sync::mpsc::channel(stream_config.queue_capacity);

    let started = Instant::now();
    let client_cancel = cancel.clone();
    let client_task =
        tokio::spawn(async move { feed_client.run(event_tx, client_cancel).await });
    let engine_task = tokio::spawn(run_engine(engine, event_rx, metric_tx, cancel.clone()));
    let sink_task = tokio::spawn(run_sink(sink, metric_rx, Arc::clone(&counters)));

    // The client finishing (clean close, cancellation or terminal error)
    // drops its sender; the engine drains and closes the metric queue; the
    // sink flushes and exits. Join in that order.
    client_task
        .await
        .context("feed client task panicked")?
        .context("feed client failed")?;
    engine_task.await.context("engine task panicked")?;
    sink_task.await.context("sink task panicked")?;

    Ok(RunStats::from_counters(
        args.name.clone(),
        started.elapsed(),
        &counters,
    ))
}

/// Resolves on `CTRL+C`, or on `SIGTERM` on unix systems.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
