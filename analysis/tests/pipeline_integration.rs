//! End-to-end pipeline runs over a loopback feed: server, client, engine
//! and sink wired exactly as the binary wires them.

use std::sync::Arc;

use analysis::engine::AnalysisEngine;
use analysis::pipeline::{run_engine, run_sink};
use analysis::sink::VecSink;
use client::FeedClient;
use lib_common::config::{ClientConfig, ReconnectPolicy, ServerConfig, StreamConfig};
use lib_common::diagnostics::PipelineCounters;
use lib_common::errors::FeedError;
use lib_common::event::{Metric, MetricType};
use server::{EventSource, FeedServer, SyntheticSource};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn stream_config() -> StreamConfig {
    StreamConfig {
        window_ms: 60_000,
        retention_ms: 300_000,
        metric_types: vec![MetricType::Average, MetricType::Min, MetricType::Max],
        queue_capacity: 64,
    }
}

async fn start_server(
    source: Arc<dyn EventSource>,
    auth_token: Option<&str>,
) -> (String, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let config = ServerConfig {
        auth_token: auth_token.map(String::from),
    };
    tokio::spawn(async move {
        let feed_server = FeedServer::new(source, config);
        let _ = feed_server.serve(listener, server_cancel).await;
    });
    (endpoint, cancel)
}

/// Runs the full client -> engine -> sink pipeline against `endpoint` until
/// the stream closes cleanly.
async fn run_pipeline(
    endpoint: &str,
    client_config: ClientConfig,
) -> (Result<(), FeedError>, Vec<Metric>, Arc<PipelineCounters>) {
    let counters = Arc::new(PipelineCounters::new());
    let config = stream_config();

    let feed_client = FeedClient::new(client_config, Arc::clone(&counters)).unwrap();
    let engine = AnalysisEngine::new(config.clone(), Arc::clone(&counters)).unwrap();

    let (event_tx, event_rx) = tokio::sync::mpsc::channel(config.queue_capacity);
    let (metric_tx, metric_rx) = tokio::sync::mpsc::channel(config.queue_capacity);
    let cancel = CancellationToken::new();

    let client_cancel = cancel.clone();
    let client_task =
        tokio::spawn(async move { feed_client.run(event_tx, client_cancel).await });
    let engine_task = tokio::spawn(run_engine(engine, event_rx, metric_tx, cancel));
    let sink_task = tokio::spawn(run_sink(VecSink::new(), metric_rx, Arc::clone(&counters)));

    let client_result = client_task.await.unwrap();
    engine_task.await.unwrap();
    let sink = sink_task.await.unwrap();
    (client_result, sink.metrics, counters)
}

#[tokio::test]
async fn every_streamed_event_produces_its_full_metric_set() {
    // Synthetic timestamps are globally non-decreasing, so nothing is
    // dropped as out-of-order and every admission emits all three metrics.
    let events = 500;
    let source = Arc::new(SyntheticSource::new(11, 4, events));
    let (endpoint, server_cancel) = start_server(source, None).await;

    let (result, metrics, counters) = run_pipeline(&endpoint, ClientConfig::new(&endpoint)).await;
    result.unwrap();

    assert_eq!(counters.events_received(), events as u64);
    assert_eq!(counters.out_of_order_dropped(), 0);
    assert_eq!(counters.malformed_dropped(), 0);
    assert_eq!(counters.sink_dropped(), 0);
    assert_eq!(metrics.len(), events * 3);
    server_cancel.cancel();
}

#[tokio::test]
async fn replaying_the_same_seed_yields_identical_metrics() {
    let source = Arc::new(SyntheticSource::new(42, 8, 1_000));
    let (endpoint, server_cancel) = start_server(source, None).await;

    let (first_result, first, _) = run_pipeline(&endpoint, ClientConfig::new(&endpoint)).await;
    let (second_result, second, _) = run_pipeline(&endpoint, ClientConfig::new(&endpoint)).await;
    first_result.unwrap();
    second_result.unwrap();

    assert_eq!(first.len(), 3_000);
    assert_eq!(first, second, "same sequence in, same metrics out");
    server_cancel.cancel();
}

#[tokio::test]
async fn wrong_credentials_fail_the_run_without_retries() {
    let source = Arc::new(SyntheticSource::new(1, 2, 10));
    let (endpoint, server_cancel) = start_server(source, Some("sesame")).await;

    let mut config = ClientConfig::new(&endpoint).with_auth_token("not-sesame");
    config.reconnect = ReconnectPolicy {
        max_attempts: 3,
        backoff_base_ms: 1,
        backoff_ceiling_ms: 2,
    };
    let (result, metrics, counters) = run_pipeline(&endpoint, config).await;

    assert!(matches!(result, Err(FeedError::Auth { .. })));
    assert!(metrics.is_empty());
    assert_eq!(counters.reconnect_attempts(), 0, "auth failures are terminal");

    // The right token streams normally.
    let config = ClientConfig::new(&endpoint).with_auth_token("sesame");
    let (result, metrics, _) = run_pipeline(&endpoint, config).await;
    result.unwrap();
    assert_eq!(metrics.len(), 30);
    server_cancel.cancel();
}
