//! # Feed Client
//!
//! Connects to an upstream event source over TCP, performs the HELLO
//! handshake, and normalizes incoming TLV frames into typed [`Event`]s.
//!
//! ## Failure contract
//! - Unreachable endpoint: retried with bounded exponential backoff, then a
//!   terminal `RetriesExhausted`.
//! - Rejected credentials: terminal `Auth`, never retried.
//! - Malformed frames: dropped with a counted diagnostic; the stream
//!   continues. They must never abort the stream.
//!
//! The client never reorders events: frames are decoded and forwarded in
//! arrival order, so the upstream's per-key timestamp ordering survives
//! end-to-end.

use std::sync::Arc;

use lib_common::config::ClientConfig;
use lib_common::diagnostics::PipelineCounters;
use lib_common::errors::{ConfigError, FeedError};
use lib_common::event::Event;
use lib_common::wire::{self, FrameDecoder, FrameType, HelloPayload};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffState;

const READ_BUF_LEN: usize = 8 * 1024;

/// A connected, handshaken feed stream.
pub struct FeedConnection {
    stream: TcpStream,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    endpoint: String,
    counters: Arc<PipelineCounters>,
}

impl FeedConnection {
    /// Returns the next event, blocking until data is available.
    ///
    /// `Ok(None)` means the server closed the stream cleanly (CLOSE frame).
    /// An EOF without a CLOSE frame is a transport failure, so the caller can
    /// tell a finished stream from a dropped one.
    pub async fn next_event(&mut self) -> Result<Option<Event>, FeedError> {
        loop {
            while let Some(frame) = self.decoder.next_frame()? {
                match frame.frame_type() {
                    Some(FrameType::Event) => {
                        match serde_json::from_slice::<Event>(&frame.payload) {
                            Ok(event) => {
                                self.counters.record_event_received();
                                return Ok(Some(event));
                            }
                            Err(e) => {
                                self.counters.record_malformed_dropped();
                                log::warn!("dropping undecodable event payload: {}", e);
                            }
                        }
                    }
                    Some(FrameType::Close) => return Ok(None),
                    Some(FrameType::Reject) => {
                        return Err(FeedError::Auth {
                            endpoint: self.endpoint.clone(),
                        });
                    }
                    Some(FrameType::Hello) => {
                        // Duplicate ack mid-stream; harmless.
                        log::debug!("ignoring HELLO frame mid-stream");
                    }
                    None => {
                        self.counters.record_malformed_dropped();
                        log::warn!("dropping frame with unknown type {:#04x}", frame.type_bits);
                    }
                }
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(FeedError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "upstream closed without CLOSE frame",
                )));
            }
            let (decoder, read_buf) = (&mut self.decoder, &self.read_buf);
            decoder.extend(&read_buf[..n]);
        }
    }

    /// Waits for the server's handshake response: HELLO ack or REJECT.
    async fn await_handshake(&mut self) -> Result<(), FeedError> {
        loop {
            while let Some(frame) = self.decoder.next_frame()? {
                match frame.frame_type() {
                    Some(FrameType::Hello) => return Ok(()),
                    Some(FrameType::Reject) => {
                        return Err(FeedError::Auth {
                            endpoint: self.endpoint.clone(),
                        });
                    }
                    other => {
                        return Err(FeedError::Frame {
                            reason: format!("expected handshake ack, got {:?}", other),
                        });
                    }
                }
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(FeedError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "upstream closed during handshake",
                )));
            }
            let (decoder, read_buf) = (&mut self.decoder, &self.read_buf);
            decoder.extend(&read_buf[..n]);
        }
    }
}

/// Feed client with idempotent reconnect logic.
pub struct FeedClient {
    config: ClientConfig,
    counters: Arc<PipelineCounters>,
}

impl FeedClient {
    pub fn new(config: ClientConfig, counters: Arc<PipelineCounters>) -> Result<Self, ConfigError> {
        config.reconnect.validate()?;
        Ok(Self { config, counters })
    }

    /// Establishes a connection, retrying transient failures with backoff up
    /// to the configured attempt ceiling.
    ///
    /// Terminal outcomes: `RetriesExhausted` once the ceiling is hit, `Auth`
    /// on rejected credentials (not retried).
    pub async fn connect(&self) -> Result<FeedConnection, FeedError> {
        let mut backoff = BackoffState::new(self.config.reconnect.clone());

        loop {
            match self.connect_once().await {
                Ok(conn) => {
                    self.counters.record_connection_opened();
                    return Ok(conn);
                }
                Err(err @ FeedError::Auth { .. }) => return Err(err),
                Err(err) => {
                    self.counters.record_reconnect_attempt();
                    match backoff.next_delay() {
                        Some(delay) => {
                            log::warn!(
                                "connect to {} failed ({}); retry {} in {:?}",
                                self.config.endpoint,
                                err,
                                backoff.attempts(),
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            log::error!(
                                "connect to {} failed terminally after {} attempts: {}",
                                self.config.endpoint,
                                backoff.attempts(),
                                err
                            );
                            return Err(FeedError::RetriesExhausted {
                                endpoint: self.config.endpoint.clone(),
                                attempts: backoff.attempts(),
                            });
                        }
                    }
                }
            }
        }
    }

    async fn connect_once(&self) -> Result<FeedConnection, FeedError> {
        let mut stream = TcpStream::connect(&self.config.endpoint)
            .await
            .map_err(|source| FeedError::Connection {
                endpoint: self.config.endpoint.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let hello = HelloPayload {
            token: self.config.auth_token.clone(),
        };
        let payload = serde_json::to_vec(&hello).map_err(|e| FeedError::Frame {
            reason: format!("failed to encode HELLO: {}", e),
        })?;
        stream
            .write_all(&wire::encode_frame(FrameType::Hello, true, &payload)?)
            .await?;

        let mut conn = FeedConnection {
            stream,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; READ_BUF_LEN],
            endpoint: self.config.endpoint.clone(),
            counters: Arc::clone(&self.counters),
        };
        conn.await_handshake().await?;
        log::info!("connected to feed at {}", self.config.endpoint);
        Ok(conn)
    }

    /// Full ingestion pump: connect, forward events into the bounded queue,
    /// reconnect across transient stream failures, stop on clean close,
    /// terminal error or cancellation.
    ///
    /// The queue send blocks when the queue is full; that backpressure is
    /// deliberate, nothing is dropped. Dropping the sender on return is the
    /// close signal the engine drains on.
    pub async fn run(
        &self,
        tx: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> Result<(), FeedError> {
        loop {
            let mut conn = tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("feed client cancelled before connect");
                    return Ok(());
                }
                res = self.connect() => res?,
            };

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        log::info!("feed client cancelled; closing connection");
                        return Ok(());
                    }
                    next = conn.next_event() => next,
                };

                match next {
                    Ok(Some(event)) => {
                        if tx.send(event).await.is_err() {
                            // Engine side is gone; nothing left to feed.
                            return Ok(());
                        }
                    }
                    Ok(None) => {
                        log::info!("upstream closed the stream cleanly");
                        return Ok(());
                    }
                    Err(err @ FeedError::Auth { .. }) => return Err(err),
                    Err(err) => {
                        log::warn!("stream failure: {}; reconnecting", err);
                        break;
                    }
                }
            }
        }
    }
}
