//! # Feed Server
//!
//! Accepts client connections and streams the configured event source to
//! each of them over the TLV protocol. Every client receives the full
//! ordered sequence from the start through its own cursor; clients never
//! share a read position.
//!
//! Handshake: the client opens with HELLO (optionally carrying a token).
//! The server answers HELLO to acknowledge, or REJECT when a required token
//! is missing or wrong, then closes. After the ack the server streams EVENT
//! frames in order and finishes with CLOSE.

use std::sync::Arc;

use lib_common::config::ServerConfig;
use lib_common::errors::FeedError;
use lib_common::wire::{self, Frame, FrameDecoder, FrameType, HelloPayload};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::source::EventSource;

pub struct FeedServer {
    source: Arc<dyn EventSource>,
    config: ServerConfig,
}

impl FeedServer {
    pub fn new(source: Arc<dyn EventSource>, config: ServerConfig) -> Self {
        Self { source, config }
    }

    /// Accept loop. Runs until the cancellation token fires; every accepted
    /// connection gets its own task and an independent cursor.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> std::io::Result<()> {
        let local = listener.local_addr()?;
        log::info!("feed server listening on {}", local);

        loop {
            let (socket, peer) = tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("feed server on {} shutting down", local);
                    return Ok(());
                }
                accepted = listener.accept() => accepted?,
            };

            log::debug!("accepted feed client {}", peer);
            let source = Arc::clone(&self.source);
            let config = self.config.clone();
            let conn_cancel = cancel.child_token();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, source, config, conn_cancel).await {
                    log::warn!("feed connection {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    source: Arc<dyn EventSource>,
    config: ServerConfig,
    cancel: CancellationToken,
) -> Result<(), FeedError> {
    socket.set_nodelay(true)?;

    // Handshake first: nothing streams until HELLO checks out.
    let mut decoder = FrameDecoder::new();
    let frame = match read_frame(&mut socket, &mut decoder).await? {
        Some(frame) => frame,
        None => return Ok(()), // client went away before the handshake
    };

    if !authorize(&frame, &config) {
        log::warn!("rejecting client: bad or missing credentials");
        socket
            .write_all(&wire::encode_frame(FrameType::Reject, false, b"")?)
            .await?;
        return Ok(());
    }
    socket
        .write_all(&wire::encode_frame(FrameType::Hello, true, b"")?)
        .await?;

    // Stream the whole sequence in order, then CLOSE.
    let mut streamed = 0usize;
    for event in source.cursor() {
        if cancel.is_cancelled() {
            log::debug!("streaming cancelled after {} events", streamed);
            break;
        }
        let payload = serde_json::to_vec(&event).map_err(|e| FeedError::Frame {
            reason: format!("failed to encode event: {}", e),
        })?;
        socket
            .write_all(&wire::encode_frame(FrameType::Event, true, &payload)?)
            .await?;
        streamed += 1;
    }

    socket
        .write_all(&wire::encode_frame(FrameType::Close, false, b"")?)
        .await?;
    socket.flush().await?;
    log::debug!("streamed {} events, stream closed", streamed);
    Ok(())
}

fn authorize(frame: &Frame, config: &ServerConfig) -> bool {
    if frame.frame_type() != Some(FrameType::Hello) {
        return false;
    }
    let Some(expected) = &config.auth_token else {
        return true; // no auth configured, everyone is welcome
    };
    match serde_json::from_slice::<HelloPayload>(&frame.payload) {
        Ok(hello) => hello.token.as_deref() == Some(expected.as_str()),
        Err(_) => false,
    }
}

/// Reads until one complete frame is available. `Ok(None)` on EOF.
async fn read_frame(
    socket: &mut TcpStream,
    decoder: &mut FrameDecoder,
) -> Result<Option<Frame>, FeedError> {
    let mut buf = [0u8; 4096];
    loop {
        if let Some(frame) = decoder.next_frame()? {
            return Ok(Some(frame));
        }
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        decoder.extend(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReplaySource;
    use lib_common::event::Event;

    async fn start_server(source: Arc<dyn EventSource>, config: ServerConfig) -> (String, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let cancel = CancellationToken::new();
        let serve_cancel = cancel.clone();
        tokio::spawn(async move {
            let feed_server = FeedServer::new(source, config);
            let _ = feed_server.serve(listener, serve_cancel).await;
        });
        (addr, cancel)
    }

    async fn handshake(addr: &str, token: Option<&str>) -> (TcpStream, FrameDecoder, Frame) {
        let mut socket = TcpStream::connect(addr).await.unwrap();
        let hello = HelloPayload {
            token: token.map(String::from),
        };
        let payload = serde_json::to_vec(&hello).unwrap();
        socket
            .write_all(&wire::encode_frame(FrameType::Hello, true, &payload).unwrap())
            .await
            .unwrap();
        let mut decoder = FrameDecoder::new();
        let reply = read_frame(&mut socket, &mut decoder).await.unwrap().unwrap();
        (socket, decoder, reply)
    }

    #[tokio::test]
    async fn streams_full_sequence_then_close() {
        let events = vec![
            Event::new("A", 1, 1.0),
            Event::new("B", 2, 2.0),
            Event::new("A", 3, 3.0),
        ];
        let source = Arc::new(ReplaySource::from_events(events.clone()));
        let (addr, cancel) = start_server(source, ServerConfig::default()).await;

        let (mut socket, mut decoder, ack) = handshake(&addr, None).await;
        assert_eq!(ack.frame_type(), Some(FrameType::Hello));

        let mut received = Vec::new();
        loop {
            let frame = read_frame(&mut socket, &mut decoder).await.unwrap().unwrap();
            match frame.frame_type() {
                Some(FrameType::Event) => {
                    received.push(serde_json::from_slice::<Event>(&frame.payload).unwrap());
                }
                Some(FrameType::Close) => break,
                other => panic!("unexpected frame {:?}", other),
            }
        }
        assert_eq!(received, events);
        cancel.cancel();
    }

    #[tokio::test]
    async fn each_client_gets_the_whole_sequence() {
        let events = vec![Event::new("A", 1, 1.0), Event::new("A", 2, 2.0)];
        let source = Arc::new(ReplaySource::from_events(events.clone()));
        let (addr, cancel) = start_server(source, ServerConfig::default()).await;

        for _ in 0..3 {
            let (mut socket, mut decoder, _) = handshake(&addr, None).await;
            let mut received = Vec::new();
            loop {
                let frame = read_frame(&mut socket, &mut decoder).await.unwrap().unwrap();
                match frame.frame_type() {
                    Some(FrameType::Event) => {
                        received.push(serde_json::from_slice::<Event>(&frame.payload).unwrap())
                    }
                    _ => break,
                }
            }
            assert_eq!(received, events, "every cursor starts from the beginning");
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let source = Arc::new(ReplaySource::from_events(vec![Event::new("A", 1, 1.0)]));
        let config = ServerConfig {
            auth_token: Some("sesame".into()),
        };
        let (addr, cancel) = start_server(source, config).await;

        let (_socket, _decoder, reply) = handshake(&addr, Some("not-sesame")).await;
        assert_eq!(reply.frame_type(), Some(FrameType::Reject));

        let (_socket, _decoder, reply) = handshake(&addr, Some("sesame")).await;
        assert_eq!(reply.frame_type(), Some(FrameType::Hello));
        cancel.cancel();
    }
}
