//! Call transport: one full-duplex WebSocket per session
//!
//! Outbound traffic is binary audio frames; inbound traffic is either binary
//! audio payloads or text control messages. The transport only classifies
//! frames. Parsing text into [`crate::protocol::ControlMessage`] and decoding
//! audio both happen in the session's inbound loop, strictly in arrival order.

use crate::error::SessionError;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Normal-closure WebSocket close code.
const CLOSE_NORMAL: u16 = 1000;

/// One inbound transport event, already classified by frame type.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A binary audio payload for the playback sequencer.
    Audio(Vec<u8>),

    /// A raw text frame; expected to hold one JSON control message.
    Text(String),

    /// The peer closed the connection. `clean` is false for abnormal codes
    /// and for connections that dropped without a close handshake.
    Closed {
        code: Option<u16>,
        reason: String,
        clean: bool,
    },

    /// The transport failed mid-session.
    Failed(String),
}

/// Outbound half of the call transport.
pub struct FrameSink {
    sink: SplitSink<WsStream, Message>,
}

impl FrameSink {
    /// Send one binary audio frame.
    pub async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), SessionError> {
        self.sink
            .send(Message::binary(frame))
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))
    }

    /// Close the connection with a normal close handshake.
    ///
    /// Errors are ignored: the peer may already be gone, and close is part of
    /// teardown which must always succeed.
    pub async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("Close handshake skipped: {}", e);
        }
    }
}

/// Inbound half of the call transport.
pub struct EventStream {
    stream: SplitStream<WsStream>,
    terminated: bool,
}

impl EventStream {
    /// Next inbound event, or `None` once the connection is fully drained.
    ///
    /// Ping/pong frames are handled below this layer and never surface here.
    /// A connection that drops without a close handshake yields one unclean
    /// `Closed` event before the stream ends.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(payload))) => {
                    return Some(TransportEvent::Audio(payload.to_vec()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Some(TransportEvent::Text(text.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    self.terminated = true;
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Some(TransportEvent::Closed {
                        clean: code == Some(CLOSE_NORMAL),
                        code,
                        reason,
                    });
                }
                Some(Ok(_)) => continue, // ping/pong/raw frames
                Some(Err(e)) => {
                    self.terminated = true;
                    return Some(TransportEvent::Failed(e.to_string()));
                }
                None => {
                    if self.terminated {
                        return None;
                    }
                    // Dropped without a close handshake.
                    self.terminated = true;
                    return Some(TransportEvent::Closed {
                        code: None,
                        reason: "connection dropped".to_string(),
                        clean: false,
                    });
                }
            }
        }
    }
}

/// Open the call transport and split it into its two directions.
pub async fn connect(url: &str) -> Result<(FrameSink, EventStream), SessionError> {
    info!("Connecting to voice backend: {}", url);

    let (ws, _response) = connect_async(url)
        .await
        .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;

    info!("Call transport connected");

    let (sink, stream) = ws.split();

    Ok((
        FrameSink { sink },
        EventStream {
            stream,
            terminated: false,
        },
    ))
}
