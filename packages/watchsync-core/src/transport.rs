//! WebSocket transport.
//!
//! Wraps a tokio-tungstenite connection behind the [`ChannelSink`]
//! seam: a spawned writer task owns the sink half and drains a command
//! channel, while the reader half is surfaced to the host as a stream
//! of [`TransportEvent`]s. The session itself never touches socket
//! types, which keeps it synchronous and testable.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::connection::ChannelSink;
use crate::error::{Error, Result};

/// What the transport reports back to the host loop.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One inbound text frame.
    Frame(String),
    /// The connection closed, with the close code if one was sent.
    Closed { code: Option<u16> },
}

enum SinkCommand {
    Send(String),
    Close { code: u16, reason: String },
}

/// The writable half of a live WebSocket connection.
pub struct WsChannel {
    commands: mpsc::UnboundedSender<SinkCommand>,
    open: Arc<AtomicBool>,
}

impl ChannelSink for WsChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn send(&mut self, frame: &str) -> Result<()> {
        self.commands
            .send(SinkCommand::Send(frame.to_string()))
            .map_err(|_| Error::ChannelClosed("writer task gone".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.open.store(false, Ordering::Relaxed);
        let _ = self.commands.send(SinkCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Percent-encode a query component. Covers the characters that would
/// break the query string; anything else passes through.
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    out
}

/// Build the room channel URL from the relay base and identity.
pub fn room_url(base_url: &str, room_id: &str, user_id: &str, username: &str) -> String {
    format!(
        "{}/ws/room/{}?user_id={}&username={}",
        base_url.trim_end_matches('/'),
        encode_component(room_id),
        encode_component(user_id),
        encode_component(username),
    )
}

/// Connect to a room channel. Returns the sink for the connection
/// manager and the event stream for the host loop.
pub async fn connect(url: &str) -> Result<(WsChannel, mpsc::UnboundedReceiver<TransportEvent>)> {
    let (socket, _) = connect_async(url)
        .await
        .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
    let (mut ws_sink, mut ws_stream) = socket.split();

    let open = Arc::new(AtomicBool::new(true));
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<SinkCommand>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();

    // Writer task: owns the sink half, drains commands until a close.
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            match command {
                SinkCommand::Send(frame) => {
                    if ws_sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                SinkCommand::Close { code, reason } => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: Cow::Owned(reason),
                    };
                    let _ = ws_sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    // Reader task: forwards frames and the eventual close.
    let reader_open = open.clone();
    tokio::spawn(async move {
        while let Some(result) = ws_stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if event_tx.send(TransportEvent::Frame(text)).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    reader_open.store(false, Ordering::Relaxed);
                    let code = frame.map(|f| u16::from(f.code));
                    let _ = event_tx.send(TransportEvent::Closed { code });
                    break;
                }
                Ok(_) => {} // Binary, Ping, Pong — handled by the library
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket read error");
                    reader_open.store(false, Ordering::Relaxed);
                    let _ = event_tx.send(TransportEvent::Closed { code: None });
                    break;
                }
            }
        }
    });

    Ok((
        WsChannel {
            commands: command_tx,
            open,
        },
        event_rx,
    ))
}
