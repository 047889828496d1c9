//! WebSocket connection handler.
//!
//! Manages individual room connections: admission, snapshot delivery,
//! routing client messages through the relay state, and disconnect
//! cleanup. One invocation runs for the lifetime of a connection.

use std::borrow::Cow;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{
    ClientMessage, ServerMessage, ShareAction, SignalPayload, CLOSE_BANNED, CLOSE_ROOM_NOT_FOUND,
    CLOSE_SETUP_ERROR,
};
use crate::state::{AdmitError, ChatError, RelayState};

/// Handle a single room WebSocket connection.
///
/// 1. Admits the user (or closes with a terminal code)
/// 2. Spawns a sender task to forward outbound messages
/// 3. Delivers the room snapshot and announces the join
/// 4. Processes incoming messages until the connection closes
pub async fn handle_websocket(
    mut socket: WebSocket,
    state: RelayState,
    room_id: String,
    user_id: String,
    username: String,
) {
    // ── Step 1: Admission ─────────────────────────────────────────────────

    match state.admit(&room_id, &user_id, &username) {
        Ok(()) => {}
        Err(e) => {
            let (code, reason) = match e {
                AdmitError::RoomNotFound => (CLOSE_ROOM_NOT_FOUND, "Room not found"),
                AdmitError::Banned => (CLOSE_BANNED, "You are banned from this room"),
            };
            tracing::info!(
                room_id = room_id.as_str(),
                user_id = user_id.as_str(),
                code = code,
                "Connection refused"
            );
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: Cow::Borrowed(reason),
                })))
                .await;
            return;
        }
    }

    // The snapshot is built before the sender task exists so a failure
    // can still close the raw socket with the setup code.
    let snapshot = match state.snapshot(&room_id, &user_id) {
        Some(snapshot) => snapshot,
        None => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_SETUP_ERROR,
                    reason: Cow::Borrowed("Room state unavailable"),
                })))
                .await;
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // ── Step 2: Register & Spawn Sender Task ──────────────────────────────

    state.register_client(&room_id, &user_id, tx.clone());

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server message: {}", e);
                }
            }
        }
    });

    // ── Step 3: Snapshot & Join Broadcast ─────────────────────────────────

    let _ = tx.send(snapshot);

    state.broadcast(
        &room_id,
        ServerMessage::UserJoined {
            user_id: user_id.clone(),
            username: username.clone(),
        },
    );

    tracing::info!(
        room_id = room_id.as_str(),
        user_id = user_id.as_str(),
        "User joined room"
    );

    // ── Step 4: Process Messages ──────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        handle_client_message(&state, &room_id, &user_id, &username, client_msg);
                    }
                    Err(e) => {
                        tracing::warn!(
                            user_id = user_id.as_str(),
                            error = %e,
                            "Failed to parse client message"
                        );
                        state.send_to_user(
                            &room_id,
                            &user_id,
                            ServerMessage::Error {
                                message: format!("Invalid message format: {}", e),
                            },
                        );
                    }
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!(user_id = user_id.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    user_id = user_id.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary, Ping, Pong — axum handles keepalive frames
        }
    }

    // ── Step 5: Cleanup ───────────────────────────────────────────────────

    disconnect_cleanup(&state, &room_id, &user_id, &username);

    sender_task.abort();
    tracing::info!(
        room_id = room_id.as_str(),
        user_id = user_id.as_str(),
        "User left room"
    );
}

/// Tear down a departed connection. A kicked or banned user was
/// already announced through the moderation broadcast, so the room
/// only hears `user_left` for members who disconnected on their own.
fn disconnect_cleanup(state: &RelayState, room_id: &str, user_id: &str, username: &str) {
    state.unregister_client(room_id, user_id);
    state.mark_offline(room_id, user_id);

    // A disconnect ends any share the user was running.
    if state.end_share(room_id, user_id) {
        state.broadcast(
            room_id,
            ServerMessage::ScreenShareEnded {
                user_id: user_id.to_string(),
                username: username.to_string(),
            },
        );
    }

    if state.is_member(room_id, user_id) {
        state.broadcast(
            room_id,
            ServerMessage::UserLeft {
                user_id: user_id.to_string(),
                username: username.to_string(),
            },
        );
    }
}

/// Handle a parsed client message.
fn handle_client_message(
    state: &RelayState,
    room_id: &str,
    user_id: &str,
    username: &str,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::ChatMessage { message } => {
            handle_chat(state, room_id, user_id, username, &message);
        }

        ClientMessage::VideoControl {
            action,
            timestamp,
            url,
        } => {
            state.record_video_control(room_id, action, timestamp, url.as_deref());

            // Fan out to everyone, the sender included — clients drop
            // their own echo by user_id. The relay clock lets receivers
            // compensate for transit delay.
            state.broadcast(
                room_id,
                ServerMessage::VideoControl {
                    action,
                    timestamp,
                    url,
                    user_id: user_id.to_string(),
                    username: username.to_string(),
                    server_timestamp: Some(Utc::now().timestamp_millis() as f64 / 1000.0),
                    latency: None,
                },
            );
        }

        ClientMessage::ScreenShare { action } => match action {
            ShareAction::Start => match state.start_share(room_id, user_id) {
                Ok(session_id) => {
                    state.broadcast(
                        room_id,
                        ServerMessage::ScreenShareStarted {
                            user_id: user_id.to_string(),
                            username: username.to_string(),
                            session_id,
                        },
                    );
                }
                Err(_) => {
                    state.send_to_user(
                        room_id,
                        user_id,
                        ServerMessage::Error {
                            message: "Screen sharing is not allowed in this room".to_string(),
                        },
                    );
                }
            },
            ShareAction::Stop => {
                if state.end_share(room_id, user_id) {
                    state.broadcast(
                        room_id,
                        ServerMessage::ScreenShareEnded {
                            user_id: user_id.to_string(),
                            username: username.to_string(),
                        },
                    );
                }
            }
        },

        ClientMessage::WebrtcSignal { signal } => {
            handle_signal(state, room_id, user_id, signal);
        }

        ClientMessage::Ping { client_time } => {
            state.send_to_user(room_id, user_id, ServerMessage::Pong { client_time });
        }

        ClientMessage::TypingStart => {
            state.broadcast(
                room_id,
                ServerMessage::TypingIndicator {
                    user_id: user_id.to_string(),
                    username: username.to_string(),
                    is_typing: true,
                },
            );
        }

        ClientMessage::TypingStop => {
            state.broadcast(
                room_id,
                ServerMessage::TypingIndicator {
                    user_id: user_id.to_string(),
                    username: username.to_string(),
                    is_typing: false,
                },
            );
        }
    }
}

// ── Message Handlers ──────────────────────────────────────────────────────────

/// Accept a chat message through the relay's filters and sequence it.
/// Rejections are reported to the sender only — the room never sees a
/// filtered message.
fn handle_chat(state: &RelayState, room_id: &str, user_id: &str, username: &str, text: &str) {
    match state.append_chat(room_id, user_id, username, text) {
        Ok(stored) => {
            state.broadcast(
                room_id,
                ServerMessage::ChatMessage {
                    message_id: stored.message_id,
                    user_id: stored.user_id,
                    username: stored.username,
                    message: stored.message,
                    timestamp: stored.created_at.timestamp_millis(),
                },
            );
        }
        Err(ChatError::Empty) => {} // Nothing to report
        Err(e) => {
            let message = match e {
                ChatError::RoomNotFound => "Room no longer exists".to_string(),
                ChatError::ChatDisabled => "Chat is disabled in this room".to_string(),
                ChatError::Muted => "You are muted".to_string(),
                ChatError::BannedWord(word) => {
                    format!("Message contains a banned word: {}", word)
                }
                ChatError::Empty => unreachable!(),
            };
            state.send_to_user(room_id, user_id, ServerMessage::Error { message });
        }
    }
}

/// Forward a signaling payload. Answers carrying a target user are
/// delivered to that user only; everything else fans out to the room
/// (receivers self-filter by `user_id`).
fn handle_signal(state: &RelayState, room_id: &str, from_user_id: &str, signal: SignalPayload) {
    let forwarded = ServerMessage::WebrtcSignal {
        user_id: from_user_id.to_string(),
        signal: signal.clone(),
    };

    if let SignalPayload::Answer {
        to_user_id: Some(ref target),
        ..
    } = signal
    {
        tracing::debug!(
            from = from_user_id,
            to = target.as_str(),
            "Forwarding targeted answer"
        );
        if !state.send_to_user(room_id, target, forwarded) {
            state.send_to_user(
                room_id,
                from_user_id,
                ServerMessage::Error {
                    message: format!("Signal target '{}' is not connected", target),
                },
            );
        }
        return;
    }

    tracing::debug!(from = from_user_id, "Broadcasting signal");
    state.broadcast(room_id, forwarded);
}
