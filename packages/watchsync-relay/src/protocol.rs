//! Room protocol message definitions.
//!
//! The relay speaks a simple JSON-over-WebSocket protocol. Every frame is
//! an object with a `type` discriminator; unknown types are rejected at
//! the decode boundary rather than silently ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Close Codes ───────────────────────────────────────────────────────────────

/// Room does not exist or has been deactivated. Terminal — clients must
/// not reconnect.
pub const CLOSE_ROOM_NOT_FOUND: u16 = 4001;

/// Connection setup failed server-side. Terminal.
pub const CLOSE_SETUP_ERROR: u16 = 4002;

/// The client closed its own channel after processing a kick. Suppresses
/// the reconnect path on both ends.
pub const CLOSE_KICK_HANDLED: u16 = 4003;

/// The client closed its own channel after processing a ban.
pub const CLOSE_BAN_HANDLED: u16 = 4004;

/// The connecting user is banned from the room. Terminal.
pub const CLOSE_BANNED: u16 = 4005;

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Messages sent from a room client to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Post a chat message to the room.
    ChatMessage { message: String },

    /// A playback control action (load/play/pause/sync) to broadcast.
    /// `timestamp` is the sender's current position in seconds.
    VideoControl {
        action: VideoAction,
        #[serde(default)]
        timestamp: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    /// Announce the start or end of a screen-share session.
    ScreenShare { action: ShareAction },

    /// Relay a WebRTC signaling payload to the other participants.
    /// The relay never terminates media — it only shuttles the payload.
    WebrtcSignal { signal: SignalPayload },

    /// Latency probe. `client_time` is echoed back in the pong so the
    /// client can measure the round trip on its own clock.
    Ping { client_time: i64 },

    /// The sender started typing in the chat input.
    TypingStart,

    /// The sender stopped typing.
    TypingStop,
}

/// Playback control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoAction {
    Load,
    Play,
    Pause,
    Sync,
}

/// Screen-share lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareAction {
    Start,
    Stop,
}

/// A WebRTC signaling payload. Opaque to the relay beyond its kind —
/// SDP and candidate strings are passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum SignalPayload {
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
        /// Peer the answer is meant for. When set, the relay delivers it
        /// to that user only instead of fanning out.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_user_id: Option<String>,
    },
    IceCandidate {
        candidate: String,
        #[serde(default)]
        sdp_mid: Option<String>,
        #[serde(default)]
        sdp_mline_index: Option<u32>,
    },
}

// ── Relay → Client ────────────────────────────────────────────────────────────

/// Messages sent from the relay to room clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A chat message accepted and sequenced by the relay.
    ChatMessage {
        message_id: String,
        user_id: String,
        username: String,
        message: String,
        /// Relay-assigned creation time, epoch milliseconds.
        timestamp: i64,
    },

    /// A playback control broadcast from another participant (or echoed
    /// back to the sender, who self-filters by `user_id`).
    VideoControl {
        action: VideoAction,
        timestamp: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        user_id: String,
        username: String,
        /// Relay clock at fan-out time, epoch seconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_timestamp: Option<f64>,
        /// Broker-measured delay of this message in seconds, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        latency: Option<f64>,
    },

    ScreenShareStarted {
        user_id: String,
        username: String,
        session_id: String,
    },

    ScreenShareEnded {
        user_id: String,
        username: String,
    },

    UserJoined {
        user_id: String,
        username: String,
    },

    UserLeft {
        user_id: String,
        username: String,
    },

    /// A signaling payload forwarded from another participant.
    WebrtcSignal {
        user_id: String,
        signal: SignalPayload,
    },

    /// A chat message was deleted by a moderator (or its author).
    MessageDeleted {
        message_id: String,
        message_author: String,
        message_content: String,
        deleted_by: String,
    },

    /// Response to a latency probe, echoing the client's clock reading.
    Pong { client_time: i64 },

    UserMuted {
        user_id: String,
        username: String,
        muted_by: String,
        duration_minutes: i64,
    },

    UserUnmuted {
        user_id: String,
        username: String,
        unmuted_by: String,
    },

    BannedWordAdded {
        word: String,
        added_by: String,
    },

    BannedWordRemoved {
        word: String,
        removed_by: String,
    },

    UserKicked {
        user_id: String,
        username: String,
        kicked_by: String,
    },

    /// Sent only to the kicked user. The client is expected to close its
    /// own channel with [`CLOSE_KICK_HANDLED`] and stop processing.
    YouWereKicked {
        room_name: String,
        kicked_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        redirect_url: Option<String>,
    },

    UserBanned {
        user_id: String,
        username: String,
        banned_by: String,
    },

    /// Sent only to the banned user. Permanent variant of the kick path:
    /// the client closes with [`CLOSE_BAN_HANDLED`] and redirects to the
    /// ban-information page.
    YouWereBanned {
        room_name: String,
        banned_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        redirect_url: Option<String>,
    },

    UserUnbanned {
        user_id: String,
        username: String,
        unbanned_by: String,
    },

    TypingIndicator {
        user_id: String,
        username: String,
        is_typing: bool,
    },

    /// Full membership/playback snapshot. Sent on every (re)connect;
    /// clients must reconcile it by upsert at any time.
    RoomState {
        room_id: String,
        room_name: String,
        creator_id: String,
        participants: Vec<ParticipantInfo>,
        playback: PlaybackSnapshot,
        /// Only populated for the room creator.
        banned_words: Vec<String>,
        /// Recent chat history, oldest first.
        messages: Vec<ChatHistoryEntry>,
    },

    /// Error response for a rejected client message.
    Error { message: String },
}

// ── Supporting Types ──────────────────────────────────────────────────────────

/// One participant as carried in a room snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub user_id: String,
    pub username: String,
    pub is_online: bool,
    pub is_creator: bool,
    pub is_muted: bool,
    pub is_banned: bool,
}

/// Playback state as carried in a room snapshot. The position is the
/// last accepted control timestamp — clients apply their own latency
/// correction on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    #[serde(default)]
    pub url: Option<String>,
    pub playing: bool,
    pub position: f64,
    /// Relay clock when the state last changed, epoch seconds.
    pub updated_at: f64,
}

/// One chat entry as carried in a room snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    pub message_id: String,
    pub user_id: String,
    pub username: String,
    pub message: String,
    pub timestamp: i64,
}

/// A chat message retained in the room's bounded log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub message_id: String,
    pub user_id: String,
    pub username: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn to_history_entry(&self) -> ChatHistoryEntry {
        ChatHistoryEntry {
            message_id: self.message_id.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            message: self.message.clone(),
            timestamp: self.created_at.timestamp_millis(),
        }
    }
}
