//! Wire protocol message definitions.
//!
//! Client-side mirror of the relay's protocol. Every frame is a JSON
//! object with a `type` discriminator; inbound frames are decoded once
//! at the boundary and matched exhaustively by the session.
//!
//! Must match the relay's protocol definitions exactly.

use serde::{Deserialize, Serialize};

// ── Close Codes ───────────────────────────────────────────────────────────────
// Must match the relay's close codes.

/// Room does not exist or has been deactivated. Terminal — no reconnect.
pub const CLOSE_ROOM_NOT_FOUND: u16 = 4001;

/// Connection setup failed server-side. Terminal.
pub const CLOSE_SETUP_ERROR: u16 = 4002;

/// Sent by the client when it closes its own channel after a kick.
pub const CLOSE_KICK_HANDLED: u16 = 4003;

/// Sent by the client when it closes its own channel after a ban.
pub const CLOSE_BAN_HANDLED: u16 = 4004;

/// The connecting user is banned from the room. Terminal.
pub const CLOSE_BANNED: u16 = 4005;

/// Check whether a close code marks the session as unrecoverable.
/// Reconnection must never be attempted after one of these.
pub fn is_terminal_close_code(code: u16) -> bool {
    matches!(
        code,
        CLOSE_ROOM_NOT_FOUND
            | CLOSE_SETUP_ERROR
            | CLOSE_KICK_HANDLED
            | CLOSE_BAN_HANDLED
            | CLOSE_BANNED
    )
}

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Messages sent from this client to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Post a chat message to the room.
    ChatMessage { message: String },

    /// A playback control action to broadcast. `timestamp` is the local
    /// playback position in seconds at send time.
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
    WebrtcSignal { signal: SignalPayload },

    /// Latency probe. `client_time` is our clock at send time and comes
    /// back unchanged in the pong.
    Ping { client_time: i64 },

    /// We started typing in the chat input.
    TypingStart,

    /// We stopped typing.
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

/// A WebRTC signaling payload. SDP and candidate strings pass through
/// the relay untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum SignalPayload {
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
        /// Peer the answer is meant for. The relay delivers targeted
        /// answers to that user only.
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

/// Messages received from the relay.
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

    /// A playback control from another participant. Our own controls
    /// come back too — the session drops them by `user_id`.
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

    /// Response to a latency probe, echoing our clock reading.
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

    /// We were kicked. Show the overlay, close the channel with
    /// [`CLOSE_KICK_HANDLED`], and stop processing.
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

    /// We were banned. Permanent variant of the kick path; closes with
    /// [`CLOSE_BAN_HANDLED`].
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

    /// Full membership/playback snapshot. Arrives on every (re)connect
    /// and must be reconciled by upsert at any time.
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

    /// Error response for a rejected message of ours.
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

/// Playback state as carried in a room snapshot.
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
