//! # Error Handling
//!
//! Error types for the Watchsync session engine, categorized by the
//! layer they originate from:
//!
//! ```text
//! Error (top-level)
//! │
//! ├── Transport   - channel lifecycle and delivery failures
//! ├── Protocol    - malformed or unexpected wire traffic
//! ├── Media       - video sources, player readiness, screen capture
//! ├── Moderation  - rejected moderation requests
//! └── Session     - room lifecycle (ejection, closed rooms)
//! ```

use thiserror::Error;

/// Result type alias for session engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the session engine
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================

    /// No open channel to the relay
    #[error("Not connected to the room.")]
    NotConnected,

    /// Connection attempt failed
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// The channel closed mid-operation
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Moderation HTTP request failed at the transport level
    #[error("Request failed: {0}")]
    HttpError(String),

    // ========================================================================
    // Protocol Errors
    // ========================================================================

    /// Malformed or unexpected wire traffic
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ========================================================================
    // Media Errors
    // ========================================================================

    /// The URL does not match any supported video source
    #[error("Unsupported video URL: {0}")]
    InvalidVideoUrl(String),

    /// Screen capture failed to start
    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    /// No active peer link for the signaling payload
    #[error("No active peer link.")]
    NoPeerLink,

    // ========================================================================
    // Moderation Errors
    // ========================================================================

    /// Only the room creator may perform this action
    #[error("Only the room creator can do that.")]
    PermissionDenied,

    /// Moderation actions cannot target the acting user
    #[error("You cannot target yourself.")]
    CannotTargetSelf,

    /// The relay rejected the moderation request for another reason
    #[error("Moderation request failed: {0}")]
    ModerationFailed(String),

    // ========================================================================
    // Session Errors
    // ========================================================================

    /// The session has been terminated by a kick or ban
    #[error("You have been removed from this room.")]
    Ejected,

    /// The room no longer exists or has been deactivated
    #[error("Room not found or no longer active.")]
    RoomClosed,
}

impl Error {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors can potentially be resolved by retrying.
    /// Ejection and closed rooms are terminal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotConnected
                | Error::ConnectionFailed(_)
                | Error::ChannelClosed(_)
                | Error::HttpError(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
