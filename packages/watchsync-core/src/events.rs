//! # Session Events
//!
//! Events emitted by the session engine for the embedding UI to handle.
//! The engine never touches presentation directly — every user-visible
//! effect comes out as one of these, which also makes session behavior
//! assertable in tests.

/// Severity of a transient notice. Hosts typically auto-dismiss notices
/// after a few seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Connection lifecycle as observed by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// Waiting out the backoff before reconnect attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// No further reconnects will happen.
    Offline,
}

/// Why the session was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EjectionKind {
    Kicked,
    Banned,
}

/// Events emitted by the session for the application to handle
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Show a transient notice
    Notice {
        level: NoticeLevel,
        text: String,
    },

    /// The connection status changed
    ConnectionChanged {
        status: ConnectionStatus,
    },

    /// A chat message was appended to the log
    ChatAppended {
        message_id: String,
    },

    /// A chat message was (soft-)deleted
    ChatDeleted {
        message_id: String,
    },

    /// The participant roster changed — re-read it from the session
    RosterChanged,

    /// The set of currently-typing users changed
    TypingChanged {
        usernames: Vec<String>,
    },

    /// A participant started sharing their screen
    ShareStarted {
        user_id: String,
        username: String,
    },

    /// A screen share ended
    ShareEnded {
        user_id: String,
        username: String,
    },

    /// A new latency measurement completed
    LatencyUpdated {
        rtt_ms: i64,
    },

    /// We were removed from the room. The overlay goes up now; the
    /// redirect follows as a separate event once the delay elapses.
    Ejected {
        kind: EjectionKind,
        room_name: String,
        by: String,
    },

    /// The post-ejection delay elapsed — navigate away
    RedirectNow {
        url: String,
    },
}

impl UiEvent {
    /// Shorthand for an informational notice.
    pub fn info(text: impl Into<String>) -> Self {
        UiEvent::Notice {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    /// Shorthand for a warning notice.
    pub fn warn(text: impl Into<String>) -> Self {
        UiEvent::Notice {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    /// Shorthand for an error notice.
    pub fn error(text: impl Into<String>) -> Self {
        UiEvent::Notice {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }

    /// Check if this event ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, UiEvent::Ejected { .. })
    }
}

// ============================================================================
// TESTS
// ============================================================================
