//! # WatchSync Core
//!
//! Client-side engine for synchronized group video watching: one shared
//! player, a chat, and screen sharing, kept consistent across everyone
//! in a room by a relay server.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        WATCHSYNC CORE MODULES                       │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │                        RoomSession                           │  │
//! │  │   exhaustive inbound dispatch · UiEvent outbox · timers      │  │
//! │  └──────┬───────────┬───────────┬───────────┬──────────┬───────┘  │
//! │         │           │           │           │          │          │
//! │  ┌──────▼────┐ ┌────▼─────┐ ┌───▼──────┐ ┌──▼──────┐ ┌─▼───────┐  │
//! │  │Connection │ │SyncEngine│ │ ChatLog  │ │ Roster  │ │ Share   │  │
//! │  │           │ │          │ │ Typing   │ │         │ │ Manager │  │
//! │  │- backoff  │ │- latency │ │- escape  │ │- upsert │ │- SDP/ICE│  │
//! │  │- terminal │ │  adjust  │ │- dedup   │ │- derived│ │- capture│  │
//! │  │  codes    │ │- echo    │ │- typing  │ │  count  │ │  seams  │  │
//! │  │           │ │  guard   │ │  expiry  │ │         │ │         │  │
//! │  └─────┬─────┘ └──────────┘ └──────────┘ └─────────┘ └─────────┘  │
//! │        │                                                          │
//! │  ┌─────▼─────────────────┐   ┌────────────────────────────────┐   │
//! │  │ transport (WebSocket) │   │ moderation (REST, creator-only)│   │
//! │  └───────────────────────┘   └────────────────────────────────┘   │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`protocol`] - Wire messages and close codes shared with the relay
//! - [`events`] - [`events::UiEvent`] stream the embedding UI consumes
//! - [`session`] - The room session tying everything together
//! - [`connection`] - Channel ownership and reconnect policy
//! - [`transport`] - WebSocket transport behind the channel seam
//! - [`video`] - Source classification and playback synchronization
//! - [`chat`] - Chat log and typing indicators
//! - [`roster`] - Participant roster
//! - [`latency`] - Ping/pong round-trip measurement
//! - [`screenshare`] - Screen-share signaling behind platform seams
//! - [`moderation`] - REST client for creator moderation actions
//!
//! ## Design Notes
//!
//! The session core is synchronous and clock-injected: every deadline
//! (reconnect backoff, typing expiry, latency probes, the echo guard,
//! the post-ejection redirect) takes `now` as a parameter, so tests
//! drive time explicitly and never sleep. I/O lives at the edges — the
//! [`transport`] module owns the socket tasks, [`moderation`] owns the
//! HTTP client — and reaches the session only through trait seams and
//! plain message values.

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod chat;
pub mod connection;
pub mod error;
pub mod events;
pub mod latency;
pub mod moderation;
pub mod protocol;
pub mod roster;
pub mod screenshare;
pub mod session;
pub mod transport;
pub mod video;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use connection::{ChannelSink, ConnectionManager, ConnectionState};
pub use error::{Error, Result};
pub use events::{ConnectionStatus, EjectionKind, NoticeLevel, UiEvent};
pub use protocol::{ClientMessage, ServerMessage, ShareAction, SignalPayload, VideoAction};
pub use session::{RoomClientContext, RoomSession};
pub use video::{Player, SyncEngine, VideoSource};
