//! Room session.
//!
//! [`RoomSession`] owns every per-room component — connection, roster,
//! chat, typing, playback sync, latency, screen share — and routes the
//! inbound message stream through them. All room/identity state hangs
//! off the session; nothing is global, so two rooms can coexist in one
//! process and tests build sessions freely.
//!
//! Inbound dispatch is exhaustive: adding a message variant without a
//! handling arm is a compile error, not a silently dropped frame.
//!
//! Once ejected (kicked or banned) the session is terminal: the channel
//! is closed with the matching handled-code, every later inbound frame
//! is ignored, and after a short delay a redirect event fires.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::chat::{ChatLog, TypingSignal, TypingState};
use crate::connection::{ChannelSink, ConnectionManager, ConnectionState};
use crate::error::{Error, Result};
use crate::events::{ConnectionStatus, EjectionKind, UiEvent};
use crate::latency::LatencyTracker;
use crate::protocol::{
    ClientMessage, ServerMessage, ShareAction, SignalPayload, VideoAction, CLOSE_BAN_HANDLED,
    CLOSE_KICK_HANDLED,
};
use crate::roster::Roster;
use crate::screenshare::{ShareManager, SharePlatform};
use crate::video::{Player, SyncEngine};

/// Milliseconds between the ejection overlay and the redirect.
pub const EJECT_REDIRECT_DELAY_MS: i64 = 2_500;

/// Fallback redirect after a kick.
const DEFAULT_KICK_REDIRECT: &str = "/rooms/";

/// Fallback redirect after a ban.
const DEFAULT_BAN_REDIRECT: &str = "/rooms/youre-banned/";

/// Identity of this client within one room.
#[derive(Debug, Clone)]
pub struct RoomClientContext {
    pub room_id: String,
    pub user_id: String,
    pub username: String,
    pub is_creator: bool,
}

/// One client's session in one room.
pub struct RoomSession {
    ctx: RoomClientContext,
    connection: ConnectionManager,
    roster: Roster,
    chat: ChatLog,
    typing: TypingState,
    video: SyncEngine,
    latency: LatencyTracker,
    share: ShareManager,
    player: Box<dyn Player>,
    platform: Box<dyn SharePlatform>,
    room_name: Option<String>,
    banned_words: Vec<String>,
    ejection: Option<EjectionKind>,
    redirect: Option<(DateTime<Utc>, String)>,
    outbox: VecDeque<UiEvent>,
}

impl RoomSession {
    pub fn new(
        ctx: RoomClientContext,
        player: Box<dyn Player>,
        platform: Box<dyn SharePlatform>,
    ) -> Self {
        Self {
            ctx,
            connection: ConnectionManager::new(),
            roster: Roster::new(),
            chat: ChatLog::new(),
            typing: TypingState::new(),
            video: SyncEngine::new(),
            latency: LatencyTracker::new(),
            share: ShareManager::new(),
            player,
            platform,
            room_name: None,
            banned_words: Vec::new(),
            ejection: None,
            redirect: None,
            outbox: VecDeque::new(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn context(&self) -> &RoomClientContext {
        &self.ctx
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn banned_words(&self) -> &[String] {
        &self.banned_words
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_ejected(&self) -> bool {
        self.ejection.is_some()
    }

    /// Take everything the UI needs to react to since the last drain.
    pub fn drain_events(&mut self) -> Vec<UiEvent> {
        self.outbox.drain(..).collect()
    }

    fn emit(&mut self, event: UiEvent) {
        self.outbox.push_back(event);
    }

    // ── Connection Lifecycle ──────────────────────────────────────────────

    /// A transport connected (or reconnected).
    pub fn on_connected(&mut self, sink: Box<dyn ChannelSink>) {
        self.connection.attached(sink);
        self.latency.reset();
        self.emit(UiEvent::ConnectionChanged {
            status: ConnectionStatus::Connected,
        });
    }

    /// The transport reported a close.
    pub fn on_channel_closed(&mut self, code: Option<u16>, now: DateTime<Utc>) {
        if self.is_ejected() {
            return; // Our own close after ejection
        }
        match self.connection.on_closed(code, now) {
            ConnectionState::AwaitingRetry { attempt } => {
                self.emit(UiEvent::ConnectionChanged {
                    status: ConnectionStatus::Reconnecting { attempt },
                });
            }
            ConnectionState::Terminal { code } => {
                let text = match code {
                    Some(crate::protocol::CLOSE_ROOM_NOT_FOUND) => {
                        "This room no longer exists."
                    }
                    Some(crate::protocol::CLOSE_BANNED) => "You are banned from this room.",
                    Some(crate::protocol::CLOSE_SETUP_ERROR) => {
                        "The room connection could not be set up."
                    }
                    _ => "Could not reconnect to the room. Refresh to try again.",
                };
                self.emit(UiEvent::error(text));
                self.emit(UiEvent::ConnectionChanged {
                    status: ConnectionStatus::Offline,
                });
                // A ban discovered at connect time still lands on the
                // ban page, same as one delivered in-session.
                if code == Some(crate::protocol::CLOSE_BANNED) {
                    self.redirect = Some((
                        now + Duration::milliseconds(EJECT_REDIRECT_DELAY_MS),
                        DEFAULT_BAN_REDIRECT.to_string(),
                    ));
                }
            }
            _ => {}
        }
    }

    /// Whether the host loop should attempt a reconnect now.
    pub fn reconnect_due(&self, now: DateTime<Utc>) -> bool {
        self.connection.reconnect_due(now)
    }

    // ── Inbound ───────────────────────────────────────────────────────────

    /// Decode and dispatch one inbound frame. A malformed frame is
    /// dropped with a notice; the session itself carries on.
    pub fn handle_frame(&mut self, frame: &str, now: DateTime<Utc>) {
        match serde_json::from_str::<ServerMessage>(frame) {
            Ok(msg) => self.handle_message(msg, now),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unparseable frame");
                self.emit(UiEvent::error("Could not process a message from the room."));
            }
        }
    }

    /// Dispatch one inbound message.
    pub fn handle_message(&mut self, msg: ServerMessage, now: DateTime<Utc>) {
        if self.is_ejected() {
            return; // Terminal — nothing gets through
        }

        match msg {
            ServerMessage::ChatMessage {
                message_id,
                user_id,
                username,
                message,
                timestamp,
            } => {
                // A message from a typist retires their indicator early.
                if self.typing.on_remote_message(&user_id) {
                    let usernames = self.typing.typing_usernames();
                    self.emit(UiEvent::TypingChanged { usernames });
                }
                if self
                    .chat
                    .append(&message_id, &user_id, &username, &message, timestamp)
                {
                    self.emit(UiEvent::ChatAppended { message_id });
                }
            }

            ServerMessage::VideoControl {
                action,
                timestamp,
                url,
                user_id,
                latency,
                ..
            } => {
                if user_id == self.ctx.user_id {
                    return; // Our own echo
                }
                let delay = latency.unwrap_or(0.0) + self.latency.one_way_secs();
                self.video.apply_remote(
                    action,
                    timestamp,
                    url.as_deref(),
                    delay,
                    now,
                    self.player.as_mut(),
                );
            }

            ServerMessage::ScreenShareStarted {
                user_id, username, ..
            } => {
                if user_id == self.ctx.user_id {
                    return;
                }
                self.share.on_remote_started(&user_id, &username);
                self.emit(UiEvent::ShareStarted { user_id, username });
            }

            ServerMessage::ScreenShareEnded { user_id, username } => {
                if user_id == self.ctx.user_id {
                    return;
                }
                self.share.on_remote_ended(&user_id);
                self.emit(UiEvent::ShareEnded { user_id, username });
            }

            ServerMessage::UserJoined { user_id, username } => {
                if user_id == self.ctx.user_id {
                    return;
                }
                self.roster.user_joined(&user_id, &username);
                self.emit(UiEvent::info(format!("{} joined the room", username)));
                self.emit(UiEvent::RosterChanged);
            }

            ServerMessage::UserLeft { user_id, username } => {
                if user_id == self.ctx.user_id {
                    return;
                }
                self.roster.user_left(&user_id);
                self.emit(UiEvent::info(format!("{} left the room", username)));
                self.emit(UiEvent::RosterChanged);
            }

            ServerMessage::WebrtcSignal { user_id, signal } => {
                if user_id == self.ctx.user_id {
                    return;
                }
                self.handle_signal(&user_id, signal);
            }

            ServerMessage::MessageDeleted {
                message_id,
                deleted_by,
                ..
            } => {
                if self.chat.delete(&message_id) {
                    self.emit(UiEvent::ChatDeleted { message_id });
                    // Deleting your own message needs no announcement.
                    if deleted_by != self.ctx.username {
                        self.emit(UiEvent::info(format!("Message deleted by {}", deleted_by)));
                    }
                }
            }

            ServerMessage::Pong { client_time } => {
                if let Some(rtt_ms) = self.latency.on_pong(client_time, now) {
                    self.emit(UiEvent::LatencyUpdated { rtt_ms });
                }
            }

            ServerMessage::UserMuted {
                user_id,
                username,
                muted_by,
                duration_minutes,
            } => {
                self.roster.set_muted(&user_id, true);
                let text = if user_id == self.ctx.user_id {
                    format!(
                        "You were muted by {} for {} minutes",
                        muted_by, duration_minutes
                    )
                } else {
                    format!("{} was muted by {}", username, muted_by)
                };
                self.emit(UiEvent::info(text));
                self.emit(UiEvent::RosterChanged);
            }

            ServerMessage::UserUnmuted {
                user_id,
                username,
                unmuted_by,
            } => {
                self.roster.set_muted(&user_id, false);
                let text = if user_id == self.ctx.user_id {
                    format!("You were unmuted by {}", unmuted_by)
                } else {
                    format!("{} was unmuted", username)
                };
                self.emit(UiEvent::info(text));
                self.emit(UiEvent::RosterChanged);
            }

            ServerMessage::BannedWordAdded { word, .. } => {
                if !self.banned_words.contains(&word) {
                    self.banned_words.push(word.clone());
                }
                if self.ctx.is_creator {
                    self.emit(UiEvent::info(format!("Banned word added: {}", word)));
                }
            }

            ServerMessage::BannedWordRemoved { word, .. } => {
                self.banned_words.retain(|w| w != &word);
                if self.ctx.is_creator {
                    self.emit(UiEvent::info(format!("Banned word removed: {}", word)));
                }
            }

            ServerMessage::UserKicked {
                user_id,
                username,
                kicked_by,
            } => {
                // Our own kick arrives as YouWereKicked; this is about
                // someone else.
                if user_id != self.ctx.user_id {
                    self.roster.remove(&user_id);
                    self.emit(UiEvent::info(format!(
                        "{} was kicked by {}",
                        username, kicked_by
                    )));
                    self.emit(UiEvent::RosterChanged);
                }
            }

            ServerMessage::YouWereKicked {
                room_name,
                kicked_by,
                redirect_url,
            } => {
                self.eject(
                    EjectionKind::Kicked,
                    room_name,
                    kicked_by,
                    redirect_url.unwrap_or_else(|| DEFAULT_KICK_REDIRECT.to_string()),
                    CLOSE_KICK_HANDLED,
                    now,
                );
            }

            ServerMessage::UserBanned {
                user_id,
                username,
                banned_by,
            } => {
                if user_id != self.ctx.user_id {
                    self.roster.remove(&user_id);
                    self.emit(UiEvent::info(format!(
                        "{} was banned by {}",
                        username, banned_by
                    )));
                    self.emit(UiEvent::RosterChanged);
                }
            }

            ServerMessage::YouWereBanned {
                room_name,
                banned_by,
                redirect_url,
            } => {
                self.eject(
                    EjectionKind::Banned,
                    room_name,
                    banned_by,
                    redirect_url.unwrap_or_else(|| DEFAULT_BAN_REDIRECT.to_string()),
                    CLOSE_BAN_HANDLED,
                    now,
                );
            }

            ServerMessage::UserUnbanned { username, .. } => {
                self.emit(UiEvent::info(format!("{} was unbanned", username)));
            }

            ServerMessage::TypingIndicator {
                user_id,
                username,
                is_typing,
            } => {
                if user_id == self.ctx.user_id {
                    return;
                }
                if self
                    .typing
                    .on_remote_indicator(&user_id, &username, is_typing, now)
                {
                    let usernames = self.typing.typing_usernames();
                    self.emit(UiEvent::TypingChanged { usernames });
                }
            }

            ServerMessage::RoomState {
                room_name,
                participants,
                playback,
                banned_words,
                messages,
                ..
            } => {
                self.room_name = Some(room_name);
                self.roster.apply_snapshot(&participants);
                self.chat.apply_history(&messages);
                // The snapshot is authoritative, including an empty list
                // after the last word was removed.
                self.banned_words = banned_words;

                // Reconcile playback through the sync engine so the
                // resulting player events stay behind the echo guard.
                if let Some(url) = playback.url.as_deref() {
                    if self.video.current_url() != Some(url) {
                        self.video.apply_remote(
                            VideoAction::Load,
                            0.0,
                            Some(url),
                            0.0,
                            now,
                            self.player.as_mut(),
                        );
                    }
                    let action = if playback.playing {
                        VideoAction::Play
                    } else {
                        VideoAction::Sync
                    };
                    self.video.apply_remote(
                        action,
                        playback.position,
                        None,
                        0.0,
                        now,
                        self.player.as_mut(),
                    );
                }

                self.emit(UiEvent::RosterChanged);
            }

            ServerMessage::Error { message } => {
                self.emit(UiEvent::error(message));
            }
        }
    }

    fn handle_signal(&mut self, from_user_id: &str, signal: SignalPayload) {
        match signal {
            SignalPayload::Offer { sdp } => {
                match self.share.on_offer(self.platform.as_mut(), &sdp) {
                    Ok(answer) => {
                        let _ = self.connection.send(&ClientMessage::WebrtcSignal {
                            signal: SignalPayload::Answer {
                                sdp: answer,
                                to_user_id: Some(from_user_id.to_string()),
                            },
                        });
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Ignoring offer");
                    }
                }
            }
            SignalPayload::Answer { sdp, .. } => {
                if let Err(e) = self.share.on_answer(&sdp) {
                    tracing::warn!(error = %e, "Failed to apply answer");
                }
            }
            SignalPayload::IceCandidate {
                candidate,
                sdp_mid,
                sdp_mline_index,
            } => {
                if let Err(e) = self.share.on_ice_candidate(
                    &candidate,
                    sdp_mid.as_deref(),
                    sdp_mline_index,
                ) {
                    tracing::warn!(error = %e, "Failed to apply ICE candidate");
                }
            }
        }
    }

    fn eject(
        &mut self,
        kind: EjectionKind,
        room_name: String,
        by: String,
        redirect_url: String,
        close_code: u16,
        now: DateTime<Utc>,
    ) {
        // First ejection wins; a duplicate or conflicting notice after
        // the fact changes nothing.
        if self.is_ejected() {
            return;
        }
        self.ejection = Some(kind);
        self.share.stop();
        self.connection.close(close_code, "ejection handled");
        self.redirect = Some((now + Duration::milliseconds(EJECT_REDIRECT_DELAY_MS), redirect_url));
        self.emit(UiEvent::Ejected {
            kind,
            room_name,
            by,
        });
    }

    // ── Outbound ──────────────────────────────────────────────────────────

    /// Send a chat message. Empty input warns and sends nothing;
    /// sending also retires the local typing flag.
    pub fn send_chat(&mut self, text: &str) -> Result<()> {
        if self.is_ejected() {
            return Err(Error::Ejected);
        }
        let text = text.trim();
        if text.is_empty() {
            self.emit(UiEvent::warn("Cannot send an empty message."));
            return Ok(());
        }
        self.connection.send(&ClientMessage::ChatMessage {
            message: text.to_string(),
        })?;
        if self.typing.on_local_send() == Some(TypingSignal::SendStop) {
            let _ = self.connection.send(&ClientMessage::TypingStop);
        }
        Ok(())
    }

    /// Record a keystroke in the chat input.
    pub fn chat_input(&mut self, now: DateTime<Utc>) {
        if self.is_ejected() {
            return;
        }
        if self.typing.on_local_input(now) == Some(TypingSignal::SendStart) {
            let _ = self.connection.send(&ClientMessage::TypingStart);
        }
    }

    /// The chat input lost focus — stop typing immediately.
    pub fn chat_blur(&mut self) {
        if self.typing.on_local_send() == Some(TypingSignal::SendStop) {
            let _ = self.connection.send(&ClientMessage::TypingStop);
        }
    }

    /// Load a video locally and broadcast the load to the room.
    pub fn load_video(&mut self, url: &str) -> Result<()> {
        if self.is_ejected() {
            return Err(Error::Ejected);
        }
        self.video.request_load(url, self.player.as_mut())?;
        self.connection.send(&ClientMessage::VideoControl {
            action: VideoAction::Load,
            timestamp: 0.0,
            url: Some(url.to_string()),
        })
    }

    /// Broadcast a play/pause/sync control at the player's current
    /// position. The local player has already acted — only the room
    /// needs telling.
    pub fn send_video_control(&mut self, action: VideoAction) -> Result<()> {
        if self.is_ejected() {
            return Err(Error::Ejected);
        }
        let position = self.player.position();
        self.connection.send(&ClientMessage::VideoControl {
            action,
            timestamp: position,
            url: None,
        })
    }

    /// Start presenting: open capture, announce the share, and
    /// broadcast the offer.
    pub fn start_share(&mut self) -> Result<()> {
        if self.is_ejected() {
            return Err(Error::Ejected);
        }
        let offer = self.share.start(self.platform.as_mut())?;
        self.connection.send(&ClientMessage::ScreenShare {
            action: ShareAction::Start,
        })?;
        self.connection.send(&ClientMessage::WebrtcSignal {
            signal: SignalPayload::Offer { sdp: offer },
        })
    }

    /// Stop presenting. Safe to call when not presenting.
    pub fn stop_share(&mut self) -> Result<()> {
        if self.share.stop() {
            self.connection.send(&ClientMessage::ScreenShare {
                action: ShareAction::Stop,
            })?;
        }
        Ok(())
    }

    /// The capture ended from outside (browser/OS stop control).
    pub fn on_capture_track_ended(&mut self) {
        if self.share.on_track_ended() {
            let _ = self.connection.send(&ClientMessage::ScreenShare {
                action: ShareAction::Stop,
            });
            self.emit(UiEvent::info("Screen share ended"));
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────

    /// Advance every deadline. The host loop calls this on a coarse
    /// tick (a few times per second is plenty).
    pub fn poll_timers(&mut self, now: DateTime<Utc>) {
        // The redirect fires even after ejection — it is the one timer
        // the terminal state keeps.
        if let Some((at, url)) = &self.redirect {
            if now >= *at {
                let url = url.clone();
                self.redirect = None;
                self.emit(UiEvent::RedirectNow { url });
            }
        }
        if self.is_ejected() {
            return;
        }

        let (signal, remote_changed) = self.typing.poll(now);
        if signal == Some(TypingSignal::SendStop) {
            let _ = self.connection.send(&ClientMessage::TypingStop);
        }
        if remote_changed {
            let usernames = self.typing.typing_usernames();
            self.emit(UiEvent::TypingChanged { usernames });
        }

        if self.connection.is_connected() && self.latency.should_probe(now) {
            let client_time = self.latency.probe(now);
            let _ = self.connection.send(&ClientMessage::Ping { client_time });
        }

        self.video.poll(now, self.player.as_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ParticipantInfo, PlaybackSnapshot};
    use crate::screenshare::{CaptureError, CaptureSource, PeerLink};
    use crate::video::VideoSource;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    // ── Mocks ─────────────────────────────────────────────────────────

    #[derive(Default)]
    struct SinkLog {
        frames: Vec<String>,
        closed_with: Option<u16>,
    }

    struct RecordingSink {
        log: Rc<RefCell<SinkLog>>,
        open: bool,
    }

    impl ChannelSink for RecordingSink {
        fn is_open(&self) -> bool {
            self.open
        }
        fn send(&mut self, frame: &str) -> Result<()> {
            self.log.borrow_mut().frames.push(frame.to_string());
            Ok(())
        }
        fn close(&mut self, code: u16, _reason: &str) {
            self.open = false;
            self.log.borrow_mut().closed_with = Some(code);
        }
    }

    #[derive(Default)]
    struct PlayerLog {
        calls: Vec<String>,
    }

    struct RecordingPlayer {
        log: Rc<RefCell<PlayerLog>>,
        position: f64,
    }

    impl Player for RecordingPlayer {
        fn load(&mut self, source: &VideoSource) {
            self.log.borrow_mut().calls.push(format!("load:{:?}", source));
        }
        fn play(&mut self, position: f64) {
            self.log.borrow_mut().calls.push(format!("play:{}", position));
        }
        fn pause(&mut self, position: f64) {
            self.log
                .borrow_mut()
                .calls
                .push(format!("pause:{}", position));
        }
        fn seek(&mut self, position: f64) {
            self.log.borrow_mut().calls.push(format!("seek:{}", position));
        }
        fn position(&self) -> f64 {
            self.position
        }
    }

    struct StubCapture;
    impl CaptureSource for StubCapture {
        fn stop(&mut self) {}
    }

    struct StubLink;
    impl PeerLink for StubLink {
        fn create_offer(&mut self) -> Result<String> {
            Ok("offer-sdp".to_string())
        }
        fn apply_offer(&mut self, _sdp: &str) -> Result<String> {
            Ok("answer-sdp".to_string())
        }
        fn apply_answer(&mut self, _sdp: &str) -> Result<()> {
            Ok(())
        }
        fn add_ice_candidate(
            &mut self,
            _candidate: &str,
            _sdp_mid: Option<&str>,
            _sdp_mline_index: Option<u32>,
        ) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    struct StubPlatform;
    impl SharePlatform for StubPlatform {
        fn open_capture(&mut self) -> std::result::Result<Box<dyn CaptureSource>, CaptureError> {
            Ok(Box::new(StubCapture))
        }
        fn create_link(&mut self, _with_capture: bool) -> Box<dyn PeerLink> {
            Box::new(StubLink)
        }
    }

    struct Harness {
        session: RoomSession,
        sink_log: Rc<RefCell<SinkLog>>,
        player_log: Rc<RefCell<PlayerLog>>,
    }

    fn harness() -> Harness {
        let sink_log = Rc::new(RefCell::new(SinkLog::default()));
        let player_log = Rc::new(RefCell::new(PlayerLog::default()));

        let ctx = RoomClientContext {
            room_id: "r1".to_string(),
            user_id: "me".to_string(),
            username: "me".to_string(),
            is_creator: false,
        };
        let mut session = RoomSession::new(
            ctx,
            Box::new(RecordingPlayer {
                log: player_log.clone(),
                position: 33.0,
            }),
            Box::new(StubPlatform),
        );
        session.on_connected(Box::new(RecordingSink {
            log: sink_log.clone(),
            open: true,
        }));
        session.drain_events();

        Harness {
            session,
            sink_log,
            player_log,
        }
    }

    fn chat_msg(id: &str, user: &str, text: &str) -> ServerMessage {
        ServerMessage::ChatMessage {
            message_id: id.to_string(),
            user_id: user.to_string(),
            username: user.to_string(),
            message: text.to_string(),
            timestamp: 1,
        }
    }

    // ── Chat & Typing ─────────────────────────────────────────────────

    #[test]
    fn test_chat_appended_and_escaped() {
        let mut h = harness();
        h.session.handle_message(chat_msg("m1", "bob", "<b>hi</b>"), t(0));

        let events = h.session.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::ChatAppended { message_id } if message_id == "m1")));
        assert_eq!(h.session.chat().entries()[0].message, "&lt;b&gt;hi&lt;/b&gt;");

        // Duplicate delivery is dropped.
        h.session.handle_message(chat_msg("m1", "bob", "<b>hi</b>"), t(10));
        assert_eq!(h.session.chat().len(), 1);
    }

    #[test]
    fn test_chat_message_clears_typing_indicator() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::TypingIndicator {
                user_id: "bob".to_string(),
                username: "bob".to_string(),
                is_typing: true,
            },
            t(0),
        );
        h.session.drain_events();

        h.session.handle_message(chat_msg("m1", "bob", "done"), t(500));
        let events = h.session.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::TypingChanged { usernames } if usernames.is_empty())));
    }

    #[test]
    fn test_local_typing_start_sent_once() {
        let mut h = harness();
        h.session.chat_input(t(0));
        h.session.chat_input(t(100));

        let frames = h.sink_log.borrow().frames.clone();
        assert_eq!(
            frames
                .iter()
                .filter(|f| f.contains("typing_start"))
                .count(),
            1
        );
    }

    #[test]
    fn test_send_chat_stops_typing() {
        let mut h = harness();
        h.session.chat_input(t(0));
        h.session.send_chat("hello").unwrap();

        let frames = h.sink_log.borrow().frames.clone();
        assert!(frames.iter().any(|f| f.contains("chat_message")));
        assert!(frames.iter().any(|f| f.contains("typing_stop")));
    }

    #[test]
    fn test_blur_stops_typing() {
        let mut h = harness();
        h.session.chat_input(t(0));
        h.session.chat_blur();
        h.session.chat_blur();

        let frames = h.sink_log.borrow().frames.clone();
        assert_eq!(
            frames.iter().filter(|f| f.contains("typing_stop")).count(),
            1
        );
    }

    #[test]
    fn test_malformed_frame_notices_and_continues() {
        let mut h = harness();
        h.session.handle_frame("{not json", t(0));

        let events = h.session.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::Notice { .. })));

        // The session still works afterwards.
        h.session.handle_message(chat_msg("m1", "bob", "still here"), t(10));
        assert_eq!(h.session.chat().len(), 1);
    }

    #[test]
    fn test_empty_chat_warns_and_sends_nothing() {
        let mut h = harness();
        h.session.send_chat("   ").unwrap();
        assert!(h.sink_log.borrow().frames.is_empty());

        let events = h.session.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Notice {
                level: crate::events::NoticeLevel::Warning,
                ..
            }
        )));
    }

    // ── Video Sync ────────────────────────────────────────────────────

    #[test]
    fn test_own_video_echo_ignored() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::VideoControl {
                action: VideoAction::Play,
                timestamp: 10.0,
                url: None,
                user_id: "me".to_string(),
                username: "me".to_string(),
                server_timestamp: None,
                latency: None,
            },
            t(0),
        );
        assert!(h.player_log.borrow().calls.is_empty());
    }

    #[test]
    fn test_remote_play_advanced_by_reported_latency() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::VideoControl {
                action: VideoAction::Play,
                timestamp: 10.0,
                url: None,
                user_id: "bob".to_string(),
                username: "bob".to_string(),
                server_timestamp: Some(1_700_000_000.0),
                latency: Some(0.2),
            },
            t(0),
        );
        assert_eq!(h.player_log.borrow().calls, vec!["play:10.2"]);
    }

    #[test]
    fn test_send_video_control_uses_player_position() {
        let mut h = harness();
        h.session.send_video_control(VideoAction::Pause).unwrap();

        let frames = h.sink_log.borrow().frames.clone();
        assert!(frames[0].contains("\"action\":\"pause\""));
        assert!(frames[0].contains("33"));
    }

    // ── Presence & Snapshot ───────────────────────────────────────────

    #[test]
    fn test_join_then_snapshot_does_not_duplicate() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::UserJoined {
                user_id: "bob".to_string(),
                username: "bob".to_string(),
            },
            t(0),
        );
        h.session.handle_message(
            ServerMessage::RoomState {
                room_id: "r1".to_string(),
                room_name: "movie night".to_string(),
                creator_id: "alice".to_string(),
                participants: vec![
                    ParticipantInfo {
                        user_id: "me".to_string(),
                        username: "me".to_string(),
                        is_online: true,
                        is_creator: false,
                        is_muted: false,
                        is_banned: false,
                    },
                    ParticipantInfo {
                        user_id: "bob".to_string(),
                        username: "bob".to_string(),
                        is_online: true,
                        is_creator: false,
                        is_muted: false,
                        is_banned: false,
                    },
                ],
                playback: PlaybackSnapshot {
                    url: None,
                    playing: false,
                    position: 0.0,
                    updated_at: 0.0,
                },
                banned_words: vec![],
                messages: vec![],
            },
            t(100),
        );

        assert_eq!(h.session.roster().members().len(), 2);
        assert_eq!(h.session.roster().online_count(), 2);
    }

    #[test]
    fn test_snapshot_loads_current_video() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::RoomState {
                room_id: "r1".to_string(),
                room_name: "movie night".to_string(),
                creator_id: "alice".to_string(),
                participants: vec![],
                playback: PlaybackSnapshot {
                    url: Some("dQw4w9WgXcQ".to_string()),
                    playing: false,
                    position: 120.0,
                    updated_at: 0.0,
                },
                banned_words: vec![],
                messages: vec![],
            },
            t(0),
        );

        let calls = h.player_log.borrow().calls.clone();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("load:"));

        // The held seek lands once the echo guard closes.
        h.session.poll_timers(t(200));
        let calls = h.player_log.borrow().calls.clone();
        assert_eq!(calls[1], "seek:120");
    }

    // ── Ejection ──────────────────────────────────────────────────────

    #[test]
    fn test_kick_closes_channel_and_schedules_redirect() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::YouWereKicked {
                room_name: "movie night".to_string(),
                kicked_by: "alice".to_string(),
                redirect_url: None,
            },
            t(0),
        );

        assert!(h.session.is_ejected());
        assert_eq!(h.sink_log.borrow().closed_with, Some(CLOSE_KICK_HANDLED));
        let events = h.session.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Ejected {
                kind: EjectionKind::Kicked,
                ..
            }
        )));

        // Not yet...
        h.session.poll_timers(t(2_499));
        assert!(h.session.drain_events().is_empty());

        // ...now.
        h.session.poll_timers(t(2_500));
        let events = h.session.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::RedirectNow { url } if url == "/rooms/")));
    }

    #[test]
    fn test_ejection_is_exclusive_and_idempotent() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::YouWereBanned {
                room_name: "movie night".to_string(),
                banned_by: "alice".to_string(),
                redirect_url: None,
            },
            t(0),
        );
        assert_eq!(h.sink_log.borrow().closed_with, Some(CLOSE_BAN_HANDLED));

        // A conflicting kick after the ban changes nothing.
        h.session.handle_message(
            ServerMessage::YouWereKicked {
                room_name: "movie night".to_string(),
                kicked_by: "alice".to_string(),
                redirect_url: None,
            },
            t(10),
        );
        assert_eq!(h.sink_log.borrow().closed_with, Some(CLOSE_BAN_HANDLED));

        let events = h.session.drain_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, UiEvent::Ejected { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_ejected_session_ignores_everything() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::YouWereKicked {
                room_name: "movie night".to_string(),
                kicked_by: "alice".to_string(),
                redirect_url: None,
            },
            t(0),
        );
        h.session.drain_events();

        h.session.handle_message(chat_msg("m1", "bob", "hello?"), t(10));
        assert!(h.session.chat().is_empty());
        assert!(matches!(h.session.send_chat("hi"), Err(Error::Ejected)));
    }

    // ── Signaling ─────────────────────────────────────────────────────

    #[test]
    fn test_offer_answered_with_target() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::WebrtcSignal {
                user_id: "bob".to_string(),
                signal: SignalPayload::Offer {
                    sdp: "offer-sdp".to_string(),
                },
            },
            t(0),
        );

        let frames = h.sink_log.borrow().frames.clone();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"signal\":\"answer\""));
        assert!(frames[0].contains("\"to_user_id\":\"bob\""));
    }

    #[test]
    fn test_start_share_announces_then_offers() {
        let mut h = harness();
        h.session.start_share().unwrap();

        let frames = h.sink_log.borrow().frames.clone();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("screen_share"));
        assert!(frames[0].contains("start"));
        assert!(frames[1].contains("\"signal\":\"offer\""));
    }

    #[test]
    fn test_track_end_sends_stop_once() {
        let mut h = harness();
        h.session.start_share().unwrap();
        h.session.on_capture_track_ended();
        h.session.on_capture_track_ended();

        let frames = h.sink_log.borrow().frames.clone();
        assert_eq!(frames.iter().filter(|f| f.contains("stop")).count(), 1);
    }

    // ── Connection & Latency ──────────────────────────────────────────

    #[test]
    fn test_disconnect_schedules_reconnect() {
        let mut h = harness();
        h.session.on_channel_closed(Some(1006), t(0));

        let events = h.session.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::ConnectionChanged {
                status: ConnectionStatus::Reconnecting { attempt: 1 }
            }
        )));
        assert!(!h.session.reconnect_due(t(1_000)));
        assert!(h.session.reconnect_due(t(2_000)));
    }

    #[test]
    fn test_terminal_close_goes_offline() {
        let mut h = harness();
        h.session
            .on_channel_closed(Some(crate::protocol::CLOSE_BANNED), t(0));

        let events = h.session.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::ConnectionChanged {
                status: ConnectionStatus::Offline
            }
        )));
        assert!(!h.session.reconnect_due(t(60_000)));
    }

    #[test]
    fn test_banned_close_redirects_to_ban_page() {
        let mut h = harness();
        h.session
            .on_channel_closed(Some(crate::protocol::CLOSE_BANNED), t(0));
        h.session.drain_events();

        h.session.poll_timers(t(2_500));
        let events = h.session.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::RedirectNow { url } if url == "/rooms/youre-banned/")));
    }

    #[test]
    fn test_snapshot_replaces_banned_word_list() {
        let mut h = harness();
        h.session.handle_message(
            ServerMessage::BannedWordAdded {
                word: "spoiler".to_string(),
                added_by: "alice".to_string(),
            },
            t(0),
        );
        assert_eq!(h.session.banned_words(), ["spoiler"]);

        // A later snapshot with no words means the list was emptied.
        h.session.handle_message(
            ServerMessage::RoomState {
                room_id: "r1".to_string(),
                room_name: "movie night".to_string(),
                creator_id: "alice".to_string(),
                participants: vec![],
                playback: PlaybackSnapshot {
                    url: None,
                    playing: false,
                    position: 0.0,
                    updated_at: 0.0,
                },
                banned_words: vec![],
                messages: vec![],
            },
            t(100),
        );
        assert!(h.session.banned_words().is_empty());
    }

    #[test]
    fn test_latency_probe_and_pong() {
        let mut h = harness();
        h.session.poll_timers(t(1_000));

        let frames = h.sink_log.borrow().frames.clone();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"type\":\"ping\""));
        assert!(frames[0].contains("1000"));

        h.session
            .handle_message(ServerMessage::Pong { client_time: 1_000 }, t(1_240));
        let events = h.session.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::LatencyUpdated { rtt_ms: 240 })));
    }
}
