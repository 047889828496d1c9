//! Server state management.
//!
//! Tracks rooms, participants, per-connection sender channels, playback
//! state, and moderation data. All registries are concurrent (DashMap)
//! for lock-free access from connection handlers and REST handlers.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{
    ChatHistoryEntry, ParticipantInfo, PlaybackSnapshot, ServerMessage, StoredMessage, VideoAction,
};

/// Default bound on the per-room chat log.
const DEFAULT_MAX_MESSAGES_PER_ROOM: usize = 500;

/// Default number of history entries carried in a snapshot.
const DEFAULT_SNAPSHOT_HISTORY: usize = 50;

/// Default idle TTL before an empty room is deactivated (4 hours).
const DEFAULT_ROOM_IDLE_TTL_SECS: i64 = 4 * 3600;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub max_messages_per_room: usize,
    pub snapshot_history: usize,
    pub room_idle_ttl_secs: i64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_messages_per_room: DEFAULT_MAX_MESSAGES_PER_ROOM,
            snapshot_history: DEFAULT_SNAPSHOT_HISTORY,
            room_idle_ttl_secs: DEFAULT_ROOM_IDLE_TTL_SECS,
        }
    }
}

// ── Domain Types ──────────────────────────────────────────────────────────────

/// One member of a room. Participants are marked offline on disconnect,
/// never deleted — bans must survive reconnects.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub username: String,
    pub is_online: bool,
    pub is_creator: bool,
    pub muted_until: Option<DateTime<Utc>>,
    pub is_banned: bool,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.map(|until| until > now).unwrap_or(false)
    }
}

/// Canonical playback state of a room. No single client is authoritative:
/// the last accepted control message determines these fields.
#[derive(Debug, Clone)]
pub struct Playback {
    pub url: Option<String>,
    pub playing: bool,
    pub position: f64,
    pub updated_at: DateTime<Utc>,
}

/// An active screen-share session. At most one per user per room.
#[derive(Debug, Clone)]
pub struct ShareSession {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
}

/// A watch room and everything the relay is authoritative over.
#[derive(Debug)]
pub struct Room {
    pub room_id: String,
    pub name: String,
    pub creator_id: String,
    pub is_active: bool,
    pub allow_chat: bool,
    pub allow_screen_share: bool,
    pub participants: Vec<Participant>,
    pub banned_words: HashSet<String>,
    pub playback: Playback,
    pub messages: VecDeque<StoredMessage>,
    pub share: Option<ShareSession>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Room {
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Online count is derived from the participant set, never counted
    /// incrementally, so duplicate join/leave delivery cannot drift it.
    pub fn online_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_online).count()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a connection was refused admission to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    RoomNotFound,
    Banned,
}

/// Why a chat message was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    RoomNotFound,
    ChatDisabled,
    Muted,
    BannedWord(String),
    Empty,
}

/// Why a moderation action was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModError {
    RoomNotFound,
    PermissionDenied,
    CannotTargetSelf,
    TargetNotFound,
}

// ── Relay State ───────────────────────────────────────────────────────────────

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Room ID → room.
    pub rooms: Arc<DashMap<String, Room>>,

    /// (room ID, user ID) → sender channel for online clients.
    /// Inserted when a connection is admitted, removed on disconnect.
    pub clients: Arc<DashMap<(String, String), ClientSender>>,

    /// Server configuration.
    pub config: RelayConfig,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            clients: Arc::new(DashMap::new()),
            config,
        }
    }

    // ── Room Lifecycle ────────────────────────────────────────────────────

    /// Create a new room owned by `creator_id`. Returns the room ID.
    pub fn create_room(
        &self,
        name: &str,
        creator_id: &str,
        allow_chat: bool,
        allow_screen_share: bool,
    ) -> String {
        let room_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let room = Room {
            room_id: room_id.clone(),
            name: name.to_string(),
            creator_id: creator_id.to_string(),
            is_active: true,
            allow_chat,
            allow_screen_share,
            participants: Vec::new(),
            banned_words: HashSet::new(),
            playback: Playback {
                url: None,
                playing: false,
                position: 0.0,
                updated_at: now,
            },
            messages: VecDeque::new(),
            share: None,
            created_at: now,
            last_activity: now,
        };

        tracing::info!(
            room_id = room_id.as_str(),
            creator = creator_id,
            name = name,
            "Created room"
        );
        self.rooms.insert(room_id.clone(), room);
        room_id
    }

    /// Admit a user to a room, upserting their participant record and
    /// marking them online. A returning participant keeps their record
    /// (and their ban, which refuses admission).
    pub fn admit(&self, room_id: &str, user_id: &str, username: &str) -> Result<(), AdmitError> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .filter(|r| r.is_active)
            .ok_or(AdmitError::RoomNotFound)?;

        if room.participant(user_id).map(|p| p.is_banned).unwrap_or(false) {
            return Err(AdmitError::Banned);
        }

        let is_creator = room.creator_id == user_id;
        match room.participant_mut(user_id) {
            Some(p) => {
                p.is_online = true;
                p.username = username.to_string();
            }
            None => {
                room.participants.push(Participant {
                    user_id: user_id.to_string(),
                    username: username.to_string(),
                    is_online: true,
                    is_creator,
                    muted_until: None,
                    is_banned: false,
                    joined_at: Utc::now(),
                });
            }
        }
        room.last_activity = Utc::now();
        Ok(())
    }

    /// Mark a participant offline. The record survives for reconnects.
    pub fn mark_offline(&self, room_id: &str, user_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            if let Some(p) = room.participant_mut(user_id) {
                p.is_online = false;
            }
            room.last_activity = Utc::now();
        }
    }

    /// Whether the user still holds a live participant record. Kicks
    /// remove the record; bans keep it flagged.
    pub fn is_member(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .and_then(|room| room.participant(user_id).map(|p| !p.is_banned))
            .unwrap_or(false)
    }

    // ── Connection Registry ───────────────────────────────────────────────

    pub fn register_client(&self, room_id: &str, user_id: &str, sender: ClientSender) {
        tracing::info!(room_id = room_id, user_id = user_id, "Client registered");
        self.clients
            .insert((room_id.to_string(), user_id.to_string()), sender);
    }

    pub fn unregister_client(&self, room_id: &str, user_id: &str) {
        tracing::info!(room_id = room_id, user_id = user_id, "Client unregistered");
        self.clients
            .remove(&(room_id.to_string(), user_id.to_string()));
    }

    /// Send a message to one online user. Returns true if delivered to
    /// their channel.
    pub fn send_to_user(&self, room_id: &str, user_id: &str, message: ServerMessage) -> bool {
        if let Some(sender) = self
            .clients
            .get(&(room_id.to_string(), user_id.to_string()))
        {
            sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Fan a message out to every online client in a room, the sender
    /// included — clients self-filter by `user_id`. Fan-out order across
    /// clients is unspecified.
    pub fn broadcast(&self, room_id: &str, message: ServerMessage) {
        for entry in self.clients.iter() {
            if entry.key().0 == room_id {
                let _ = entry.value().send(message.clone());
            }
        }
    }

    // ── Chat ──────────────────────────────────────────────────────────────

    /// Accept, filter, and sequence a chat message. The relay is the
    /// single sequencing point per room: insertion order here is the
    /// ordering every client observes.
    pub fn append_chat(
        &self,
        room_id: &str,
        user_id: &str,
        username: &str,
        text: &str,
    ) -> Result<StoredMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Empty);
        }

        let mut room = self
            .rooms
            .get_mut(room_id)
            .filter(|r| r.is_active)
            .ok_or(ChatError::RoomNotFound)?;

        if !room.allow_chat {
            return Err(ChatError::ChatDisabled);
        }

        let now = Utc::now();
        if room
            .participant(user_id)
            .map(|p| p.is_muted(now))
            .unwrap_or(false)
        {
            return Err(ChatError::Muted);
        }

        let lowered = text.to_lowercase();
        if let Some(word) = room
            .banned_words
            .iter()
            .find(|w| lowered.contains(w.as_str()))
        {
            return Err(ChatError::BannedWord(word.clone()));
        }

        let stored = StoredMessage {
            message_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            message: text.to_string(),
            created_at: now,
        };

        if room.messages.len() >= self.config.max_messages_per_room {
            room.messages.pop_front();
        }
        room.messages.push_back(stored.clone());
        room.last_activity = now;

        Ok(stored)
    }

    /// Remove a chat message by identifier. Allowed for the room creator
    /// and for the message's author. Returns the removed message.
    pub fn delete_message(
        &self,
        room_id: &str,
        actor_id: &str,
        message_id: &str,
    ) -> Result<StoredMessage, ModError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(ModError::RoomNotFound)?;

        let idx = room
            .messages
            .iter()
            .position(|m| m.message_id == message_id)
            .ok_or(ModError::TargetNotFound)?;

        let is_author = room.messages[idx].user_id == actor_id;
        if room.creator_id != actor_id && !is_author {
            return Err(ModError::PermissionDenied);
        }

        room.messages.remove(idx).ok_or(ModError::TargetNotFound)
    }

    // ── Playback ──────────────────────────────────────────────────────────

    /// Record an accepted control message as the room's canonical
    /// playback state.
    pub fn record_video_control(
        &self,
        room_id: &str,
        action: VideoAction,
        timestamp: f64,
        url: Option<&str>,
    ) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            let now = Utc::now();
            match action {
                VideoAction::Load => {
                    if let Some(url) = url {
                        room.playback.url = Some(url.to_string());
                    }
                    room.playback.playing = false;
                    room.playback.position = 0.0;
                }
                VideoAction::Play => {
                    room.playback.playing = true;
                    room.playback.position = timestamp;
                }
                VideoAction::Pause => {
                    room.playback.playing = false;
                    room.playback.position = timestamp;
                }
                VideoAction::Sync => {
                    room.playback.position = timestamp;
                }
            }
            room.playback.updated_at = now;
            room.last_activity = now;
        }
    }

    // ── Screen Share ──────────────────────────────────────────────────────

    /// Begin a screen-share session for a user, ending any session they
    /// already had. Returns the new session ID.
    pub fn start_share(&self, room_id: &str, user_id: &str) -> Result<String, ChatError> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .filter(|r| r.is_active)
            .ok_or(ChatError::RoomNotFound)?;

        if !room.allow_screen_share {
            return Err(ChatError::ChatDisabled);
        }

        let session_id = Uuid::new_v4().to_string();
        room.share = Some(ShareSession {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            started_at: Utc::now(),
        });
        Ok(session_id)
    }

    /// End a user's screen-share session if one is active. Returns true
    /// if a session was ended.
    pub fn end_share(&self, room_id: &str, user_id: &str) -> bool {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            if room.share.as_ref().map(|s| s.user_id == user_id).unwrap_or(false) {
                room.share = None;
                return true;
            }
        }
        false
    }

    // ── Moderation ────────────────────────────────────────────────────────

    fn check_actor(
        room: &Room,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), ModError> {
        if room.creator_id != actor_id {
            return Err(ModError::PermissionDenied);
        }
        if actor_id == target_id {
            return Err(ModError::CannotTargetSelf);
        }
        Ok(())
    }

    /// Kick a user: their participant record is removed entirely, so they
    /// may rejoin later. Returns the target's username.
    pub fn kick(&self, room_id: &str, actor_id: &str, target_id: &str) -> Result<String, ModError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(ModError::RoomNotFound)?;
        Self::check_actor(&room, actor_id, target_id)?;

        let idx = room
            .participants
            .iter()
            .position(|p| p.user_id == target_id)
            .ok_or(ModError::TargetNotFound)?;
        let username = room.participants.remove(idx).username;

        tracing::info!(room_id = room_id, target = target_id, "User kicked");
        Ok(username)
    }

    /// Permanently ban a user. The record is kept (marked banned and
    /// offline) so reconnects are refused with the ban close code.
    pub fn ban(&self, room_id: &str, actor_id: &str, target_id: &str) -> Result<String, ModError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(ModError::RoomNotFound)?;
        Self::check_actor(&room, actor_id, target_id)?;

        let p = room
            .participant_mut(target_id)
            .ok_or(ModError::TargetNotFound)?;
        p.is_banned = true;
        p.is_online = false;
        let username = p.username.clone();

        tracing::info!(room_id = room_id, target = target_id, "User banned");
        Ok(username)
    }

    pub fn unban(&self, room_id: &str, actor_id: &str, target_id: &str) -> Result<String, ModError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(ModError::RoomNotFound)?;
        Self::check_actor(&room, actor_id, target_id)?;

        let p = room
            .participant_mut(target_id)
            .ok_or(ModError::TargetNotFound)?;
        p.is_banned = false;
        Ok(p.username.clone())
    }

    /// Mute a user for `duration_minutes`. Returns the target's username.
    pub fn mute(
        &self,
        room_id: &str,
        actor_id: &str,
        target_id: &str,
        duration_minutes: i64,
    ) -> Result<String, ModError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(ModError::RoomNotFound)?;
        Self::check_actor(&room, actor_id, target_id)?;

        let p = room
            .participant_mut(target_id)
            .ok_or(ModError::TargetNotFound)?;
        p.muted_until = Some(Utc::now() + Duration::minutes(duration_minutes));
        Ok(p.username.clone())
    }

    pub fn unmute(
        &self,
        room_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<String, ModError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(ModError::RoomNotFound)?;
        Self::check_actor(&room, actor_id, target_id)?;

        let p = room
            .participant_mut(target_id)
            .ok_or(ModError::TargetNotFound)?;
        p.muted_until = None;
        Ok(p.username.clone())
    }

    /// Add a word to the room's chat filter. Creator-only. Returns false
    /// if the word was already present.
    pub fn add_banned_word(
        &self,
        room_id: &str,
        actor_id: &str,
        word: &str,
    ) -> Result<bool, ModError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(ModError::RoomNotFound)?;
        if room.creator_id != actor_id {
            return Err(ModError::PermissionDenied);
        }
        Ok(room.banned_words.insert(word.trim().to_lowercase()))
    }

    pub fn remove_banned_word(
        &self,
        room_id: &str,
        actor_id: &str,
        word: &str,
    ) -> Result<bool, ModError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(ModError::RoomNotFound)?;
        if room.creator_id != actor_id {
            return Err(ModError::PermissionDenied);
        }
        Ok(room.banned_words.remove(&word.trim().to_lowercase()))
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    /// Build the membership/playback snapshot delivered on (re)connect.
    /// Banned participants are not visible; banned words are only shown
    /// to the room creator.
    pub fn snapshot(&self, room_id: &str, requester_id: &str) -> Option<ServerMessage> {
        let room = self.rooms.get(room_id)?;
        let now = Utc::now();

        let participants: Vec<ParticipantInfo> = room
            .participants
            .iter()
            .filter(|p| !p.is_banned)
            .map(|p| ParticipantInfo {
                user_id: p.user_id.clone(),
                username: p.username.clone(),
                is_online: p.is_online,
                is_creator: p.is_creator,
                is_muted: p.is_muted(now),
                is_banned: false,
            })
            .collect();

        let banned_words = if room.creator_id == requester_id {
            let mut words: Vec<String> = room.banned_words.iter().cloned().collect();
            words.sort();
            words
        } else {
            Vec::new()
        };

        let history_start = room
            .messages
            .len()
            .saturating_sub(self.config.snapshot_history);
        let messages: Vec<ChatHistoryEntry> = room
            .messages
            .iter()
            .skip(history_start)
            .map(StoredMessage::to_history_entry)
            .collect();

        Some(ServerMessage::RoomState {
            room_id: room.room_id.clone(),
            room_name: room.name.clone(),
            creator_id: room.creator_id.clone(),
            participants,
            playback: PlaybackSnapshot {
                url: room.playback.url.clone(),
                playing: room.playback.playing,
                position: room.playback.position,
                updated_at: room.playback.updated_at.timestamp_millis() as f64 / 1000.0,
            },
            banned_words,
            messages,
        })
    }

    // ── Stats & Cleanup ───────────────────────────────────────────────────

    pub fn online_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.iter().filter(|r| r.is_active).count()
    }

    /// Expire lapsed mutes and deactivate rooms that have been empty past
    /// the idle TTL. Called periodically by the cleanup task.
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let mut expired_mutes = 0usize;
        let mut idle_rooms = 0usize;

        for mut room in self.rooms.iter_mut() {
            for p in room.participants.iter_mut() {
                if p.muted_until.map(|until| until <= now).unwrap_or(false) {
                    p.muted_until = None;
                    expired_mutes += 1;
                }
            }

            let idle_for = now - room.last_activity;
            if room.is_active
                && room.online_count() == 0
                && idle_for.num_seconds() > self.config.room_idle_ttl_secs
            {
                room.is_active = false;
                idle_rooms += 1;
            }
        }

        if expired_mutes > 0 {
            tracing::debug!(count = expired_mutes, "Expired lapsed mutes");
        }
        if idle_rooms > 0 {
            tracing::debug!(count = idle_rooms, "Deactivated idle rooms");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> RelayState {
        RelayState::new(RelayConfig {
            port: 8080,
            max_messages_per_room: 5,
            snapshot_history: 3,
            room_idle_ttl_secs: 60,
        })
    }

    fn room_with_creator(state: &RelayState) -> String {
        let room_id = state.create_room("movie night", "alice", true, true);
        state.admit(&room_id, "alice", "alice").unwrap();
        room_id
    }

    #[test]
    fn test_admit_unknown_room() {
        let state = test_state();
        assert_eq!(
            state.admit("nope", "bob", "bob"),
            Err(AdmitError::RoomNotFound)
        );
    }

    #[test]
    fn test_admit_marks_online_and_is_idempotent() {
        let state = test_state();
        let room_id = room_with_creator(&state);

        state.admit(&room_id, "bob", "bob").unwrap();
        state.admit(&room_id, "bob", "bob").unwrap();

        let room = state.rooms.get(&room_id).unwrap();
        assert_eq!(room.participants.len(), 2);
        assert_eq!(room.online_count(), 2);
    }

    #[test]
    fn test_offline_participant_survives() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();

        state.mark_offline(&room_id, "bob");
        let room = state.rooms.get(&room_id).unwrap();
        assert_eq!(room.online_count(), 1);
        assert_eq!(room.participants.len(), 2);
    }

    #[test]
    fn test_banned_user_refused_admission() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();

        state.ban(&room_id, "alice", "bob").unwrap();
        assert_eq!(state.admit(&room_id, "bob", "bob"), Err(AdmitError::Banned));

        state.unban(&room_id, "alice", "bob").unwrap();
        assert!(state.admit(&room_id, "bob", "bob").is_ok());
    }

    #[test]
    fn test_chat_sequencing_and_bound() {
        let state = test_state();
        let room_id = room_with_creator(&state);

        for i in 0..7 {
            state
                .append_chat(&room_id, "alice", "alice", &format!("msg-{}", i))
                .unwrap();
        }

        let room = state.rooms.get(&room_id).unwrap();
        assert_eq!(room.messages.len(), 5);
        assert_eq!(room.messages.front().unwrap().message, "msg-2");
    }

    #[test]
    fn test_chat_rejects_empty_and_muted() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();

        assert_eq!(
            state.append_chat(&room_id, "bob", "bob", "   "),
            Err(ChatError::Empty)
        );

        state.mute(&room_id, "alice", "bob", 5).unwrap();
        assert_eq!(
            state.append_chat(&room_id, "bob", "bob", "hello"),
            Err(ChatError::Muted)
        );

        state.unmute(&room_id, "alice", "bob").unwrap();
        assert!(state.append_chat(&room_id, "bob", "bob", "hello").is_ok());
    }

    #[test]
    fn test_banned_word_rejection_is_case_insensitive() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.add_banned_word(&room_id, "alice", "Spoiler").unwrap();

        let result = state.append_chat(&room_id, "alice", "alice", "big SPOILER ahead");
        assert_eq!(result, Err(ChatError::BannedWord("spoiler".to_string())));
    }

    #[test]
    fn test_banned_word_crud_is_creator_only() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();

        assert_eq!(
            state.add_banned_word(&room_id, "bob", "x"),
            Err(ModError::PermissionDenied)
        );
        assert!(state.add_banned_word(&room_id, "alice", "x").unwrap());
        assert!(!state.add_banned_word(&room_id, "alice", "x").unwrap());
        assert!(state.remove_banned_word(&room_id, "alice", "x").unwrap());
    }

    #[test]
    fn test_delete_message_permissions() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();
        state.admit(&room_id, "carol", "carol").unwrap();

        let stored = state.append_chat(&room_id, "bob", "bob", "hello").unwrap();

        // A third party may not delete someone else's message.
        assert_eq!(
            state.delete_message(&room_id, "carol", &stored.message_id),
            Err(ModError::PermissionDenied)
        );

        // The author may.
        let removed = state
            .delete_message(&room_id, "bob", &stored.message_id)
            .unwrap();
        assert_eq!(removed.message, "hello");

        // Already gone.
        assert_eq!(
            state.delete_message(&room_id, "alice", &stored.message_id),
            Err(ModError::TargetNotFound)
        );
    }

    #[test]
    fn test_moderation_requires_creator_and_rejects_self() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();

        assert_eq!(
            state.kick(&room_id, "bob", "alice"),
            Err(ModError::PermissionDenied)
        );
        assert_eq!(
            state.kick(&room_id, "alice", "alice"),
            Err(ModError::CannotTargetSelf)
        );
        assert_eq!(
            state.kick(&room_id, "alice", "nobody"),
            Err(ModError::TargetNotFound)
        );
        assert_eq!(state.kick(&room_id, "alice", "bob").unwrap(), "bob");
    }

    #[test]
    fn test_kicked_user_may_rejoin() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();

        state.kick(&room_id, "alice", "bob").unwrap();
        assert!(state.admit(&room_id, "bob", "bob").is_ok());
    }

    #[test]
    fn test_record_video_control() {
        let state = test_state();
        let room_id = room_with_creator(&state);

        state.record_video_control(
            &room_id,
            VideoAction::Load,
            0.0,
            Some("https://youtu.be/dQw4w9WgXcQ"),
        );
        state.record_video_control(&room_id, VideoAction::Play, 12.5, None);

        let room = state.rooms.get(&room_id).unwrap();
        assert!(room.playback.playing);
        assert_eq!(room.playback.position, 12.5);
        assert_eq!(
            room.playback.url.as_deref(),
            Some("https://youtu.be/dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_share_session_replaced_and_ended() {
        let state = test_state();
        let room_id = room_with_creator(&state);

        let first = state.start_share(&room_id, "alice").unwrap();
        let second = state.start_share(&room_id, "alice").unwrap();
        assert_ne!(first, second);

        assert!(state.end_share(&room_id, "alice"));
        assert!(!state.end_share(&room_id, "alice"));
    }

    #[test]
    fn test_snapshot_hides_banned_and_limits_history() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();
        state.ban(&room_id, "alice", "bob").unwrap();
        state.add_banned_word(&room_id, "alice", "spoiler").unwrap();

        for i in 0..5 {
            state
                .append_chat(&room_id, "alice", "alice", &format!("m{}", i))
                .unwrap();
        }

        match state.snapshot(&room_id, "alice").unwrap() {
            ServerMessage::RoomState {
                participants,
                banned_words,
                messages,
                ..
            } => {
                assert_eq!(participants.len(), 1);
                assert_eq!(participants[0].user_id, "alice");
                assert_eq!(banned_words, vec!["spoiler".to_string()]);
                assert_eq!(messages.len(), 3);
                assert_eq!(messages[0].message, "m2");
            }
            _ => panic!("Expected RoomState"),
        }

        // Non-creators never see the word list.
        match state.snapshot(&room_id, "carol").unwrap() {
            ServerMessage::RoomState { banned_words, .. } => assert!(banned_words.is_empty()),
            _ => panic!("Expected RoomState"),
        }
    }

    #[test]
    fn test_cleanup_expires_mutes() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        state.admit(&room_id, "bob", "bob").unwrap();
        state.mute(&room_id, "alice", "bob", -1).unwrap();

        state.cleanup_expired();

        let room = state.rooms.get(&room_id).unwrap();
        assert!(room.participant("bob").unwrap().muted_until.is_none());
    }

    #[test]
    fn test_send_to_offline_user_returns_false() {
        let state = test_state();
        let room_id = room_with_creator(&state);
        assert!(!state.send_to_user(&room_id, "ghost", ServerMessage::Pong { client_time: 0 }));
    }

    #[test]
    fn test_broadcast_reaches_room_members_only() {
        let state = test_state();
        let room_a = room_with_creator(&state);
        let room_b = state.create_room("other", "zed", true, true);

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.register_client(&room_a, "alice", tx_a);
        state.register_client(&room_b, "zed", tx_b);

        state.broadcast(&room_a, ServerMessage::Pong { client_time: 7 });

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
