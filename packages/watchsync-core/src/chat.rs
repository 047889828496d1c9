//! Chat log and typing indicators.
//!
//! Messages are appended in receipt order — the relay is the single
//! sequencing point, so no client-side reordering happens. Appends are
//! deduplicated by message id so a snapshot replay after reconnect
//! cannot double an entry. Deletion is soft: the entry stays in place
//! and is flagged, so ordering is preserved for late joiners.
//!
//! Typing state is deadline-driven against an injected clock: a local
//! typist goes quiet after one second without input, and a remote
//! indicator expires from display after three seconds unless renewed
//! (or cleared early by that user's message arriving).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::protocol::ChatHistoryEntry;

/// Milliseconds of input silence before the local typing flag drops.
pub const TYPING_IDLE_MS: i64 = 1_000;

/// Milliseconds a remote typing indicator stays visible without renewal.
pub const TYPING_DISPLAY_MS: i64 = 3_000;

/// Angle brackets are neutralized before display so a chat message can
/// never smuggle markup.
pub fn escape_message(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

// ── Chat Log ──────────────────────────────────────────────────────────────────

/// One displayed chat entry.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub message_id: String,
    pub user_id: String,
    pub username: String,
    /// Escaped message text.
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub deleted: bool,
}

/// Ordered, deduplicated chat log.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Returns false if the id was already present.
    pub fn append(
        &mut self,
        message_id: &str,
        user_id: &str,
        username: &str,
        message: &str,
        timestamp: i64,
    ) -> bool {
        if self.entries.iter().any(|e| e.message_id == message_id) {
            return false;
        }
        self.entries.push(ChatEntry {
            message_id: message_id.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            message: escape_message(message),
            timestamp,
            deleted: false,
        });
        true
    }

    /// Merge snapshot history. Entries already present are left alone,
    /// so replaying history after a reconnect never duplicates.
    pub fn apply_history(&mut self, history: &[ChatHistoryEntry]) {
        for entry in history {
            self.append(
                &entry.message_id,
                &entry.user_id,
                &entry.username,
                &entry.message,
                entry.timestamp,
            );
        }
    }

    /// Soft-delete an entry by id. Returns false if unknown or already
    /// deleted.
    pub fn delete(&mut self, message_id: &str) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.message_id == message_id && !e.deleted)
        {
            Some(entry) => {
                entry.deleted = true;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Typing State ──────────────────────────────────────────────────────────────

/// What the caller should do after a typing-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// Send a typing-start message to the relay.
    SendStart,
    /// Send a typing-stop message to the relay.
    SendStop,
}

/// Local typing flag plus the remote indicators on display.
#[derive(Debug, Default)]
pub struct TypingState {
    local_typing: bool,
    last_input_at: Option<DateTime<Utc>>,
    remote: HashMap<String, (String, DateTime<Utc>)>,
}

impl TypingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local keystroke. Emits `SendStart` only on the rising
    /// edge — further input while flagged just renews the idle timer.
    pub fn on_local_input(&mut self, now: DateTime<Utc>) -> Option<TypingSignal> {
        self.last_input_at = Some(now);
        if self.local_typing {
            return None;
        }
        self.local_typing = true;
        Some(TypingSignal::SendStart)
    }

    /// Clear the local flag immediately, e.g. when a message is sent.
    pub fn on_local_send(&mut self) -> Option<TypingSignal> {
        self.last_input_at = None;
        if self.local_typing {
            self.local_typing = false;
            return Some(TypingSignal::SendStop);
        }
        None
    }

    /// Apply a remote typing indicator. Returns true if the display set
    /// changed.
    pub fn on_remote_indicator(
        &mut self,
        user_id: &str,
        username: &str,
        is_typing: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if is_typing {
            let expires = now + Duration::milliseconds(TYPING_DISPLAY_MS);
            let was_shown = self.remote.contains_key(user_id);
            self.remote
                .insert(user_id.to_string(), (username.to_string(), expires));
            !was_shown
        } else {
            self.remote.remove(user_id).is_some()
        }
    }

    /// A chat message from this user clears their indicator early.
    pub fn on_remote_message(&mut self, user_id: &str) -> bool {
        self.remote.remove(user_id).is_some()
    }

    /// Advance deadlines. Returns the signal to send for the local flag
    /// (if the idle timeout fired) and whether the remote display set
    /// changed from expiry.
    pub fn poll(&mut self, now: DateTime<Utc>) -> (Option<TypingSignal>, bool) {
        let mut signal = None;
        if self.local_typing {
            let idle = self
                .last_input_at
                .map(|at| now - at >= Duration::milliseconds(TYPING_IDLE_MS))
                .unwrap_or(true);
            if idle {
                self.local_typing = false;
                self.last_input_at = None;
                signal = Some(TypingSignal::SendStop);
            }
        }

        let before = self.remote.len();
        self.remote.retain(|_, (_, expires)| *expires > now);
        (signal, self.remote.len() != before)
    }

    pub fn is_local_typing(&self) -> bool {
        self.local_typing
    }

    /// Usernames currently shown as typing, sorted for stable display.
    pub fn typing_usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.remote.values().map(|(name, _)| name.clone()).collect();
        names.sort();
        names
    }
}
