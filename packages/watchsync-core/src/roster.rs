//! Participant roster.
//!
//! Keyed by user id and updated idempotently: presence messages and
//! snapshots may arrive in any order or more than once, and reapplying
//! them must not change the outcome. The online count is always derived
//! from the set, never tracked separately.

use std::collections::HashMap;

use crate::protocol::ParticipantInfo;

/// One known member of the room.
#[derive(Debug, Clone)]
pub struct Member {
    pub user_id: String,
    pub username: String,
    pub is_online: bool,
    pub is_creator: bool,
    pub is_muted: bool,
}

/// The session's view of room membership.
#[derive(Debug, Default)]
pub struct Roster {
    members: HashMap<String, Member>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a snapshot's participant list.
    pub fn apply_snapshot(&mut self, participants: &[ParticipantInfo]) {
        self.members.clear();
        for p in participants {
            self.members.insert(
                p.user_id.clone(),
                Member {
                    user_id: p.user_id.clone(),
                    username: p.username.clone(),
                    is_online: p.is_online,
                    is_creator: p.is_creator,
                    is_muted: p.is_muted,
                },
            );
        }
    }

    /// Mark a user online, inserting them if unknown. Idempotent.
    pub fn user_joined(&mut self, user_id: &str, username: &str) {
        self.members
            .entry(user_id.to_string())
            .and_modify(|m| {
                m.is_online = true;
                m.username = username.to_string();
            })
            .or_insert_with(|| Member {
                user_id: user_id.to_string(),
                username: username.to_string(),
                is_online: true,
                is_creator: false,
                is_muted: false,
            });
    }

    /// Mark a user offline. Unknown users are ignored.
    pub fn user_left(&mut self, user_id: &str) {
        if let Some(m) = self.members.get_mut(user_id) {
            m.is_online = false;
        }
    }

    /// Remove a user entirely (kick or ban). Idempotent.
    pub fn remove(&mut self, user_id: &str) {
        self.members.remove(user_id);
    }

    pub fn set_muted(&mut self, user_id: &str, muted: bool) {
        if let Some(m) = self.members.get_mut(user_id) {
            m.is_muted = muted;
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&Member> {
        self.members.get(user_id)
    }

    /// Derived from the set — duplicate join/leave delivery cannot
    /// drift it.
    pub fn online_count(&self) -> usize {
        self.members.values().filter(|m| m.is_online).count()
    }

    /// All members, sorted by username for stable display.
    pub fn members(&self) -> Vec<&Member> {
        let mut out: Vec<&Member> = self.members.values().collect();
        out.sort_by(|a, b| a.username.cmp(&b.username));
        out
    }
}
