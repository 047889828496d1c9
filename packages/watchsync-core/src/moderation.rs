//! Moderation REST client.
//!
//! Moderation actions go over HTTP rather than the room channel so
//! they get individual success/failure responses — a rejected kick
//! must tell the acting user why instead of silently vanishing into
//! the broadcast stream. The relay pushes the resulting room updates
//! to everyone over the channel; this client never mutates local state
//! on its own.

use serde::Deserialize;

use crate::error::{Error, Result};

/// One moderation action against a room member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Kick,
    Ban,
    Unban,
    Mute,
    Unmute,
}

impl UserAction {
    fn path_segment(&self) -> &'static str {
        match self {
            UserAction::Kick => "kick",
            UserAction::Ban => "ban",
            UserAction::Unban => "unban",
            UserAction::Mute => "mute",
            UserAction::Unmute => "unmute",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModResponse {
    #[allow(dead_code)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the relay's moderation endpoints. The acting user's
/// identity travels in the `X-User-Id` header; the relay decides
/// whether they are allowed.
pub struct ModerationClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
}

impl ModerationClient {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        }
    }

    /// URL for a user-targeted action.
    fn user_action_url(&self, room_id: &str, target_id: &str, action: UserAction) -> String {
        format!(
            "{}/rooms/{}/users/{}/{}",
            self.base_url,
            room_id,
            target_id,
            action.path_segment()
        )
    }

    /// Perform a user-targeted action with no body.
    pub async fn user_action(
        &self,
        room_id: &str,
        target_id: &str,
        action: UserAction,
    ) -> Result<()> {
        let url = self.user_action_url(room_id, target_id, action);
        let response = self
            .http
            .post(&url)
            .header("X-User-Id", &self.user_id)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::interpret(response).await
    }

    /// Mute a user for a number of minutes.
    pub async fn mute(&self, room_id: &str, target_id: &str, duration_minutes: i64) -> Result<()> {
        let url = self.user_action_url(room_id, target_id, UserAction::Mute);
        let response = self
            .http
            .post(&url)
            .header("X-User-Id", &self.user_id)
            .json(&serde_json::json!({ "duration_minutes": duration_minutes }))
            .send()
            .await?;
        Self::interpret(response).await
    }

    /// Add a word to the room's chat filter.
    pub async fn add_banned_word(&self, room_id: &str, word: &str) -> Result<()> {
        let url = format!("{}/rooms/{}/banned-words", self.base_url, room_id);
        let response = self
            .http
            .post(&url)
            .header("X-User-Id", &self.user_id)
            .json(&serde_json::json!({ "word": word }))
            .send()
            .await?;
        Self::interpret(response).await
    }

    /// Remove a word from the room's chat filter.
    pub async fn remove_banned_word(&self, room_id: &str, word: &str) -> Result<()> {
        let url = format!("{}/rooms/{}/banned-words/{}", self.base_url, room_id, word);
        let response = self
            .http
            .delete(&url)
            .header("X-User-Id", &self.user_id)
            .send()
            .await?;
        Self::interpret(response).await
    }

    /// Delete a chat message.
    pub async fn delete_message(&self, room_id: &str, message_id: &str) -> Result<()> {
        let url = format!(
            "{}/rooms/{}/messages/{}/delete",
            self.base_url, room_id, message_id
        );
        let response = self
            .http
            .post(&url)
            .header("X-User-Id", &self.user_id)
            .send()
            .await?;
        Self::interpret(response).await
    }

    /// Map the relay's response onto the error taxonomy.
    async fn interpret(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response
            .json::<ModResponse>()
            .await
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| status.to_string());

        Err(classify_failure(status.as_u16(), detail))
    }
}

/// 403 means we lack the creator role. 400 covers both self-targeting
/// and bad parameters (duplicate banned word, non-positive mute
/// duration), distinguished by the relay's error detail.
fn classify_failure(status: u16, detail: String) -> Error {
    match status {
        403 => Error::PermissionDenied,
        400 if detail == "You cannot target yourself" => Error::CannotTargetSelf,
        _ => Error::ModerationFailed(detail),
    }
}
