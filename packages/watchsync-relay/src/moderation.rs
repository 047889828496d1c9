//! Moderation REST endpoints.
//!
//! Room creation plus creator-only moderation actions: kick, ban, unban,
//! mute, unmute, banned-word management, and message deletion. The acting
//! user is identified by the `X-User-Id` header. Every successful action
//! also emits the corresponding room broadcast, and kick/ban deliver a
//! targeted message telling the affected client to leave.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::protocol::ServerMessage;
use crate::state::{ModError, RelayState};

/// Redirect target delivered with a kick notice.
const KICK_REDIRECT_URL: &str = "/rooms/";

/// Redirect target delivered with a ban notice.
const BAN_REDIRECT_URL: &str = "/rooms/youre-banned/";

pub fn routes() -> Router<RelayState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/:room_id/users/:target_id/kick", post(kick_user))
        .route("/rooms/:room_id/users/:target_id/ban", post(ban_user))
        .route("/rooms/:room_id/users/:target_id/unban", post(unban_user))
        .route("/rooms/:room_id/users/:target_id/mute", post(mute_user))
        .route("/rooms/:room_id/users/:target_id/unmute", post(unmute_user))
        .route("/rooms/:room_id/banned-words", post(add_banned_word))
        .route("/rooms/:room_id/banned-words/:word", delete(remove_banned_word))
        .route(
            "/rooms/:room_id/messages/:message_id/delete",
            post(delete_message),
        )
}

// ── Request / Response Types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub creator_id: String,
    #[serde(default = "default_true")]
    pub allow_chat: bool,
    #[serde(default = "default_true")]
    pub allow_screen_share: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub success: bool,
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    #[serde(default = "default_mute_minutes")]
    pub duration_minutes: i64,
}

fn default_mute_minutes() -> i64 {
    5
}

#[derive(Debug, Deserialize)]
pub struct BannedWordRequest {
    pub word: String,
}

#[derive(Debug, Serialize)]
pub struct ModResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModResponse {
    fn ok() -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                error: None,
            }),
        )
    }

    fn err(status: StatusCode, message: &str) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                error: Some(message.to_string()),
            }),
        )
    }
}

fn mod_error_response(e: ModError) -> (StatusCode, Json<ModResponse>) {
    match e {
        ModError::RoomNotFound => ModResponse::err(StatusCode::NOT_FOUND, "Room not found"),
        ModError::PermissionDenied => {
            ModResponse::err(StatusCode::FORBIDDEN, "Only the room creator can do that")
        }
        ModError::CannotTargetSelf => {
            ModResponse::err(StatusCode::BAD_REQUEST, "You cannot target yourself")
        }
        ModError::TargetNotFound => {
            ModResponse::err(StatusCode::NOT_FOUND, "User not found in this room")
        }
    }
}

/// Pull the acting user out of the `X-User-Id` header.
fn actor_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Display name of a room member, falling back to the raw id for users
/// who have no participant record (e.g. an API-only creator).
fn display_name(state: &RelayState, room_id: &str, user_id: &str) -> String {
    state
        .rooms
        .get(room_id)
        .and_then(|room| room.participant(user_id).map(|p| p.username.clone()))
        .unwrap_or_else(|| user_id.to_string())
}

fn room_name(state: &RelayState, room_id: &str) -> String {
    state
        .rooms
        .get(room_id)
        .map(|room| room.name.clone())
        .unwrap_or_default()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// POST /rooms — create a new room.
async fn create_room(
    State(state): State<RelayState>,
    Json(req): Json<CreateRoomRequest>,
) -> axum::response::Response {
    if req.name.trim().is_empty() || req.creator_id.trim().is_empty() {
        return ModResponse::err(StatusCode::BAD_REQUEST, "name and creator_id are required")
            .into_response();
    }

    let room_id = state.create_room(
        req.name.trim(),
        &req.creator_id,
        req.allow_chat,
        req.allow_screen_share,
    );

    (
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            success: true,
            room_id,
        }),
    )
        .into_response()
}

/// POST /rooms/:room_id/users/:target_id/kick
async fn kick_user(
    State(state): State<RelayState>,
    Path((room_id, target_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<ModResponse>) {
    let Some(actor) = actor_id(&headers) else {
        return ModResponse::err(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    let actor_name = display_name(&state, &room_id, &actor);
    let name = room_name(&state, &room_id);

    match state.kick(&room_id, &actor, &target_id) {
        Ok(target_name) => {
            // The targeted notice goes out first; the client closes its
            // own channel once it has shown the overlay.
            state.send_to_user(
                &room_id,
                &target_id,
                ServerMessage::YouWereKicked {
                    room_name: name,
                    kicked_by: actor_name.clone(),
                    redirect_url: Some(KICK_REDIRECT_URL.to_string()),
                },
            );
            state.broadcast(
                &room_id,
                ServerMessage::UserKicked {
                    user_id: target_id,
                    username: target_name,
                    kicked_by: actor_name,
                },
            );
            ModResponse::ok()
        }
        Err(e) => mod_error_response(e),
    }
}

/// POST /rooms/:room_id/users/:target_id/ban
async fn ban_user(
    State(state): State<RelayState>,
    Path((room_id, target_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<ModResponse>) {
    let Some(actor) = actor_id(&headers) else {
        return ModResponse::err(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    let actor_name = display_name(&state, &room_id, &actor);
    let name = room_name(&state, &room_id);

    match state.ban(&room_id, &actor, &target_id) {
        Ok(target_name) => {
            state.send_to_user(
                &room_id,
                &target_id,
                ServerMessage::YouWereBanned {
                    room_name: name,
                    banned_by: actor_name.clone(),
                    redirect_url: Some(BAN_REDIRECT_URL.to_string()),
                },
            );
            state.broadcast(
                &room_id,
                ServerMessage::UserBanned {
                    user_id: target_id,
                    username: target_name,
                    banned_by: actor_name,
                },
            );
            ModResponse::ok()
        }
        Err(e) => mod_error_response(e),
    }
}

/// POST /rooms/:room_id/users/:target_id/unban
async fn unban_user(
    State(state): State<RelayState>,
    Path((room_id, target_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<ModResponse>) {
    let Some(actor) = actor_id(&headers) else {
        return ModResponse::err(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    let actor_name = display_name(&state, &room_id, &actor);

    match state.unban(&room_id, &actor, &target_id) {
        Ok(target_name) => {
            state.broadcast(
                &room_id,
                ServerMessage::UserUnbanned {
                    user_id: target_id,
                    username: target_name,
                    unbanned_by: actor_name,
                },
            );
            ModResponse::ok()
        }
        Err(e) => mod_error_response(e),
    }
}

/// POST /rooms/:room_id/users/:target_id/mute
async fn mute_user(
    State(state): State<RelayState>,
    Path((room_id, target_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<MuteRequest>,
) -> (StatusCode, Json<ModResponse>) {
    let Some(actor) = actor_id(&headers) else {
        return ModResponse::err(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    if req.duration_minutes <= 0 {
        return ModResponse::err(StatusCode::BAD_REQUEST, "duration_minutes must be positive");
    }
    let actor_name = display_name(&state, &room_id, &actor);

    match state.mute(&room_id, &actor, &target_id, req.duration_minutes) {
        Ok(target_name) => {
            state.broadcast(
                &room_id,
                ServerMessage::UserMuted {
                    user_id: target_id,
                    username: target_name,
                    muted_by: actor_name,
                    duration_minutes: req.duration_minutes,
                },
            );
            ModResponse::ok()
        }
        Err(e) => mod_error_response(e),
    }
}

/// POST /rooms/:room_id/users/:target_id/unmute
async fn unmute_user(
    State(state): State<RelayState>,
    Path((room_id, target_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<ModResponse>) {
    let Some(actor) = actor_id(&headers) else {
        return ModResponse::err(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    let actor_name = display_name(&state, &room_id, &actor);

    match state.unmute(&room_id, &actor, &target_id) {
        Ok(target_name) => {
            state.broadcast(
                &room_id,
                ServerMessage::UserUnmuted {
                    user_id: target_id,
                    username: target_name,
                    unmuted_by: actor_name,
                },
            );
            ModResponse::ok()
        }
        Err(e) => mod_error_response(e),
    }
}

/// POST /rooms/:room_id/banned-words
async fn add_banned_word(
    State(state): State<RelayState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BannedWordRequest>,
) -> (StatusCode, Json<ModResponse>) {
    let Some(actor) = actor_id(&headers) else {
        return ModResponse::err(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    if req.word.trim().is_empty() {
        return ModResponse::err(StatusCode::BAD_REQUEST, "word is required");
    }
    let actor_name = display_name(&state, &room_id, &actor);

    match state.add_banned_word(&room_id, &actor, &req.word) {
        Ok(true) => {
            state.broadcast(
                &room_id,
                ServerMessage::BannedWordAdded {
                    word: req.word.trim().to_lowercase(),
                    added_by: actor_name,
                },
            );
            ModResponse::ok()
        }
        Ok(false) => ModResponse::err(StatusCode::BAD_REQUEST, "Word is already banned"),
        Err(e) => mod_error_response(e),
    }
}

/// DELETE /rooms/:room_id/banned-words/:word
async fn remove_banned_word(
    State(state): State<RelayState>,
    Path((room_id, word)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<ModResponse>) {
    let Some(actor) = actor_id(&headers) else {
        return ModResponse::err(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    let actor_name = display_name(&state, &room_id, &actor);

    match state.remove_banned_word(&room_id, &actor, &word) {
        Ok(true) => {
            state.broadcast(
                &room_id,
                ServerMessage::BannedWordRemoved {
                    word: word.trim().to_lowercase(),
                    removed_by: actor_name,
                },
            );
            ModResponse::ok()
        }
        Ok(false) => ModResponse::err(StatusCode::NOT_FOUND, "Word is not banned"),
        Err(e) => mod_error_response(e),
    }
}

/// POST /rooms/:room_id/messages/:message_id/delete
async fn delete_message(
    State(state): State<RelayState>,
    Path((room_id, message_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<ModResponse>) {
    let Some(actor) = actor_id(&headers) else {
        return ModResponse::err(StatusCode::UNAUTHORIZED, "Missing X-User-Id header");
    };
    let actor_name = display_name(&state, &room_id, &actor);

    match state.delete_message(&room_id, &actor, &message_id) {
        Ok(removed) => {
            state.broadcast(
                &room_id,
                ServerMessage::MessageDeleted {
                    message_id: removed.message_id,
                    message_author: removed.username,
                    message_content: removed.message,
                    deleted_by: actor_name,
                },
            );
            ModResponse::ok()
        }
        Err(e) => mod_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RelayConfig;
    use tokio::sync::mpsc::unbounded_channel;

    fn setup() -> (RelayState, String) {
        let state = RelayState::new(RelayConfig::default());
        let room_id = state.create_room("movie night", "alice", true, true);
        state.admit(&room_id, "alice", "alice").unwrap();
        state.admit(&room_id, "bob", "bob").unwrap();
        (state, room_id)
    }

    fn headers_for(user_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", user_id.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_kick_sends_targeted_notice_then_broadcast() {
        let (state, room_id) = setup();
        let (tx_bob, mut rx_bob) = unbounded_channel();
        state.register_client(&room_id, "bob", tx_bob);

        let (status, _) = kick_user(
            State(state.clone()),
            Path((room_id.clone(), "bob".to_string())),
            headers_for("alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let first = rx_bob.try_recv().unwrap();
        match first {
            ServerMessage::YouWereKicked {
                room_name,
                kicked_by,
                redirect_url,
            } => {
                assert_eq!(room_name, "movie night");
                assert_eq!(kicked_by, "alice");
                assert_eq!(redirect_url.as_deref(), Some(KICK_REDIRECT_URL));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
        assert!(matches!(
            rx_bob.try_recv().unwrap(),
            ServerMessage::UserKicked { .. }
        ));
    }

    #[tokio::test]
    async fn test_kick_requires_creator() {
        let (state, room_id) = setup();

        let (status, body) = kick_user(
            State(state),
            Path((room_id, "alice".to_string())),
            headers_for("bob"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!body.0.success);
    }

    #[tokio::test]
    async fn test_kick_self_is_bad_request() {
        let (state, room_id) = setup();

        let (status, _) = kick_user(
            State(state),
            Path((room_id, "alice".to_string())),
            headers_for("alice"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_actor_header_is_unauthorized() {
        let (state, room_id) = setup();

        let (status, _) = kick_user(
            State(state),
            Path((room_id, "bob".to_string())),
            HeaderMap::new(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ban_then_unban_round_trip() {
        let (state, room_id) = setup();
        let (tx_bob, mut rx_bob) = unbounded_channel();
        state.register_client(&room_id, "bob", tx_bob);

        let (status, _) = ban_user(
            State(state.clone()),
            Path((room_id.clone(), "bob".to_string())),
            headers_for("alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(matches!(
            rx_bob.try_recv().unwrap(),
            ServerMessage::YouWereBanned { .. }
        ));

        let (status, _) = unban_user(
            State(state.clone()),
            Path((room_id.clone(), "bob".to_string())),
            headers_for("alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.admit(&room_id, "bob", "bob").is_ok());
    }

    #[tokio::test]
    async fn test_mute_rejects_nonpositive_duration() {
        let (state, room_id) = setup();

        let (status, _) = mute_user(
            State(state),
            Path((room_id, "bob".to_string())),
            headers_for("alice"),
            Json(MuteRequest {
                duration_minutes: 0,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_banned_word_add_duplicate_rejected() {
        let (state, room_id) = setup();

        let (status, _) = add_banned_word(
            State(state.clone()),
            Path(room_id.clone()),
            headers_for("alice"),
            Json(BannedWordRequest {
                word: "Spoiler".to_string(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = add_banned_word(
            State(state),
            Path(room_id),
            headers_for("alice"),
            Json(BannedWordRequest {
                word: "spoiler".to_string(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_message_broadcasts_contents() {
        let (state, room_id) = setup();
        let stored = state
            .append_chat(&room_id, "bob", "bob", "regrettable")
            .unwrap();

        let (tx, mut rx) = unbounded_channel();
        state.register_client(&room_id, "alice", tx);

        let (status, _) = delete_message(
            State(state),
            Path((room_id, stored.message_id.clone())),
            headers_for("alice"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        match rx.try_recv().unwrap() {
            ServerMessage::MessageDeleted {
                message_id,
                message_content,
                deleted_by,
                ..
            } => {
                assert_eq!(message_id, stored.message_id);
                assert_eq!(message_content, "regrettable");
                assert_eq!(deleted_by, "alice");
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }
}
