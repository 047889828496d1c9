//! Watchsync Relay Server
//!
//! A WebSocket relay that keeps a group of viewers in sync:
//!
//! 1. **Room authority**: Holds the canonical state of each room —
//!    participants, mute/ban status, the banned-word filter, and the
//!    current playback state. Clients never trust each other directly.
//!
//! 2. **Playback fan-out**: Rebroadcasts load/play/pause/sync controls
//!    to every participant, stamped with the relay clock so receivers
//!    can compensate for transit delay.
//!
//! 3. **Signaling relay**: Shuttles WebRTC offers/answers/candidates for
//!    screen sharing. The relay never terminates media.
//!
//! 4. **Moderation**: Creator-only REST endpoints for kick/ban/mute and
//!    the banned-word filter, with targeted eviction notices over the
//!    room channel.

mod handler;
mod moderation;
mod protocol;
mod state;

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "watchsync-relay", version, about = "Watchsync room relay server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RELAY_PORT")]
    port: u16,

    /// Maximum retained chat messages per room
    #[arg(long, default_value_t = 500, env = "MAX_MESSAGES_PER_ROOM")]
    max_messages_per_room: usize,

    /// Chat history entries carried in a room snapshot
    #[arg(long, default_value_t = 50, env = "SNAPSHOT_HISTORY")]
    snapshot_history: usize,

    /// Hours an empty room stays active before deactivation
    #[arg(long, default_value_t = 4, env = "ROOM_IDLE_TTL_HOURS")]
    room_idle_ttl_hours: i64,

    /// Cleanup interval in seconds
    #[arg(long, default_value_t = 300, env = "CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchsync_relay=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = RelayConfig {
        port: args.port,
        max_messages_per_room: args.max_messages_per_room,
        snapshot_history: args.snapshot_history,
        room_idle_ttl_secs: args.room_idle_ttl_hours * 3600,
    };

    let state = RelayState::new(config);

    // Spawn periodic cleanup task
    let cleanup_state = state.clone();
    let cleanup_interval = args.cleanup_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval));
        loop {
            interval.tick().await;
            cleanup_state.cleanup_expired();
        }
    });

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws/room/:room_id", get(ws_handler))
        .merge(moderation::routes())
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Watchsync relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for room connections.
///
/// Identity travels as query parameters (`user_id`, `username`); a missing
/// identity is rejected before the upgrade. Admission checks against room
/// state happen after the upgrade so refusals can carry a close code.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    let user_id = params.get("user_id").cloned().unwrap_or_default();
    let username = params.get("username").cloned().unwrap_or_default();

    if user_id.is_empty() || username.is_empty() {
        return axum::http::StatusCode::BAD_REQUEST.into_response();
    }

    ws.on_upgrade(move |socket| {
        handler::handle_websocket(socket, state, room_id, user_id, username)
    })
    .into_response()
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "watchsync-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "active_rooms": state.active_rooms(),
        "online_clients": state.online_clients(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
