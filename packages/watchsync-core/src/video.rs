//! Video source classification and playback synchronization.
//!
//! Source classification accepts the URL shapes people actually paste:
//! bare YouTube ids, every common YouTube URL form, Vimeo numeric
//! paths, and direct media files.
//!
//! The sync engine applies remote playback controls to a [`Player`]
//! behind two protections:
//!
//! - **Latency adjustment**: play and seek targets are advanced by the
//!   message's measured transit delay so everyone lands on the same
//!   wall-clock moment. Pauses use the sender's raw position — a pause
//!   freezes a frame, it doesn't chase one.
//! - **Echo guard**: applying a control opens a 100ms window during
//!   which further remote controls are held rather than applied, so
//!   the player events fired by our own programmatic change can't
//!   rebroadcast and ping-pong between clients. A held control is
//!   coalesced latest-wins and applied when the window closes.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::protocol::VideoAction;

/// Milliseconds the echo guard stays active after applying a control.
pub const ECHO_WINDOW_MS: i64 = 100;

// ── Source Classification ─────────────────────────────────────────────────────

/// A playable video source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    YouTube { id: String },
    Vimeo { id: String },
    Direct { url: String },
}

/// File extensions treated as directly playable.
const DIRECT_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".ogg", ".mov"];

fn is_youtube_id(s: &str) -> bool {
    s.len() == 11
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// First value of a query parameter, if present.
fn query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    for pair in query.split('&') {
        let (k, v) = pair.split_once('=')?;
        if k == key && !v.is_empty() {
            return Some(v.to_string());
        }
    }
    None
}

/// Segment following a path marker, cut at the next delimiter.
fn path_segment_after<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    let start = url.find(marker)? + marker.len();
    let tail = &url[start..];
    let end = tail
        .find(|c| c == '?' || c == '&' || c == '/' || c == '#')
        .unwrap_or(tail.len());
    let segment = &tail[..end];
    if segment.is_empty() {
        None
    } else {
        Some(segment)
    }
}

/// Extract a YouTube video id from any of the accepted URL shapes:
/// a bare 11-character id, `watch?v=`, `youtu.be/<id>`, `/embed/<id>`,
/// `/shorts/<id>`, the `vi=` parameter, or an id as the trailing path
/// segment.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if is_youtube_id(input) {
        return Some(input.to_string());
    }

    if !input.contains("youtube.com") && !input.contains("youtu.be") {
        return None;
    }

    for key in ["v", "vi"] {
        if let Some(value) = query_param(input, key) {
            if is_youtube_id(&value) {
                return Some(value);
            }
        }
    }

    for marker in ["youtu.be/", "/embed/", "/shorts/"] {
        if let Some(segment) = path_segment_after(input, marker) {
            if is_youtube_id(segment) {
                return Some(segment.to_string());
            }
        }
    }

    // Fallback: trailing path segment that looks like an id.
    let no_query = input.split(['?', '#']).next().unwrap_or(input);
    let tail = no_query.rsplit('/').next().unwrap_or("");
    if is_youtube_id(tail) {
        return Some(tail.to_string());
    }

    None
}

/// Classify a URL into a playable source, or None if unsupported.
pub fn classify(url: &str) -> Option<VideoSource> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if let Some(id) = extract_video_id(url) {
        return Some(VideoSource::YouTube { id });
    }

    if url.contains("vimeo.com/") {
        if let Some(segment) = path_segment_after(url, "vimeo.com/") {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                return Some(VideoSource::Vimeo {
                    id: segment.to_string(),
                });
            }
        }
        return None;
    }

    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    if DIRECT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return Some(VideoSource::Direct {
            url: url.to_string(),
        });
    }

    None
}

pub fn is_valid_video_url(url: &str) -> bool {
    classify(url).is_some()
}

// ── Player Seam ───────────────────────────────────────────────────────────────

/// The platform player the engine drives. Position is pulled on demand
/// rather than tracked in parallel, so the engine can never disagree
/// with the player about where playback is.
pub trait Player {
    fn load(&mut self, source: &VideoSource);
    fn play(&mut self, position: f64);
    fn pause(&mut self, position: f64);
    fn seek(&mut self, position: f64);
    fn position(&self) -> f64;
}

/// Provider readiness of the embedded player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Empty,
    Loading,
    Ready,
    LoadError,
}

// ── Sync Engine ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct PendingControl {
    action: VideoAction,
    timestamp: f64,
    url: Option<String>,
    delay_secs: f64,
}

/// Applies local and remote playback controls to the player.
pub struct SyncEngine {
    state: PlayerState,
    current_url: Option<String>,
    /// Queue of one: a load requested while another is in flight. A
    /// newer request replaces an older queued one.
    pending_load: Option<String>,
    generation: u64,
    guard_until: Option<DateTime<Utc>>,
    held: Option<PendingControl>,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            state: PlayerState::Empty,
            current_url: None,
            pending_load: None,
            generation: 0,
            guard_until: None,
            held: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Request a video load. While a load is already in flight the
    /// request is queued (replacing any earlier queued one) and starts
    /// when the provider reports readiness.
    pub fn request_load(&mut self, url: &str, player: &mut dyn Player) -> Result<()> {
        let source = classify(url).ok_or_else(|| Error::InvalidVideoUrl(url.to_string()))?;

        if self.state == PlayerState::Loading {
            tracing::debug!(url, "Load already in flight, queuing");
            self.pending_load = Some(url.to_string());
            return Ok(());
        }

        self.current_url = Some(url.to_string());
        self.state = PlayerState::Loading;
        player.load(&source);
        Ok(())
    }

    /// The provider finished loading. Starts any queued load.
    pub fn provider_ready(&mut self, player: &mut dyn Player) {
        self.state = PlayerState::Ready;
        if let Some(next) = self.pending_load.take() {
            // Invalid queued URLs were rejected at request time.
            let _ = self.request_load(&next, player);
        }
    }

    /// The provider failed to load. A queued load still gets its turn;
    /// otherwise the failure sticks until the next request.
    pub fn provider_failed(&mut self, player: &mut dyn Player) {
        if let Some(next) = self.pending_load.take() {
            self.state = PlayerState::Empty;
            let _ = self.request_load(&next, player);
        } else {
            self.state = PlayerState::LoadError;
        }
    }

    /// Whether the echo guard is currently holding remote controls.
    pub fn is_suppressing(&self, now: DateTime<Utc>) -> bool {
        self.guard_until.map(|until| now < until).unwrap_or(false)
    }

    /// Monotonic count of applied controls. Each application bumps it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply a remote control. `delay_secs` is the total transit delay
    /// of the message (broker-reported plus our own one-way). If the
    /// echo guard is open the control is held, latest-wins, and applied
    /// when the guard closes.
    pub fn apply_remote(
        &mut self,
        action: VideoAction,
        timestamp: f64,
        url: Option<&str>,
        delay_secs: f64,
        now: DateTime<Utc>,
        player: &mut dyn Player,
    ) {
        if self.is_suppressing(now) {
            tracing::debug!(?action, "Echo guard open, holding control");
            self.held = Some(PendingControl {
                action,
                timestamp,
                url: url.map(str::to_string),
                delay_secs,
            });
            return;
        }
        self.apply_control(action, timestamp, url, delay_secs, now, player);
    }

    /// Release a held control once the guard window has closed.
    pub fn poll(&mut self, now: DateTime<Utc>, player: &mut dyn Player) {
        if self.is_suppressing(now) {
            return;
        }
        if let Some(held) = self.held.take() {
            self.apply_control(
                held.action,
                held.timestamp,
                held.url.as_deref(),
                held.delay_secs,
                now,
                player,
            );
        }
    }

    fn apply_control(
        &mut self,
        action: VideoAction,
        timestamp: f64,
        url: Option<&str>,
        delay_secs: f64,
        now: DateTime<Utc>,
        player: &mut dyn Player,
    ) {
        match action {
            VideoAction::Load => {
                if let Some(url) = url {
                    if let Err(e) = self.request_load(url, player) {
                        tracing::warn!(error = %e, "Remote load rejected");
                        return;
                    }
                }
            }
            VideoAction::Play => {
                player.play(timestamp + delay_secs);
            }
            VideoAction::Pause => {
                // A pause freezes the sender's frame; no delay chase.
                player.pause(timestamp);
            }
            VideoAction::Sync => {
                player.seek(timestamp + delay_secs);
            }
        }

        self.generation += 1;
        self.guard_until = Some(now + Duration::milliseconds(ECHO_WINDOW_MS));
    }
}
