//! Screen-share signaling.
//!
//! Manages the local capture lifecycle and the peer link carrying the
//! shared stream. Media itself never passes through here — the session
//! only shuttles SDP and ICE payloads over the room channel. Platform
//! specifics (display capture, the actual RTC stack) live behind the
//! [`CaptureSource`] / [`PeerLink`] / [`SharePlatform`] seams.

use thiserror::Error;

use crate::error::{Error as CoreError, Result};

// ── Platform Seams ────────────────────────────────────────────────────────────

/// Why screen capture could not start. The distinct reasons matter:
/// each produces a different user-facing notice.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user declined the capture permission prompt
    #[error("Screen share permission was denied.")]
    PermissionDenied,

    /// No shareable display surface exists
    #[error("No screen available to share.")]
    NotFound,

    /// The surface exists but could not be read
    #[error("The screen could not be captured.")]
    Unreadable,

    /// No capture mode satisfied the requested constraints
    #[error("Screen capture constraints could not be satisfied.")]
    Overconstrained,

    /// Anything else the platform reports
    #[error("Screen capture failed: {0}")]
    Other(String),
}

/// An active display capture.
pub trait CaptureSource {
    /// Stop the capture and release the underlying tracks. Must be
    /// idempotent.
    fn stop(&mut self);
}

/// One peer connection carrying the shared stream.
pub trait PeerLink {
    /// Produce an SDP offer for the attached capture.
    fn create_offer(&mut self) -> Result<String>;

    /// Apply a remote offer and produce the SDP answer.
    fn apply_offer(&mut self, sdp: &str) -> Result<String>;

    /// Apply a remote answer to our outstanding offer.
    fn apply_answer(&mut self, sdp: &str) -> Result<()>;

    /// Add a remote ICE candidate.
    fn add_ice_candidate(
        &mut self,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u32>,
    ) -> Result<()>;

    /// Tear the connection down. Must be idempotent.
    fn close(&mut self);
}

/// Factory for platform capture and RTC primitives.
pub trait SharePlatform {
    /// Prompt for and open a display capture.
    fn open_capture(&mut self) -> std::result::Result<Box<dyn CaptureSource>, CaptureError>;

    /// Create a fresh peer connection. `with_capture` attaches the
    /// local capture's tracks (presenter side).
    fn create_link(&mut self, with_capture: bool) -> Box<dyn PeerLink>;
}

// ── Share Manager ─────────────────────────────────────────────────────────────

/// Current share role of this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareRole {
    Idle,
    /// We are presenting.
    Presenting,
    /// Someone else is presenting.
    Viewing { user_id: String, username: String },
}

/// Screen-share state machine for one session.
pub struct ShareManager {
    role: ShareRole,
    capture: Option<Box<dyn CaptureSource>>,
    link: Option<Box<dyn PeerLink>>,
}

impl Default for ShareManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareManager {
    pub fn new() -> Self {
        Self {
            role: ShareRole::Idle,
            capture: None,
            link: None,
        }
    }

    pub fn role(&self) -> &ShareRole {
        &self.role
    }

    pub fn is_presenting(&self) -> bool {
        self.role == ShareRole::Presenting
    }

    /// Start presenting. Opens the capture, builds the peer link, and
    /// returns the SDP offer to broadcast. Capture failures surface
    /// their specific reason.
    pub fn start(&mut self, platform: &mut dyn SharePlatform) -> Result<String> {
        // Restarting while already presenting replaces the session.
        self.teardown();

        let capture = platform
            .open_capture()
            .map_err(|e| CoreError::CaptureFailed(e.to_string()))?;
        let mut link = platform.create_link(true);
        let offer = link.create_offer()?;

        self.capture = Some(capture);
        self.link = Some(link);
        self.role = ShareRole::Presenting;
        tracing::info!("Screen share started");
        Ok(offer)
    }

    /// Stop whatever is active. Idempotent: stopping twice, or stopping
    /// a share that already ended remotely, is a no-op. Returns true if
    /// we were presenting.
    pub fn stop(&mut self) -> bool {
        let was_presenting = self.is_presenting();
        self.teardown();
        if was_presenting {
            tracing::info!("Screen share stopped");
        }
        was_presenting
    }

    fn teardown(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        self.role = ShareRole::Idle;
    }

    /// The capture track ended on its own (the user hit the browser's
    /// or OS's own stop control). Returns true if a stop announcement
    /// should go out.
    pub fn on_track_ended(&mut self) -> bool {
        self.stop()
    }

    /// A remote participant announced a share. We become a viewer and
    /// wait for their offer.
    pub fn on_remote_started(&mut self, user_id: &str, username: &str) {
        // Their share supersedes anything we had as viewer.
        if !self.is_presenting() {
            self.teardown();
            self.role = ShareRole::Viewing {
                user_id: user_id.to_string(),
                username: username.to_string(),
            };
        }
    }

    /// The remote share ended. Idempotent.
    pub fn on_remote_ended(&mut self, user_id: &str) {
        if let ShareRole::Viewing { user_id: ref presenter, .. } = self.role {
            if presenter == user_id {
                self.teardown();
            }
        }
    }

    /// A presenter's offer arrived. Builds the viewing link and returns
    /// the answer to send back, targeted at the presenter.
    pub fn on_offer(&mut self, platform: &mut dyn SharePlatform, sdp: &str) -> Result<String> {
        if self.is_presenting() {
            // Two simultaneous presenters: the relay tracks one session
            // per user, so just ignore the competing offer.
            return Err(CoreError::ProtocolError(
                "Received an offer while presenting".to_string(),
            ));
        }
        let mut link = platform.create_link(false);
        let answer = link.apply_offer(sdp)?;
        self.link = Some(link);
        Ok(answer)
    }

    /// A viewer's answer to our offer arrived.
    pub fn on_answer(&mut self, sdp: &str) -> Result<()> {
        match self.link.as_mut() {
            Some(link) => link.apply_answer(sdp),
            None => {
                // Stale answer after teardown; nothing to apply.
                tracing::debug!("Dropping answer with no active link");
                Ok(())
            }
        }
    }

    /// A remote ICE candidate arrived. Candidates can race ahead of the
    /// offer that creates the link; without a link they are dropped.
    pub fn on_ice_candidate(
        &mut self,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u32>,
    ) -> Result<()> {
        match self.link.as_mut() {
            Some(link) => link.add_ice_candidate(candidate, sdp_mid, sdp_mline_index),
            None => {
                tracing::debug!("Dropping ICE candidate with no active link");
                Ok(())
            }
        }
    }
}
