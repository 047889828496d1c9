//! Connection management.
//!
//! Owns the single logical channel to the relay. Sends are at-most-once:
//! a message sent while disconnected is dropped with a warning, never
//! queued — the snapshot on reconnect re-establishes shared state, and
//! replaying stale controls would fight it.
//!
//! Reconnection backs off linearly (attempt × 2s) and gives up after
//! five attempts. Close codes in the 4001-4005 range are terminal and
//! suppress reconnection entirely: the room is gone, we are banned, or
//! an ejection was already handled.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::protocol::{is_terminal_close_code, ClientMessage};

/// Base backoff step in milliseconds; attempt N waits N × this.
pub const RECONNECT_BASE_MS: i64 = 2_000;

/// Reconnect attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Transport seam. The real implementation wraps a WebSocket writer;
/// tests substitute a recorder.
pub trait ChannelSink {
    fn is_open(&self) -> bool;

    /// Send one text frame.
    fn send(&mut self, frame: &str) -> Result<()>;

    /// Close with an application close code. Must be safe to call on an
    /// already-closed sink.
    fn close(&mut self, code: u16, reason: &str);
}

/// Where the connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected yet.
    Idle,
    Connected,
    /// Waiting out the backoff before the numbered attempt.
    AwaitingRetry { attempt: u32 },
    /// No further reconnects will happen.
    Terminal { code: Option<u16> },
}

/// Manages the room channel and its reconnect policy.
pub struct ConnectionManager {
    sink: Option<Box<dyn ChannelSink>>,
    state: ConnectionState,
    attempts: u32,
    retry_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            sink: None,
            state: ConnectionState::Idle,
            attempts: 0,
            retry_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ConnectionState::Terminal { .. })
    }

    /// A transport connected (or reconnected). Resets the attempt
    /// counter — backoff measures consecutive failures only.
    pub fn attached(&mut self, sink: Box<dyn ChannelSink>) {
        self.sink = Some(sink);
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.retry_at = None;
        tracing::info!("Channel attached");
    }

    /// Send one message, at most once. Not connected means dropped.
    pub fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let frame = serde_json::to_string(message)?;
        match self.sink.as_mut().filter(|s| s.is_open()) {
            Some(sink) => sink.send(&frame),
            None => {
                tracing::warn!("Dropping message, not connected");
                Err(Error::NotConnected)
            }
        }
    }

    /// Close the channel from our side with an application code. Used
    /// for ejection handling; the state goes terminal so no reconnect
    /// follows our own close.
    pub fn close(&mut self, code: u16, reason: &str) {
        if let Some(mut sink) = self.sink.take() {
            sink.close(code, reason);
        }
        self.state = ConnectionState::Terminal { code: Some(code) };
        self.retry_at = None;
    }

    /// The transport reported a close. Decides between scheduling a
    /// reconnect and going terminal.
    pub fn on_closed(&mut self, code: Option<u16>, now: DateTime<Utc>) -> ConnectionState {
        self.sink = None;

        if self.is_terminal() {
            return self.state;
        }

        if let Some(code) = code {
            if is_terminal_close_code(code) {
                tracing::info!(code, "Channel closed with terminal code");
                self.state = ConnectionState::Terminal { code: Some(code) };
                self.retry_at = None;
                return self.state;
            }
        }

        self.attempts += 1;
        if self.attempts > MAX_RECONNECT_ATTEMPTS {
            tracing::warn!("Reconnect attempts exhausted");
            self.state = ConnectionState::Terminal { code: None };
            self.retry_at = None;
        } else {
            let delay = backoff_delay(self.attempts);
            tracing::info!(
                attempt = self.attempts,
                delay_ms = delay.num_milliseconds(),
                "Scheduling reconnect"
            );
            self.retry_at = Some(now + delay);
            self.state = ConnectionState::AwaitingRetry {
                attempt: self.attempts,
            };
        }
        self.state
    }

    /// Whether the backoff has elapsed and the host should attempt a
    /// reconnect now.
    pub fn reconnect_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, ConnectionState::AwaitingRetry { .. })
            && self.retry_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Linear backoff: attempt N waits N × 2 seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::milliseconds(attempt as i64 * RECONNECT_BASE_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CLOSE_BANNED, CLOSE_KICK_HANDLED};
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[derive(Default)]
    struct SinkLog {
        frames: Vec<String>,
        closed_with: Option<u16>,
    }

    struct MockSink {
        log: Rc<RefCell<SinkLog>>,
        open: bool,
    }

    impl MockSink {
        fn new() -> (Box<dyn ChannelSink>, Rc<RefCell<SinkLog>>) {
            let log = Rc::new(RefCell::new(SinkLog::default()));
            (
                Box::new(Self {
                    log: log.clone(),
                    open: true,
                }),
                log,
            )
        }
    }

    impl ChannelSink for MockSink {
        fn is_open(&self) -> bool {
            self.open
        }
        fn send(&mut self, frame: &str) -> crate::error::Result<()> {
            self.log.borrow_mut().frames.push(frame.to_string());
            Ok(())
        }
        fn close(&mut self, code: u16, _reason: &str) {
            self.open = false;
            self.log.borrow_mut().closed_with = Some(code);
        }
    }

    #[test]
    fn test_send_while_disconnected_drops() {
        let mut conn = ConnectionManager::new();
        let result = conn.send(&ClientMessage::TypingStart);
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    fn test_send_goes_through_sink() {
        let mut conn = ConnectionManager::new();
        let (sink, log) = MockSink::new();
        conn.attached(sink);

        conn.send(&ClientMessage::ChatMessage {
            message: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(log.borrow().frames.len(), 1);
        assert!(log.borrow().frames[0].contains("chat_message"));
    }

    #[test]
    fn test_backoff_schedule_is_linear() {
        let delays: Vec<i64> = (1..=5)
            .map(|n| backoff_delay(n).num_milliseconds())
            .collect();
        assert_eq!(delays, vec![2_000, 4_000, 6_000, 8_000, 10_000]);
    }

    #[test]
    fn test_retry_waits_out_backoff() {
        let mut conn = ConnectionManager::new();
        let (sink, _) = MockSink::new();
        conn.attached(sink);

        conn.on_closed(Some(1006), t(0));
        assert_eq!(conn.state(), ConnectionState::AwaitingRetry { attempt: 1 });
        assert!(!conn.reconnect_due(t(1_999)));
        assert!(conn.reconnect_due(t(2_000)));
    }

    #[test]
    fn test_attempts_exhaust_after_five() {
        let mut conn = ConnectionManager::new();
        let (sink, _) = MockSink::new();
        conn.attached(sink);

        let mut now = t(0);
        for attempt in 1..=5 {
            let state = conn.on_closed(Some(1006), now);
            assert_eq!(state, ConnectionState::AwaitingRetry { attempt });
            now = now + backoff_delay(attempt);
        }

        let state = conn.on_closed(Some(1006), now);
        assert_eq!(state, ConnectionState::Terminal { code: None });
        assert!(!conn.reconnect_due(now + Duration::seconds(60)));
    }

    #[test]
    fn test_successful_reconnect_resets_counter() {
        let mut conn = ConnectionManager::new();
        let (sink, _) = MockSink::new();
        conn.attached(sink);

        conn.on_closed(Some(1006), t(0));
        conn.on_closed(Some(1006), t(5_000));

        let (sink, _) = MockSink::new();
        conn.attached(sink);
        assert!(conn.is_connected());

        // The next failure starts back at attempt 1.
        let state = conn.on_closed(Some(1006), t(10_000));
        assert_eq!(state, ConnectionState::AwaitingRetry { attempt: 1 });
    }

    #[test]
    fn test_terminal_close_codes_suppress_reconnect() {
        let mut conn = ConnectionManager::new();
        let (sink, _) = MockSink::new();
        conn.attached(sink);

        let state = conn.on_closed(Some(CLOSE_BANNED), t(0));
        assert_eq!(
            state,
            ConnectionState::Terminal {
                code: Some(CLOSE_BANNED)
            }
        );
        assert!(!conn.reconnect_due(t(60_000)));
    }

    #[test]
    fn test_own_close_is_terminal() {
        let mut conn = ConnectionManager::new();
        let (sink, log) = MockSink::new();
        conn.attached(sink);

        conn.close(CLOSE_KICK_HANDLED, "kick handled");
        assert_eq!(log.borrow().closed_with, Some(CLOSE_KICK_HANDLED));
        assert!(conn.is_terminal());

        // A late transport close notification changes nothing.
        let state = conn.on_closed(Some(1006), t(0));
        assert_eq!(
            state,
            ConnectionState::Terminal {
                code: Some(CLOSE_KICK_HANDLED)
            }
        );
    }
}
