//! Silence detection for the input stream.
//!
//! The window re-arms as soon as it fires, so a long outage produces one
//! alert per elapsed window rather than one per outage.

use std::time::Duration;

use tokio::time::Instant;

/// Idle time after which the stream is considered silent. Fixed, not configurable.
pub const SILENCE_WINDOW: Duration = Duration::from_secs(5);

/// Watchdog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// No overdue silence.
    Quiet,
    /// A silence alert fired and no line has arrived since.
    Alerted,
}

/// Emitted when the stream has been idle for longer than [`SILENCE_WINDOW`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceTimeout {
    /// Idle time measured when the alert fired.
    pub idle: Duration,
}

/// Tracks time since the last received line.
#[derive(Debug, Clone)]
pub struct SilenceWatchdog {
    last_received: Instant,
    state: WatchdogState,
}

impl SilenceWatchdog {
    /// Start watching with `now` as the last receipt.
    pub fn new(now: Instant) -> Self {
        Self {
            last_received: now,
            state: WatchdogState::Quiet,
        }
    }

    /// Current state.
    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Instant of the last receipt or re-arm.
    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    /// A line arrived, readable or not.
    pub fn record_receipt(&mut self, now: Instant) {
        self.last_received = now;
        self.state = WatchdogState::Quiet;
    }

    /// Evaluate on a poll that produced no line.
    ///
    /// Fires when strictly more than [`SILENCE_WINDOW`] has passed, then
    /// re-arms the window from `now`.
    pub fn check(&mut self, now: Instant) -> Option<SilenceTimeout> {
        let idle = now.saturating_duration_since(self.last_received);
        if idle <= SILENCE_WINDOW {
            return None;
        }
        self.last_received = now;
        self.state = WatchdogState::Alerted;
        Some(SilenceTimeout { idle })
    }
}
