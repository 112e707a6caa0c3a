use std::time::Duration;

use fifolink_transport::{Radio, RadioMode};
use tracing::{debug, warn};

/// Outcome of one mode-ready poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModePoll {
    /// The requested mode is in effect.
    Ready,
    /// Still waiting on the hardware.
    Pending,
    /// The request went unconfirmed for too long and was issued again.
    Reissued(RadioMode),
}

/// Tracks the requested radio mode and whether the chip has confirmed it.
///
/// Mode changes are never waited on. A request is issued once and
/// confirmation is picked up by [`ModeTracker::poll`] on later iterations.
/// A request that stays unconfirmed past `timeout` is issued again.
#[derive(Debug, Clone)]
pub struct ModeTracker {
    target: RadioMode,
    ready: bool,
    requested_at: Duration,
    timeout: Duration,
}

impl ModeTracker {
    /// A tracker for a radio that has just come up in Idle.
    pub fn new(timeout: Duration) -> Self {
        Self {
            target: RadioMode::Idle,
            ready: true,
            requested_at: Duration::ZERO,
            timeout,
        }
    }

    /// Ask the radio to enter `mode`.
    pub fn request<R: Radio + ?Sized>(&mut self, radio: &mut R, mode: RadioMode, now: Duration) {
        debug!(from = %self.target, to = %mode, "radio mode requested");
        radio.set_mode(mode);
        self.target = mode;
        self.ready = false;
        self.requested_at = now;
    }

    /// Check the hardware for confirmation of the pending request.
    pub fn poll<R: Radio + ?Sized>(&mut self, radio: &mut R, now: Duration) -> ModePoll {
        if self.ready {
            return ModePoll::Ready;
        }
        if radio.mode_ready() {
            self.ready = true;
            return ModePoll::Ready;
        }
        if now.saturating_sub(self.requested_at) >= self.timeout {
            warn!(mode = %self.target, timeout = ?self.timeout, "mode change not confirmed, re-issuing");
            radio.set_mode(self.target);
            self.requested_at = now;
            return ModePoll::Reissued(self.target);
        }
        ModePoll::Pending
    }

    /// The most recently requested mode.
    pub fn target(&self) -> RadioMode {
        self.target
    }

    /// Whether the most recent request has been confirmed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The radio is confirmed to be in `mode`.
    pub fn in_mode(&self, mode: RadioMode) -> bool {
        self.ready && self.target == mode
    }
}
