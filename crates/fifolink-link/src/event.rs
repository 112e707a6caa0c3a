use std::collections::VecDeque;

use fifolink_frame::OverrunPolicy;
use fifolink_transport::RadioMode;
use serde::Serialize;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something noteworthy that happened on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A frame was completely written into the radio FIFO.
    FrameSent { seq: u64, padding: usize },
    /// A frame's payload was completely read from the radio FIFO.
    FrameReceived { seq: u64 },
    /// A stream buffer could not take everything offered.
    Overrun { policy: OverrunPolicy, dropped: usize },
    /// A first marker byte was not followed by the second.
    SyncLost,
    /// No frame completed within the link timeout. `partial` is set when a
    /// frame was in progress and has been abandoned.
    LinkTimeout { partial: bool },
    /// A mode change went unconfirmed and was re-issued.
    ModeTimeout { mode: RadioMode },
    /// The radio never reported the last frame as sent.
    DrainTimeout,
}

/// Running counters for one end of a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub padded_frames: u64,
    pub pad_bytes: u64,
    pub bytes_in: u64,
    pub frames_received: u64,
    pub bytes_out: u64,
    pub overruns: u64,
    pub dropped_bytes: u64,
    pub sync_losses: u64,
    pub link_timeouts: u64,
    pub partial_frames: u64,
    pub mode_timeouts: u64,
    pub drain_timeouts: u64,
}

/// Bounded event history plus the counters derived from it.
#[derive(Debug)]
pub struct EventLog {
    stats: LinkStats,
    events: VecDeque<LinkEvent>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    /// Keep at most `capacity` undrained events; older ones are discarded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stats: LinkStats::default(),
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            capacity,
        }
    }

    pub fn record(&mut self, event: LinkEvent) {
        let stats = &mut self.stats;
        match &event {
            LinkEvent::FrameSent { padding, .. } => {
                stats.frames_sent += 1;
                if *padding > 0 {
                    stats.padded_frames += 1;
                    stats.pad_bytes += *padding as u64;
                }
            }
            LinkEvent::FrameReceived { .. } => stats.frames_received += 1,
            LinkEvent::Overrun { policy, dropped } => {
                stats.overruns += 1;
                // Refused bytes stay with the producer.
                if *policy != OverrunPolicy::Reject {
                    stats.dropped_bytes += *dropped as u64;
                }
            }
            LinkEvent::SyncLost => stats.sync_losses += 1,
            LinkEvent::LinkTimeout { partial } => {
                stats.link_timeouts += 1;
                if *partial {
                    stats.partial_frames += 1;
                }
            }
            LinkEvent::ModeTimeout { .. } => stats.mode_timeouts += 1,
            LinkEvent::DrainTimeout => stats.drain_timeouts += 1,
        }

        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub(crate) fn add_bytes_in(&mut self, n: usize) {
        self.stats.bytes_in += n as u64;
    }

    pub(crate) fn add_bytes_out(&mut self, n: usize) {
        self.stats.bytes_out += n as u64;
    }

    /// Lost bytes that did not open a new overrun episode.
    pub(crate) fn add_dropped(&mut self, n: usize) {
        self.stats.dropped_bytes += n as u64;
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Remove and return every recorded event, oldest first.
    pub fn take_events(&mut self) -> Vec<LinkEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_follow_events() {
        let mut log = EventLog::default();
        log.record(LinkEvent::FrameSent { seq: 1, padding: 0 });
        log.record(LinkEvent::FrameSent { seq: 2, padding: 10 });
        log.record(LinkEvent::LinkTimeout { partial: true });
        log.record(LinkEvent::LinkTimeout { partial: false });
        log.record(LinkEvent::Overrun {
            policy: OverrunPolicy::Reject,
            dropped: 5,
        });
        log.record(LinkEvent::Overrun {
            policy: OverrunPolicy::DropOldest,
            dropped: 7,
        });

        let stats = log.stats();
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.padded_frames, 1);
        assert_eq!(stats.pad_bytes, 10);
        assert_eq!(stats.link_timeouts, 2);
        assert_eq!(stats.partial_frames, 1);
        assert_eq!(stats.overruns, 2);
        assert_eq!(stats.dropped_bytes, 7);
    }

    #[test]
    fn history_is_bounded() {
        let mut log = EventLog::with_capacity(2);
        for seq in 0..5 {
            log.record(LinkEvent::FrameReceived { seq });
        }
        assert_eq!(
            log.take_events(),
            vec![
                LinkEvent::FrameReceived { seq: 3 },
                LinkEvent::FrameReceived { seq: 4 },
            ]
        );
        assert!(log.take_events().is_empty());
        assert_eq!(log.stats().frames_received, 5);
    }
}
