use std::io;
use std::time::Duration;

use fifolink_frame::{StreamBuffer, SyncDetector, SyncState};
use fifolink_transport::{ByteSink, Radio, RadioMode};
use tracing::{debug, trace, warn};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::event::{EventLog, LinkEvent};
use crate::mode::ModeTracker;

/// Receive side: radio FIFO bytes in, payload bytes out.
///
/// While searching, bytes are read one per `fifo_not_empty` check and fed
/// to the [`SyncDetector`]. Once locked, up to `frame_size` payload bytes
/// are read as the FIFO provides them and queued for the sink. After the
/// last payload byte the detector goes back to searching.
///
/// A frame that has not completed within the link timeout is abandoned;
/// the same check reports a silent link. Either way the timeout fires at
/// most once per interval.
#[derive(Debug)]
pub struct RxDeframer {
    frame_size: usize,
    detector: SyncDetector,
    buffer: StreamBuffer,
    remaining: usize,
    link_timeout: Duration,
    last_activity: Duration,
    cycle_idle: bool,
    fifo_burst: usize,
    scratch: Vec<u8>,
    next_seq: u64,
}

impl RxDeframer {
    /// A deframer whose link timeout starts counting at `now`.
    pub fn new(config: &LinkConfig, now: Duration) -> Self {
        Self {
            frame_size: config.frame_size,
            detector: SyncDetector::new(config.sync),
            buffer: StreamBuffer::new(config.buffer_capacity(), config.overrun_policy),
            remaining: 0,
            link_timeout: config.link_timeout(),
            last_activity: now,
            cycle_idle: config.cycle_idle_after_frame,
            fifo_burst: config.fifo_burst,
            scratch: Vec::new(),
            next_seq: 1,
        }
    }

    /// Advance the receive state machine by one poll.
    pub fn step<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        modes: &mut ModeTracker,
        now: Duration,
        log: &mut EventLog,
    ) -> Result<()> {
        if modes.is_ready() && modes.target() != RadioMode::Rx {
            modes.request(radio, RadioMode::Rx, now);
            return Ok(());
        }

        self.check_timeout(radio, modes, now, log);

        if !modes.in_mode(RadioMode::Rx) {
            return Ok(());
        }

        let mut budget = self.fifo_burst;
        while budget > 0 {
            if !self.detector.is_locked() {
                if !radio.fifo_not_empty() {
                    break;
                }
                budget -= 1;
                self.search(radio.transfer(0), log);
                continue;
            }

            // Only take what the buffer can hold; the rest waits in the FIFO.
            let want = self.remaining.min(budget).min(self.buffer.remaining());
            if want == 0 {
                break;
            }
            self.scratch.clear();
            while self.scratch.len() < want && radio.fifo_not_empty() {
                self.scratch.push(radio.transfer(0));
            }
            if self.scratch.is_empty() {
                break;
            }

            let read = self.scratch.len();
            budget -= read;
            self.remaining -= read;
            if let Err(overrun) = self.buffer.append(&self.scratch) {
                warn!(policy = %overrun.policy, dropped = overrun.dropped, "receive buffer overrun");
                log.record(LinkEvent::Overrun {
                    policy: overrun.policy,
                    dropped: overrun.dropped,
                });
            }
            trace!(read, remaining = self.remaining, "payload bytes read");

            if self.remaining == 0 {
                self.complete_frame(now, log);
                if self.cycle_idle {
                    modes.request(radio, RadioMode::Idle, now);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Hand every queued payload byte to `sink`. Returns how many were
    /// written.
    pub fn deliver<K: ByteSink + ?Sized>(
        &mut self,
        sink: &mut K,
        log: &mut EventLog,
    ) -> io::Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let bytes = self.buffer.take(self.buffer.available());
        sink.write(&bytes)?;
        log.add_bytes_out(bytes.len());
        Ok(bytes.len())
    }

    /// Abandon any frame in progress and go back to searching.
    ///
    /// Payload bytes already queued for the sink are kept.
    pub fn cancel(&mut self) {
        if self.detector.is_locked() {
            debug!(remaining = self.remaining, "receive cancelled mid-frame");
        }
        self.detector.reset();
        self.remaining = 0;
    }

    pub fn sync_state(&self) -> SyncState {
        self.detector.state()
    }

    /// Locked onto a marker and reading payload.
    pub fn in_frame(&self) -> bool {
        self.detector.is_locked()
    }

    /// Payload bytes still expected for the current frame.
    pub fn remaining_payload(&self) -> usize {
        self.remaining
    }

    /// Frames completed so far.
    pub fn frames_received(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    fn search(&mut self, byte: u8, log: &mut EventLog) {
        let false_starts = self.detector.false_starts();
        let state = self.detector.feed(byte);
        if self.detector.false_starts() > false_starts {
            warn!(byte, "sync marker broken off, searching again");
            log.record(LinkEvent::SyncLost);
        }
        if state == SyncState::Locked {
            debug!(seq = self.next_seq, "sync locked");
            self.remaining = self.frame_size;
        }
    }

    fn complete_frame(&mut self, now: Duration, log: &mut EventLog) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.detector.reset();
        self.last_activity = now;
        debug!(seq, "frame received");
        log.record(LinkEvent::FrameReceived { seq });
    }

    fn check_timeout<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        modes: &mut ModeTracker,
        now: Duration,
        log: &mut EventLog,
    ) {
        if now.saturating_sub(self.last_activity) < self.link_timeout {
            return;
        }

        let partial = self.detector.is_locked();
        if partial {
            warn!(
                missing = self.remaining,
                timeout = ?self.link_timeout,
                "frame incomplete at link timeout, dropping it"
            );
        } else {
            warn!(timeout = ?self.link_timeout, "no frame within link timeout");
        }
        log.record(LinkEvent::LinkTimeout { partial });
        self.cancel();
        self.last_activity = now;

        if partial && self.cycle_idle && modes.target() == RadioMode::Rx {
            modes.request(radio, RadioMode::Idle, now);
        }
    }
}
