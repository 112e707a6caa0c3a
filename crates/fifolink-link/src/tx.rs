use std::time::Duration;

use fifolink_frame::{Frame, FrameConfig, Overrun, OverrunPolicy, StreamBuffer};
use fifolink_transport::{ByteSource, Radio, RadioMode};
use tracing::{debug, trace, warn};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::event::{EventLog, LinkEvent};
use crate::mode::ModeTracker;

#[derive(Debug)]
enum TxState {
    /// Nothing committed to the radio.
    Idle,
    /// Marker and payload are being written into the FIFO. Once the marker
    /// is out the frame can no longer be abandoned.
    Sending {
        frame: Frame,
        cursor: usize,
        padding: usize,
    },
    /// Every byte is in the FIFO; waiting for the radio to shift it out.
    /// The deadline runs from the first poll that finds the radio in Tx.
    Draining { since: Option<Duration> },
}

/// Transmit side: source bytes in, fixed-size frames into the radio FIFO.
///
/// A frame starts when a full payload is buffered, or when the flush
/// timeout has passed since the buffer last went from empty to non-empty;
/// in that case the frame is padded. Bytes left over after a frame is taken
/// keep that start time. While more full payloads are queued frames follow
/// each other without leaving Tx. Otherwise the radio returns to Idle once
/// it reports the last byte sent.
#[derive(Debug)]
pub struct TxFramer {
    frame: FrameConfig,
    buffer: StreamBuffer,
    flush_timeout: Duration,
    drain_timeout: Duration,
    fifo_burst: usize,
    state: TxState,
    filling_since: Option<Duration>,
    flush_requested: bool,
    scratch: Vec<u8>,
    next_seq: u64,
}

impl TxFramer {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            frame: config.frame_config(),
            buffer: StreamBuffer::new(config.buffer_capacity(), config.overrun_policy),
            flush_timeout: config.flush_timeout(),
            drain_timeout: config.tx_drain_timeout(),
            fifo_burst: config.fifo_burst,
            state: TxState::Idle,
            filling_since: None,
            flush_requested: false,
            scratch: Vec::new(),
            next_seq: 1,
        }
    }

    /// Move whatever the source has ready into the stream buffer.
    ///
    /// Under [`OverrunPolicy::Reject`] only as many bytes as fit are read; if
    /// the source still has more, the overrun is reported and the excess
    /// stays in the source. The other policies read everything available
    /// and report what they discarded.
    pub fn fill<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        now: Duration,
    ) -> std::result::Result<usize, Overrun> {
        let offered = source.available();
        if offered == 0 {
            return Ok(0);
        }

        let to_read = match self.buffer.policy() {
            OverrunPolicy::Reject => offered.min(self.buffer.remaining()),
            OverrunPolicy::DropNewest | OverrunPolicy::DropOldest => offered,
        };

        self.scratch.clear();
        while self.scratch.len() < to_read {
            match source.try_read() {
                Some(byte) => self.scratch.push(byte),
                None => break,
            }
        }

        let was_empty = self.buffer.is_empty();
        let result = self.buffer.append(&self.scratch);
        if was_empty && !self.buffer.is_empty() {
            self.filling_since = Some(now);
        }

        let stored = match result {
            Ok(stored) => stored,
            Err(overrun) => return Err(overrun),
        };

        let refused = source.available();
        if self.buffer.policy() == OverrunPolicy::Reject && refused > 0 && self.buffer.is_full() {
            return Err(Overrun {
                policy: OverrunPolicy::Reject,
                accepted: stored,
                dropped: refused,
                capacity: self.buffer.capacity(),
            });
        }
        Ok(stored)
    }

    /// Advance the transmit state machine by one poll.
    pub fn step<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        modes: &mut ModeTracker,
        now: Duration,
        log: &mut EventLog,
    ) -> Result<()> {
        match self.state {
            TxState::Idle => {
                if modes.in_mode(RadioMode::Idle) && self.frame_due(now) {
                    self.start_frame()?;
                    // Preload while in standby, then key up.
                    self.pump(radio, modes, now, log)?;
                    modes.request(radio, RadioMode::Tx, now);
                }
            }
            TxState::Sending { .. } => {
                if modes.in_mode(RadioMode::Tx) {
                    self.pump(radio, modes, now, log)?;
                }
            }
            TxState::Draining { since } => {
                if !modes.in_mode(RadioMode::Tx) {
                    return Ok(());
                }
                let since = since.unwrap_or(now);
                self.state = TxState::Draining { since: Some(since) };

                if self.buffer.available() >= self.frame.frame_size {
                    // Queue the next frame behind the one still going out.
                    self.start_frame()?;
                    self.pump(radio, modes, now, log)?;
                } else if radio.packet_sent() {
                    trace!("radio drained");
                    modes.request(radio, RadioMode::Idle, now);
                    self.state = TxState::Idle;
                } else if now.saturating_sub(since) >= self.drain_timeout {
                    warn!(
                        timeout = ?self.drain_timeout,
                        "radio never reported packet sent, forcing idle"
                    );
                    log.record(LinkEvent::DrainTimeout);
                    modes.request(radio, RadioMode::Idle, now);
                    self.state = TxState::Idle;
                }
            }
        }
        Ok(())
    }

    /// Drop buffered bytes that have not been committed to a frame.
    ///
    /// A frame whose marker is already in the FIFO is not affected.
    pub fn discard_pending(&mut self) -> usize {
        let n = self.buffer.available();
        self.buffer.clear();
        self.filling_since = None;
        self.flush_requested = false;
        n
    }

    /// Send whatever is buffered without waiting for the flush timeout.
    ///
    /// Used once the source has ended. The request lapses when the buffer
    /// empties.
    pub fn request_flush(&mut self) {
        if !self.buffer.is_empty() {
            self.flush_requested = true;
        }
    }

    /// A frame is being written or drained.
    pub fn is_transmitting(&self) -> bool {
        !matches!(self.state, TxState::Idle)
    }

    /// Nothing buffered and nothing in flight.
    pub fn is_idle(&self) -> bool {
        !self.is_transmitting() && self.buffer.is_empty()
    }

    pub fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    fn frame_due(&self, now: Duration) -> bool {
        if self.buffer.available() >= self.frame.frame_size {
            return true;
        }
        if self.flush_requested && !self.buffer.is_empty() {
            return true;
        }
        match self.filling_since {
            Some(since) => {
                !self.buffer.is_empty() && now.saturating_sub(since) >= self.flush_timeout
            }
            None => false,
        }
    }

    fn start_frame(&mut self) -> Result<()> {
        let data = self.buffer.take(self.frame.frame_size);
        let short = self.frame.frame_size - data.len();
        let frame = Frame::padded(&self.frame, data)?;

        if self.buffer.is_empty() {
            self.filling_since = None;
            self.flush_requested = false;
        }

        debug!(seq = self.next_seq, padding = short, "frame started");
        self.state = TxState::Sending {
            frame,
            cursor: 0,
            padding: short,
        };
        Ok(())
    }

    /// Write as much of the current frame as the FIFO takes, chaining into
    /// the next frame when one is already queued and the radio is in Tx.
    fn pump<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        modes: &ModeTracker,
        now: Duration,
        log: &mut EventLog,
    ) -> Result<()> {
        let mut budget = self.fifo_burst;
        loop {
            let TxState::Sending {
                frame,
                cursor,
                padding,
            } = &mut self.state
            else {
                return Ok(());
            };

            while *cursor < frame.wire_size() && budget > 0 && !radio.fifo_full() {
                radio.transfer(frame.wire_byte(*cursor));
                *cursor += 1;
                budget -= 1;
            }
            if *cursor < frame.wire_size() {
                return Ok(());
            }

            let padding = *padding;
            self.finish_frame(padding, log);

            let keyed = modes.in_mode(RadioMode::Tx);
            if keyed && self.buffer.available() >= self.frame.frame_size {
                self.start_frame()?;
                continue;
            }
            self.state = TxState::Draining {
                since: keyed.then_some(now),
            };
            return Ok(());
        }
    }

    fn finish_frame(&mut self, padding: usize, log: &mut EventLog) {
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(seq, padding, "frame written to fifo");
        log.record(LinkEvent::FrameSent { seq, padding });
    }
}
