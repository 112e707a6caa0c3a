//! Simulated FIFO radio.
//!
//! Models one RFM69-class chip closely enough to exercise the framer:
//! a small FIFO, Idle/Rx/Tx modes that take a few polls to settle, and an
//! air interface with a fixed byte rate. Two radios sharing one
//! [`AirChannel`] form a loopback link.
//!
//! Simulated time advances on every status poll (`mode_ready`,
//! `fifo_full`, `fifo_not_empty`, `packet_sent`), so a framer that never
//! polls never sees progress, exactly like the hardware.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::radio::{Radio, RadioMode};

/// FIFO depth of the RFM69HCW.
pub const RFM69_FIFO_SIZE: usize = 66;

/// Tunables for [`MockRadio`].
#[derive(Debug, Clone)]
pub struct MockRadioConfig {
    /// FIFO capacity in bytes.
    pub fifo_size: usize,
    /// Number of `mode_ready` polls that report false after a mode request.
    pub mode_ready_polls: u32,
    /// Bytes moved between FIFO and air per status poll.
    pub bytes_per_poll: usize,
    /// Make `begin` fail.
    pub fail_begin: bool,
}

impl Default for MockRadioConfig {
    fn default() -> Self {
        Self {
            fifo_size: RFM69_FIFO_SIZE,
            mode_ready_polls: 2,
            bytes_per_poll: 4,
            fail_begin: false,
        }
    }
}

#[derive(Debug, Default)]
struct AirState {
    queue: VecDeque<u8>,
    capture: Option<BytesMut>,
}

/// Shared medium between simulated radios.
///
/// Bytes shifted out by a transmitter wait here until a receiver in Rx mode
/// picks them up. Optionally every transmitted byte is also recorded so a
/// run can be saved as a wire capture.
#[derive(Debug, Clone, Default)]
pub struct AirChannel {
    state: Rc<RefCell<AirState>>,
}

impl AirChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// An air channel that records every transmitted byte.
    pub fn with_capture() -> Self {
        let channel = Self::new();
        channel.state.borrow_mut().capture = Some(BytesMut::new());
        channel
    }

    /// Queue bytes as if they had been transmitted (wire capture replay).
    pub fn preload(&self, bytes: &[u8]) {
        self.state.borrow_mut().queue.extend(bytes.iter().copied());
    }

    /// Bytes on the air that no receiver has picked up yet.
    pub fn in_flight(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Everything transmitted so far, if capture is enabled.
    pub fn captured(&self) -> Option<Bytes> {
        self.state
            .borrow()
            .capture
            .as_ref()
            .map(|buf| Bytes::copy_from_slice(buf))
    }

    fn transmit(&self, byte: u8) {
        let mut state = self.state.borrow_mut();
        state.queue.push_back(byte);
        if let Some(capture) = state.capture.as_mut() {
            capture.extend_from_slice(&[byte]);
        }
    }

    fn receive(&self) -> Option<u8> {
        self.state.borrow_mut().queue.pop_front()
    }
}

/// Simulated radio chip.
#[derive(Debug)]
pub struct MockRadio {
    config: MockRadioConfig,
    air: AirChannel,
    fifo: VecDeque<u8>,
    mode: RadioMode,
    settle_polls: u32,
    last_read: u8,
    empty_reads: u64,
    overflowed: u64,
    mode_requests: u64,
}

impl MockRadio {
    /// A radio on `air` with default tunables.
    pub fn new(air: AirChannel) -> Self {
        Self::with_config(air, MockRadioConfig::default())
    }

    pub fn with_config(air: AirChannel, config: MockRadioConfig) -> Self {
        Self {
            config,
            air,
            fifo: VecDeque::with_capacity(RFM69_FIFO_SIZE),
            mode: RadioMode::Idle,
            settle_polls: 0,
            last_read: 0,
            empty_reads: 0,
            overflowed: 0,
            mode_requests: 0,
        }
    }

    /// The air channel this radio is attached to.
    pub fn air(&self) -> &AirChannel {
        &self.air
    }

    /// Bytes currently held in the FIFO.
    pub fn fifo_len(&self) -> usize {
        self.fifo.len()
    }

    /// Reads performed while the FIFO was empty. Each returned a stale byte.
    pub fn empty_reads(&self) -> u64 {
        self.empty_reads
    }

    /// Bytes written while the FIFO was full. Each was lost.
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    /// Number of `set_mode` calls so far.
    pub fn mode_requests(&self) -> u64 {
        self.mode_requests
    }

    fn settled(&self) -> bool {
        self.settle_polls == 0
    }

    fn service(&mut self) {
        if !self.settled() {
            return;
        }
        match self.mode {
            RadioMode::Tx => {
                for _ in 0..self.config.bytes_per_poll {
                    let Some(byte) = self.fifo.pop_front() else {
                        break;
                    };
                    self.air.transmit(byte);
                }
            }
            RadioMode::Rx => {
                for _ in 0..self.config.bytes_per_poll {
                    if self.fifo.len() >= self.config.fifo_size {
                        break;
                    }
                    let Some(byte) = self.air.receive() else {
                        break;
                    };
                    self.fifo.push_back(byte);
                }
            }
            RadioMode::Idle => {}
        }
    }
}

impl Radio for MockRadio {
    fn begin(&mut self) -> Result<()> {
        if self.config.fail_begin {
            return Err(TransportError::BeginFailed(
                "simulated radio configured to fail".to_string(),
            ));
        }
        self.fifo.clear();
        self.mode = RadioMode::Idle;
        self.settle_polls = 0;
        debug!(fifo_size = self.config.fifo_size, "mock radio up");
        Ok(())
    }

    fn set_mode(&mut self, mode: RadioMode) {
        self.mode_requests += 1;
        if mode == RadioMode::Idle {
            self.fifo.clear();
        }
        if mode != self.mode {
            trace!(from = %self.mode, to = %mode, "mock radio mode change");
            self.settle_polls = self.config.mode_ready_polls;
        }
        self.mode = mode;
    }

    fn mode(&self) -> RadioMode {
        self.mode
    }

    fn mode_ready(&mut self) -> bool {
        if self.settle_polls > 0 {
            self.settle_polls -= 1;
            return false;
        }
        self.service();
        true
    }

    fn fifo_not_empty(&mut self) -> bool {
        self.service();
        !self.fifo.is_empty()
    }

    fn fifo_full(&mut self) -> bool {
        self.service();
        self.fifo.len() >= self.config.fifo_size
    }

    fn transfer(&mut self, byte: u8) -> u8 {
        if self.mode == RadioMode::Rx {
            match self.fifo.pop_front() {
                Some(b) => {
                    self.last_read = b;
                    b
                }
                None => {
                    self.empty_reads += 1;
                    self.last_read
                }
            }
        } else {
            if self.fifo.len() >= self.config.fifo_size {
                self.overflowed += 1;
            } else {
                self.fifo.push_back(byte);
            }
            0
        }
    }

    fn packet_sent(&mut self) -> bool {
        self.service();
        self.mode == RadioMode::Tx && self.settled() && self.fifo.is_empty()
    }
}
