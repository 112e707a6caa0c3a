use std::fmt;

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// What a [`StreamBuffer`] does with bytes that do not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrunPolicy {
    /// Store what fits and refuse the rest. The producer keeps the excess
    /// and must hold off until the link drains.
    #[default]
    Reject,
    /// Store what fits and discard the rest.
    DropNewest,
    /// Evict the oldest buffered bytes to make room for the new ones.
    DropOldest,
}

impl OverrunPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            OverrunPolicy::Reject => "reject",
            OverrunPolicy::DropNewest => "drop_newest",
            OverrunPolicy::DropOldest => "drop_oldest",
        }
    }
}

impl fmt::Display for OverrunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// More bytes were offered than the buffer could hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "stream buffer overrun: {dropped} bytes lost under {policy} policy \
     ({accepted} accepted, capacity {capacity})"
)]
pub struct Overrun {
    /// Policy that decided which bytes were lost.
    pub policy: OverrunPolicy,
    /// Bytes from the offered slice that are now in the buffer.
    pub accepted: usize,
    /// Bytes that are not in the buffer: refused or discarded new bytes, or
    /// evicted old ones.
    pub dropped: usize,
    /// Buffer capacity.
    pub capacity: usize,
}

/// Bounded FIFO byte buffer shared by the transmit and receive paths.
///
/// Bytes are appended at the back and consumed from the front. The number
/// of pending bytes never exceeds `capacity`; anything beyond that is an
/// [`Overrun`] resolved by the configured [`OverrunPolicy`].
#[derive(Debug)]
pub struct StreamBuffer {
    data: BytesMut,
    capacity: usize,
    policy: OverrunPolicy,
}

impl StreamBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize, policy: OverrunPolicy) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverrunPolicy {
        self.policy
    }

    /// Number of pending bytes.
    pub fn available(&self) -> usize {
        self.data.len()
    }

    /// Free space before the next overrun.
    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Append `bytes`, returning how many were stored.
    ///
    /// If everything fits the call always succeeds. Otherwise the policy
    /// decides what is kept and the outcome is reported as [`Overrun`].
    /// Bytes already in the buffer are only ever touched by
    /// [`OverrunPolicy::DropOldest`], and then only from the front.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize, Overrun> {
        let free = self.remaining();
        if bytes.len() <= free {
            self.data.extend_from_slice(bytes);
            return Ok(bytes.len());
        }

        match self.policy {
            OverrunPolicy::Reject | OverrunPolicy::DropNewest => {
                self.data.extend_from_slice(&bytes[..free]);
                Err(self.overrun(free, bytes.len() - free))
            }
            OverrunPolicy::DropOldest => {
                if bytes.len() >= self.capacity {
                    let evicted = self.data.len() + (bytes.len() - self.capacity);
                    self.data.clear();
                    self.data
                        .extend_from_slice(&bytes[bytes.len() - self.capacity..]);
                    Err(self.overrun(self.capacity, evicted))
                } else {
                    let evicted = bytes.len() - free;
                    self.data.advance(evicted);
                    self.data.extend_from_slice(bytes);
                    Err(self.overrun(bytes.len(), evicted))
                }
            }
        }
    }

    /// The oldest `n` pending bytes (fewer if less are pending).
    pub fn peek(&self, n: usize) -> &[u8] {
        &self.data[..n.min(self.data.len())]
    }

    /// Drop the oldest `n` pending bytes. Returns how many were dropped.
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.data.len());
        self.data.advance(n);
        n
    }

    /// Remove and return the oldest `n` pending bytes.
    pub fn take(&mut self, n: usize) -> Bytes {
        let n = n.min(self.data.len());
        self.data.split_to(n).freeze()
    }

    /// Discard everything pending.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    fn overrun(&self, accepted: usize, dropped: usize) -> Overrun {
        Overrun {
            policy: self.policy,
            accepted,
            dropped,
            capacity: self.capacity,
        }
    }
}
