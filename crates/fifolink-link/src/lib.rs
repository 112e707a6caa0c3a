//! Streaming bridge between a byte stream and a FIFO packet radio.
//!
//! This is the "just works" layer. A [`ModeScheduler`] owns the radio and
//! runs one of two roles:
//! - transmitter: source bytes are buffered, cut into fixed-size frames,
//!   and fed into the radio FIFO as it drains ([`TxFramer`])
//! - receiver: FIFO bytes are scanned for the sync marker and the payload
//!   that follows is streamed to a sink ([`RxDeframer`])
//!
//! Every step is a non-blocking poll. Hardware waits show up as "nothing
//! to do this iteration".

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod mode;
pub mod rx;
pub mod scheduler;
pub mod tx;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LinkConfig, MAX_BUFFER_CAPACITY};
pub use error::{LinkError, Result};
pub use event::{EventLog, LinkEvent, LinkStats};
pub use mode::{ModePoll, ModeTracker};
pub use rx::RxDeframer;
pub use scheduler::{ModeScheduler, Role};
pub use tx::TxFramer;
