//! Radio capability and byte stream abstractions.
//!
//! This is the lowest layer of fifolink. It defines what the framer needs
//! from the outside world and nothing more:
//! - a packet radio with a small hardware FIFO and Idle/Rx/Tx modes
//! - a non-blocking byte source for outbound data
//! - a byte sink for inbound data
//!
//! A simulated radio ([`MockRadio`]) is included so the framing layers can be
//! exercised without hardware.

pub mod error;
pub mod mock;
pub mod radio;
pub mod stream;

pub use error::{Result, TransportError};
pub use mock::{AirChannel, MockRadio, MockRadioConfig, RFM69_FIFO_SIZE};
pub use radio::{Radio, RadioMode};
pub use stream::{ByteSink, ByteSource, ThreadedSource, WriterSink};
