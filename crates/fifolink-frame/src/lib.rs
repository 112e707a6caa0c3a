//! Fixed-size radio framing.
//!
//! Every frame on the air is a 2-byte sync marker followed by exactly
//! `frame_size` payload bytes, back to back, with no length field and no
//! checksum:
//!
//! ```text
//! ┌──────────┬──────────┬──────────────────────────────┐
//! │ sync[0]  │ sync[1]  │ payload (frame_size bytes,   │
//! │          │          │ zero-padded when short)      │
//! └──────────┴──────────┴──────────────────────────────┘
//! ```
//!
//! This crate holds the pieces both directions share: the frame model and
//! codec, the bounded [`StreamBuffer`], and the byte-at-a-time
//! [`SyncDetector`].

pub mod buffer;
pub mod codec;
pub mod error;
pub mod sync;

pub use buffer::{Overrun, OverrunPolicy, StreamBuffer};
pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_FRAME_SIZE, DEFAULT_PAD_BYTE,
    DEFAULT_SYNC, MARKER_SIZE,
};
pub use error::{FrameError, Result};
pub use sync::{SyncDetector, SyncState};
