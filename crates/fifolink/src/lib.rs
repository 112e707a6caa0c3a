//! Stream bytes over FIFO packet radios.
//!
//! fifolink cuts a continuous byte stream into fixed-size frames, each
//! prefixed with a two-byte sync marker, and pushes them through a radio
//! whose only interface is a small on-chip FIFO. The receiving end finds
//! the marker again and streams the payload back out.
//!
//! # Crate Structure
//!
//! - [`transport`]: radio capability trait, byte sources and sinks, simulated radio
//! - [`frame`]: wire format, stream buffer, sync marker detection
//! - [`link`]: transmit framer, receive deframer, and the poll-loop scheduler
//!   (behind the `link` feature)

/// Re-export transport types.
pub mod transport {
    pub use fifolink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use fifolink_frame::*;
}

/// Re-export link types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use fifolink_link::*;
}
