/// Errors that can occur while building, buffering, or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit in one frame.
    #[error("payload too large ({size} bytes, frame size {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame configuration value is unusable.
    #[error("invalid frame configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
