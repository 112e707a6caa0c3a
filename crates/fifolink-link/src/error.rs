use std::path::PathBuf;

/// Errors that can occur while setting up or running a link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Radio or byte stream error.
    #[error("transport error: {0}")]
    Transport(#[from] fifolink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] fifolink_frame::FrameError),

    /// Writing to the sink failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A link configuration value is unusable.
    #[error("invalid link configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for [`crate::LinkConfig`].
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
