/// Errors that can occur at the radio or byte stream boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The radio did not come up during `begin`.
    #[error("radio failed to begin: {0}")]
    BeginFailed(String),

    /// The reader thread behind a source could not be started.
    #[error("failed to spawn source reader: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
