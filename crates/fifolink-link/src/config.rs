use std::path::Path;
use std::time::Duration;

use fifolink_frame::{FrameConfig, OverrunPolicy, DEFAULT_FRAME_SIZE, DEFAULT_PAD_BYTE, DEFAULT_SYNC};
use fifolink_transport::RFM69_FIFO_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Upper bound on `frame_size * buffer_frames`.
pub const MAX_BUFFER_CAPACITY: usize = 64 * 1024 * 1024;

/// Startup configuration for one end of a link.
///
/// Both ends must agree on `frame_size`, `sync`, and `pad_byte`; the rest is
/// local policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Payload bytes per frame.
    pub frame_size: usize,
    /// Two-byte marker preceding every payload.
    pub sync: [u8; 2],
    /// Filler for frames flushed before they were full.
    pub pad_byte: u8,
    /// How long a partially filled transmit frame may wait before it is
    /// padded and sent.
    pub flush_timeout_ms: u32,
    /// How long the receiver waits for a complete frame before declaring
    /// the link lost.
    pub link_timeout_ms: u32,
    /// Stream buffer capacity as a multiple of `frame_size`.
    pub buffer_frames: usize,
    /// What to do when the source outruns the link.
    pub overrun_policy: OverrunPolicy,
    /// Cycle the receiver through Idle after every frame to flush the FIFO.
    pub cycle_idle_after_frame: bool,
    /// How long to wait for a mode change before re-issuing it.
    pub mode_ready_timeout_ms: u32,
    /// How long the transmitter waits for the last frame to leave the radio.
    pub tx_drain_timeout_ms: u32,
    /// Maximum bytes moved between the radio FIFO and memory per step.
    pub fifo_burst: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            sync: DEFAULT_SYNC,
            pad_byte: DEFAULT_PAD_BYTE,
            flush_timeout_ms: 100,
            link_timeout_ms: 2100,
            buffer_frames: 3,
            overrun_policy: OverrunPolicy::Reject,
            cycle_idle_after_frame: false,
            mode_ready_timeout_ms: 50,
            tx_drain_timeout_ms: 500,
            fifo_burst: RFM69_FIFO_SIZE,
        }
    }
}

impl LinkConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LinkError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.frame_config().validate()?;
        if self.buffer_frames == 0 {
            return Err(LinkError::InvalidConfig(
                "buffer_frames must be at least 1".to_string(),
            ));
        }
        match self.frame_size.checked_mul(self.buffer_frames) {
            Some(capacity) if capacity <= MAX_BUFFER_CAPACITY => {}
            _ => {
                return Err(LinkError::InvalidConfig(format!(
                    "frame_size * buffer_frames exceeds {MAX_BUFFER_CAPACITY} bytes"
                )))
            }
        }
        if self.fifo_burst == 0 {
            return Err(LinkError::InvalidConfig(
                "fifo_burst must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("flush_timeout_ms", self.flush_timeout_ms),
            ("link_timeout_ms", self.link_timeout_ms),
            ("mode_ready_timeout_ms", self.mode_ready_timeout_ms),
            ("tx_drain_timeout_ms", self.tx_drain_timeout_ms),
        ] {
            if value == 0 {
                return Err(LinkError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            frame_size: self.frame_size,
            sync: self.sync,
            pad_byte: self.pad_byte,
        }
    }

    /// Stream buffer capacity in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.frame_size.saturating_mul(self.buffer_frames)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms.into())
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms.into())
    }

    pub fn mode_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.mode_ready_timeout_ms.into())
    }

    pub fn tx_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_drain_timeout_ms.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LinkConfig::default();
        config.validate().unwrap();
        assert_eq!(config.buffer_capacity(), 3 * DEFAULT_FRAME_SIZE);
        assert_eq!(config.flush_timeout(), Duration::from_millis(100));
        assert_eq!(config.link_timeout(), Duration::from_millis(2100));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = LinkConfig::from_json_str(
            r#"{"frame_size": 25000, "sync": [0, 255], "overrun_policy": "drop_oldest"}"#,
        )
        .unwrap();
        assert_eq!(config.frame_size, 25000);
        assert_eq!(config.sync, [0x00, 0xFF]);
        assert_eq!(config.overrun_policy, OverrunPolicy::DropOldest);
        assert_eq!(config.flush_timeout_ms, 100);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = LinkConfig::from_json_str(r#"{"frame_sise": 10}"#).unwrap_err();
        assert!(matches!(err, LinkError::Json(_)));
    }

    #[test]
    fn zero_values_are_rejected() {
        for json in [
            r#"{"frame_size": 0}"#,
            r#"{"buffer_frames": 0}"#,
            r#"{"fifo_burst": 0}"#,
            r#"{"link_timeout_ms": 0}"#,
        ] {
            assert!(LinkConfig::from_json_str(json).is_err(), "{json}");
        }
    }

    #[test]
    fn oversized_buffers_are_rejected() {
        let huge = LinkConfig {
            frame_size: usize::MAX / 2,
            ..LinkConfig::default()
        };
        assert!(matches!(huge.validate(), Err(LinkError::InvalidConfig(_))));

        let just_over = LinkConfig {
            frame_size: MAX_BUFFER_CAPACITY / 2,
            buffer_frames: 3,
            ..LinkConfig::default()
        };
        assert!(just_over.validate().is_err());

        let at_limit = LinkConfig {
            frame_size: MAX_BUFFER_CAPACITY / 4,
            buffer_frames: 4,
            ..LinkConfig::default()
        };
        at_limit.validate().unwrap();
    }

    #[test]
    fn missing_file_reports_path() {
        let err = LinkConfig::from_json_file("/nonexistent/fifolink.json").unwrap_err();
        match err {
            LinkError::ConfigFile { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/fifolink.json"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
