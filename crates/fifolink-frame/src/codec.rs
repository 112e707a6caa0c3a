use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::sync::{SyncDetector, SyncState};

/// Sync marker length on the wire.
pub const MARKER_SIZE: usize = 2;

/// Default sync marker.
pub const DEFAULT_SYNC: [u8; 2] = [0x37, 0x69];

/// Default payload size per frame.
pub const DEFAULT_FRAME_SIZE: usize = 1250;

/// Default byte used to fill short frames.
pub const DEFAULT_PAD_BYTE: u8 = 0x00;

/// Fixed framing parameters shared by both ends of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Payload bytes per frame.
    pub frame_size: usize,
    /// Two-byte marker preceding every payload.
    pub sync: [u8; 2],
    /// Filler for frames flushed before they were full.
    pub pad_byte: u8,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            sync: DEFAULT_SYNC,
            pad_byte: DEFAULT_PAD_BYTE,
        }
    }
}

impl FrameConfig {
    /// Bytes on the wire per frame (marker + payload).
    pub fn wire_size(&self) -> usize {
        MARKER_SIZE + self.frame_size
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(FrameError::InvalidConfig(
                "frame_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One frame: marker plus a payload of exactly `frame_size` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The sync marker.
    pub marker: [u8; 2],
    /// The payload, always full length.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame from `data`, padding it up to the configured size.
    pub fn padded(config: &FrameConfig, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        check_size(data.len(), config.frame_size)?;

        let payload = if data.len() == config.frame_size {
            data
        } else {
            let mut buf = BytesMut::with_capacity(config.frame_size);
            buf.put_slice(&data);
            buf.put_bytes(config.pad_byte, config.frame_size - data.len());
            buf.freeze()
        };

        Ok(Self {
            marker: config.sync,
            payload,
        })
    }

    /// The total wire size of this frame (marker + payload).
    pub fn wire_size(&self) -> usize {
        MARKER_SIZE + self.payload.len()
    }

    /// Byte at `index` in wire order.
    ///
    /// # Panics
    ///
    /// If `index >= self.wire_size()`.
    pub fn wire_byte(&self, index: usize) -> u8 {
        if index < MARKER_SIZE {
            self.marker[index]
        } else {
            self.payload[index - MARKER_SIZE]
        }
    }
}

/// Encode one frame into the wire format.
///
/// Short payloads are padded with `config.pad_byte`.
pub fn encode_frame(payload: &[u8], config: &FrameConfig, dst: &mut BytesMut) -> Result<()> {
    check_size(payload.len(), config.frame_size)?;
    dst.reserve(config.wire_size());
    dst.put_slice(&config.sync);
    dst.put_slice(payload);
    dst.put_bytes(config.pad_byte, config.frame_size - payload.len());
    Ok(())
}

/// Decode the next frame from a captured byte stream.
///
/// Bytes before the first marker are discarded. Returns `Ok(None)` when no
/// complete frame is buffered yet; in that case everything that cannot be
/// part of a future frame has already been dropped from `src`.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Frame>> {
    config.validate()?;

    let mut detector = SyncDetector::new(config.sync);
    let marker_end = src
        .iter()
        .position(|&b| detector.feed(b) == SyncState::Locked)
        .map(|i| i + 1);

    let Some(marker_end) = marker_end else {
        // Keep a trailing first marker byte; its partner may still arrive.
        let keep = usize::from(detector.state() == SyncState::FirstByteMatched);
        let len = src.len();
        if len > keep {
            trace!(dropped = len - keep, "no marker in capture");
        }
        src.advance(len - keep);
        return Ok(None);
    };

    let junk = marker_end - MARKER_SIZE;
    if junk > 0 {
        trace!(junk, "skipped bytes before marker");
    }
    if src.len() - marker_end < config.frame_size {
        src.advance(junk);
        return Ok(None);
    }

    src.advance(marker_end);
    let payload = src.split_to(config.frame_size).freeze();
    Ok(Some(Frame {
        marker: config.sync,
        payload,
    }))
}

fn check_size(size: usize, max: usize) -> Result<()> {
    if size > max {
        return Err(FrameError::PayloadTooLarge { size, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> FrameConfig {
        FrameConfig {
            frame_size: 4,
            sync: [0x37, 0x69],
            pad_byte: 0x00,
        }
    }

    #[test]
    fn encode_full_frame() {
        let mut wire = BytesMut::new();
        encode_frame(&[0xAA, 0xBB, 0xCC, 0xDD], &tiny(), &mut wire).unwrap();
        assert_eq!(wire.as_ref(), &[0x37, 0x69, 0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn encode_pads_short_payload() {
        let mut wire = BytesMut::new();
        encode_frame(&[0xAA, 0xBB], &tiny(), &mut wire).unwrap();
        assert_eq!(wire.as_ref(), &[0x37, 0x69, 0xAA, 0xBB, 0x00, 0x00]);
    }

    #[test]
    fn encode_rejects_oversize_payload() {
        let mut wire = BytesMut::new();
        let err = encode_frame(&[0; 5], &tiny(), &mut wire).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 5, max: 4 }));
        assert!(wire.is_empty());
    }

    #[test]
    fn padded_frame_uses_pad_byte() {
        let config = FrameConfig {
            pad_byte: 0xEE,
            ..tiny()
        };
        let frame = Frame::padded(&config, vec![1u8]).unwrap();
        assert_eq!(frame.payload.as_ref(), &[1, 0xEE, 0xEE, 0xEE]);
        assert_eq!(frame.wire_size(), 6);
        let wire: Vec<u8> = (0..frame.wire_size()).map(|i| frame.wire_byte(i)).collect();
        assert_eq!(wire, vec![0x37, 0x69, 1, 0xEE, 0xEE, 0xEE]);
    }

    #[test]
    fn decode_skips_leading_junk() {
        let mut wire = BytesMut::from(&[0x01, 0x37, 0x02, 0x37, 0x69, 1, 2, 3, 4, 0x37][..]);
        let frame = decode_frame(&mut wire, &tiny()).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), &[1, 2, 3, 4]);
        assert_eq!(wire.as_ref(), &[0x37]);
    }

    #[test]
    fn decode_incomplete_payload_waits() {
        let mut wire = BytesMut::from(&[0xFF, 0x37, 0x69, 1, 2][..]);
        assert!(decode_frame(&mut wire, &tiny()).unwrap().is_none());
        assert_eq!(wire.as_ref(), &[0x37, 0x69, 1, 2]);

        wire.extend_from_slice(&[3, 4]);
        let frame = decode_frame(&mut wire, &tiny()).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), &[1, 2, 3, 4]);
        assert!(wire.is_empty());
    }

    #[test]
    fn decode_without_marker_drops_junk() {
        let mut wire = BytesMut::from(&[1, 2, 3, 0x37][..]);
        assert!(decode_frame(&mut wire, &tiny()).unwrap().is_none());
        assert_eq!(wire.as_ref(), &[0x37]);
    }

    #[test]
    fn decode_back_to_back_frames() {
        let mut wire = BytesMut::new();
        encode_frame(b"abcd", &tiny(), &mut wire).unwrap();
        encode_frame(b"ef", &tiny(), &mut wire).unwrap();

        let first = decode_frame(&mut wire, &tiny()).unwrap().unwrap();
        let second = decode_frame(&mut wire, &tiny()).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"abcd");
        assert_eq!(second.payload.as_ref(), b"ef\0\0");
        assert!(decode_frame(&mut wire, &tiny()).unwrap().is_none());
    }

    #[test]
    fn zero_frame_size_is_invalid() {
        let config = FrameConfig {
            frame_size: 0,
            ..tiny()
        };
        assert!(matches!(
            config.validate(),
            Err(FrameError::InvalidConfig(_))
        ));
    }
}
