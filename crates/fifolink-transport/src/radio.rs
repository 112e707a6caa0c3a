use std::fmt;

use crate::error::Result;

/// Operating mode of a packet radio.
///
/// The chip occupies exactly one mode at a time. A mode change is requested
/// with [`Radio::set_mode`] and is only in effect once [`Radio::mode_ready`]
/// reports true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RadioMode {
    /// Standby. The FIFO is writable and entering this mode clears it.
    #[default]
    Idle,
    /// Receiving. Demodulated bytes accumulate in the FIFO.
    Rx,
    /// Transmitting. FIFO bytes are shifted out over the air.
    Tx,
}

impl RadioMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RadioMode::Idle => "idle",
            RadioMode::Rx => "rx",
            RadioMode::Tx => "tx",
        }
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability interface of a FIFO packet radio.
///
/// Every method is a single non-blocking register access. Implementations
/// must never wait on hardware; the caller polls again on its next iteration.
///
/// `transfer` follows the single-byte SPI convention of the chip: while the
/// radio is in [`RadioMode::Rx`] it pops one received byte from the FIFO and
/// ignores `byte`; in any other mode it pushes `byte` into the FIFO and
/// returns 0. The transmit side preloads the FIFO in Idle before switching
/// to Tx.
pub trait Radio {
    /// Bring the chip up. Failure is fatal for the run.
    fn begin(&mut self) -> Result<()>;

    /// Request a mode change.
    fn set_mode(&mut self, mode: RadioMode);

    /// The most recently requested mode.
    fn mode(&self) -> RadioMode;

    /// Whether the last requested mode is in effect.
    ///
    /// Backed by a mode-ready register bit or an interrupt line, depending
    /// on the target.
    fn mode_ready(&mut self) -> bool;

    /// At least one byte can be read from the FIFO.
    fn fifo_not_empty(&mut self) -> bool;

    /// No more bytes can be written to the FIFO.
    fn fifo_full(&mut self) -> bool;

    /// Exchange one byte with the FIFO.
    fn transfer(&mut self, byte: u8) -> u8;

    /// In Tx mode: the FIFO and the output shift register are both empty.
    fn packet_sent(&mut self) -> bool;
}

impl<R: Radio + ?Sized> Radio for &mut R {
    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn set_mode(&mut self, mode: RadioMode) {
        (**self).set_mode(mode)
    }

    fn mode(&self) -> RadioMode {
        (**self).mode()
    }

    fn mode_ready(&mut self) -> bool {
        (**self).mode_ready()
    }

    fn fifo_not_empty(&mut self) -> bool {
        (**self).fifo_not_empty()
    }

    fn fifo_full(&mut self) -> bool {
        (**self).fifo_full()
    }

    fn transfer(&mut self, byte: u8) -> u8 {
        (**self).transfer(byte)
    }

    fn packet_sent(&mut self) -> bool {
        (**self).packet_sent()
    }
}

impl<R: Radio + ?Sized> Radio for Box<R> {
    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn set_mode(&mut self, mode: RadioMode) {
        (**self).set_mode(mode)
    }

    fn mode(&self) -> RadioMode {
        (**self).mode()
    }

    fn mode_ready(&mut self) -> bool {
        (**self).mode_ready()
    }

    fn fifo_not_empty(&mut self) -> bool {
        (**self).fifo_not_empty()
    }

    fn fifo_full(&mut self) -> bool {
        (**self).fifo_full()
    }

    fn transfer(&mut self, byte: u8) -> u8 {
        (**self).transfer(byte)
    }

    fn packet_sent(&mut self) -> bool {
        (**self).packet_sent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_idle() {
        assert_eq!(RadioMode::default(), RadioMode::Idle);
    }

    #[test]
    fn mode_display_names() {
        assert_eq!(RadioMode::Idle.to_string(), "idle");
        assert_eq!(RadioMode::Rx.to_string(), "rx");
        assert_eq!(RadioMode::Tx.to_string(), "tx");
    }
}
