/// Progress of the marker search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncState {
    /// Looking for the first marker byte.
    #[default]
    Searching,
    /// The previous byte was the first marker byte.
    FirstByteMatched,
    /// Both marker bytes seen back to back. Following bytes are payload.
    Locked,
}

/// Resumable two-byte marker scanner.
///
/// Bytes are fed one at a time so the search can be suspended whenever the
/// radio FIFO runs dry and picked up on the next poll. A mismatch on the
/// second marker byte drops back to [`SyncState::Searching`] and the same
/// byte is examined again as a possible first marker byte, so a marker
/// immediately preceded by a stray copy of its first byte is still found.
///
/// `Locked` is sticky. The owner calls [`SyncDetector::reset`] once it has
/// consumed the frame's payload.
#[derive(Debug, Clone)]
pub struct SyncDetector {
    marker: [u8; 2],
    state: SyncState,
    false_starts: u64,
}

impl SyncDetector {
    pub fn new(marker: [u8; 2]) -> Self {
        Self {
            marker,
            state: SyncState::Searching,
            false_starts: 0,
        }
    }

    /// Consume exactly one byte and return the new state.
    pub fn feed(&mut self, byte: u8) -> SyncState {
        self.state = match self.state {
            SyncState::Searching => self.first_byte(byte),
            SyncState::FirstByteMatched if byte == self.marker[1] => SyncState::Locked,
            SyncState::FirstByteMatched => {
                self.false_starts += 1;
                self.first_byte(byte)
            }
            SyncState::Locked => SyncState::Locked,
        };
        self.state
    }

    /// Go back to searching for a marker.
    pub fn reset(&mut self) {
        self.state = SyncState::Searching;
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == SyncState::Locked
    }

    pub fn marker(&self) -> [u8; 2] {
        self.marker
    }

    /// Number of first-byte matches that were not followed by the second
    /// marker byte.
    pub fn false_starts(&self) -> u64 {
        self.false_starts
    }

    fn first_byte(&self, byte: u8) -> SyncState {
        if byte == self.marker[0] {
            SyncState::FirstByteMatched
        } else {
            SyncState::Searching
        }
    }
}
