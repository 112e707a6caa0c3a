use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fifolink_frame::OverrunPolicy;
use fifolink_transport::{ByteSink, ByteSource, Radio, RadioMode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::LinkConfig;
use crate::error::Result;
use crate::event::{EventLog, LinkEvent, LinkStats};
use crate::mode::{ModePoll, ModeTracker};
use crate::rx::RxDeframer;
use crate::tx::TxFramer;

/// Which end of the link a scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Transmitter,
    Receiver,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Transmitter => "transmitter",
            Role::Receiver => "receiver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct TxEnd {
    framer: TxFramer,
    source: Box<dyn ByteSource>,
    overrun_active: bool,
    exhausted: bool,
}

impl TxEnd {
    fn fill(&mut self, now: Duration, log: &mut EventLog) -> Result<()> {
        match self.framer.fill(self.source.as_mut(), now) {
            Ok(stored) => {
                log.add_bytes_in(stored);
                if self.overrun_active && stored > 0 {
                    debug!("source back within link capacity");
                    self.overrun_active = false;
                }
            }
            Err(overrun) => {
                log.add_bytes_in(overrun.accepted);
                if !self.overrun_active {
                    warn!(
                        policy = %overrun.policy,
                        dropped = overrun.dropped,
                        capacity = overrun.capacity,
                        "source outran the link"
                    );
                    log.record(LinkEvent::Overrun {
                        policy: overrun.policy,
                        dropped: overrun.dropped,
                    });
                    self.overrun_active = true;
                } else if overrun.policy != OverrunPolicy::Reject {
                    log.add_dropped(overrun.dropped);
                }
            }
        }

        if !self.exhausted && self.source.is_exhausted() {
            if let Some(err) = self.source.take_error() {
                return Err(err.into());
            }
            info!("source ended");
            self.exhausted = true;
        }
        if self.exhausted {
            self.framer.request_flush();
        }
        Ok(())
    }
}

struct RxEnd {
    deframer: RxDeframer,
    sink: Box<dyn ByteSink>,
}

impl RxEnd {
    fn deliver(&mut self, log: &mut EventLog) -> Result<()> {
        if self.deframer.deliver(self.sink.as_mut(), log)? > 0 {
            self.sink.flush()?;
        }
        Ok(())
    }
}

enum End {
    Tx(TxEnd),
    Rx(RxEnd),
}

/// Single-threaded poll loop that owns the radio for one link role.
///
/// Each [`step`](ModeScheduler::step) runs, in order: source or sink I/O,
/// the transmit framer (transmitter), the receive deframer and sink
/// delivery (receiver), and finally the mode-ready poll. Nothing in a step
/// blocks.
///
/// Only radio start-up failures and sink I/O errors are returned. Overruns,
/// sync losses, and timeouts are logged, counted in [`LinkStats`], and
/// queued as [`LinkEvent`]s.
pub struct ModeScheduler<R, C = SystemClock> {
    radio: R,
    clock: C,
    config: LinkConfig,
    modes: ModeTracker,
    log: EventLog,
    end: End,
}

impl<R: Radio, C: Clock> ModeScheduler<R, C> {
    /// Bring the radio up and run it as a transmitter fed by `source`.
    pub fn transmitter<S>(radio: R, clock: C, config: LinkConfig, source: S) -> Result<Self>
    where
        S: ByteSource + 'static,
    {
        let framer = TxFramer::new(&config);
        let end = End::Tx(TxEnd {
            framer,
            source: Box::new(source),
            overrun_active: false,
            exhausted: false,
        });
        Self::start(radio, clock, config, end)
    }

    /// Bring the radio up and run it as a receiver writing to `sink`.
    pub fn receiver<K>(radio: R, clock: C, config: LinkConfig, sink: K) -> Result<Self>
    where
        K: ByteSink + 'static,
    {
        let deframer = RxDeframer::new(&config, clock.now());
        let end = End::Rx(RxEnd {
            deframer,
            sink: Box::new(sink),
        });
        Self::start(radio, clock, config, end)
    }

    fn start(mut radio: R, clock: C, config: LinkConfig, end: End) -> Result<Self> {
        config.validate()?;
        radio.begin()?;

        let mut modes = ModeTracker::new(config.mode_ready_timeout());
        modes.request(&mut radio, RadioMode::Idle, clock.now());

        let scheduler = Self {
            radio,
            clock,
            config,
            modes,
            log: EventLog::default(),
            end,
        };
        info!(
            role = %scheduler.role(),
            frame_size = scheduler.config.frame_size,
            sync = ?scheduler.config.sync,
            overrun_policy = %scheduler.config.overrun_policy,
            "link started"
        );
        Ok(scheduler)
    }

    /// Run one iteration of the poll loop.
    pub fn step(&mut self) -> Result<()> {
        let now = self.clock.now();
        match &mut self.end {
            End::Tx(tx) => {
                tx.fill(now, &mut self.log)?;
                tx.framer
                    .step(&mut self.radio, &mut self.modes, now, &mut self.log)?;
            }
            End::Rx(rx) => {
                rx.deliver(&mut self.log)?;
                rx.deframer
                    .step(&mut self.radio, &mut self.modes, now, &mut self.log)?;
                rx.deliver(&mut self.log)?;
            }
        }

        if let ModePoll::Reissued(mode) = self.modes.poll(&mut self.radio, now) {
            self.log.record(LinkEvent::ModeTimeout { mode });
        }
        Ok(())
    }

    /// Step until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            self.step()?;
        }
        info!(role = %self.role(), stats = ?self.log.stats(), "link stopped");
        Ok(())
    }

    /// Step until the source has ended and its last frame has left the
    /// radio, or `running` is cleared. Always returns immediately for a
    /// receiver.
    pub fn run_to_completion(&mut self, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) && !self.is_drained() {
            self.step()?;
        }
        Ok(())
    }

    /// Transmitter only: the source has ended, everything has been sent,
    /// and the radio is back in Idle.
    pub fn is_drained(&self) -> bool {
        match &self.end {
            End::Tx(tx) => {
                tx.exhausted && tx.framer.is_idle() && self.modes.in_mode(RadioMode::Idle)
            }
            End::Rx(_) => true,
        }
    }

    pub fn role(&self) -> Role {
        match self.end {
            End::Tx(_) => Role::Transmitter,
            End::Rx(_) => Role::Receiver,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn stats(&self) -> &LinkStats {
        self.log.stats()
    }

    /// Remove and return every event recorded since the last call.
    pub fn take_events(&mut self) -> Vec<LinkEvent> {
        self.log.take_events()
    }

    pub fn modes(&self) -> &ModeTracker {
        &self.modes
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn tx_framer(&self) -> Option<&TxFramer> {
        match &self.end {
            End::Tx(tx) => Some(&tx.framer),
            End::Rx(_) => None,
        }
    }

    pub fn rx_deframer(&self) -> Option<&RxDeframer> {
        match &self.end {
            End::Rx(rx) => Some(&rx.deframer),
            End::Tx(_) => None,
        }
    }

    /// Receiver only: abandon the frame in progress.
    pub fn cancel_receive(&mut self) {
        if let End::Rx(rx) = &mut self.end {
            rx.deframer.cancel();
        }
    }
}

impl<R: fmt::Debug, C> fmt::Debug for ModeScheduler<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.end {
            End::Tx(_) => Role::Transmitter,
            End::Rx(_) => Role::Receiver,
        };
        f.debug_struct("ModeScheduler")
            .field("role", &role)
            .field("radio", &self.radio)
            .field("mode", &self.modes.target())
            .field("stats", self.log.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    use fifolink_frame::SyncState;
    use fifolink_transport::{AirChannel, MockRadio, MockRadioConfig, TransportError};

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::LinkError;

    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl ByteSink for SharedSink {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.0.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }
    }

    struct ClosedSink;

    impl ByteSink for ClosedSink {
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn config(frame_size: usize) -> LinkConfig {
        LinkConfig {
            frame_size,
            ..LinkConfig::default()
        }
    }

    #[test]
    fn begin_failure_is_fatal() {
        let radio = MockRadio::with_config(
            AirChannel::new(),
            MockRadioConfig {
                fail_begin: true,
                ..MockRadioConfig::default()
            },
        );
        let err = ModeScheduler::transmitter(
            radio,
            ManualClock::new(),
            config(4),
            VecDeque::<u8>::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LinkError::Transport(TransportError::BeginFailed(_))
        ));
    }

    #[test]
    fn invalid_config_is_rejected_before_begin() {
        let err = ModeScheduler::receiver(
            MockRadio::new(AirChannel::new()),
            ManualClock::new(),
            config(0),
            Vec::<u8>::new(),
        )
        .unwrap_err();
        assert!(matches!(err, LinkError::Frame(_)));
    }

    #[test]
    fn receiver_delivers_frame_and_reports_role() {
        let air = AirChannel::new();
        air.preload(&[0x37, 0x69, 0xAA, 0xBB, 0xCC, 0xDD]);
        let sink = SharedSink::default();
        let mut rx = ModeScheduler::receiver(
            MockRadio::new(air),
            ManualClock::new(),
            config(4),
            sink.clone(),
        )
        .unwrap();

        for _ in 0..20 {
            rx.step().unwrap();
        }

        assert_eq!(rx.role(), Role::Receiver);
        assert_eq!(*sink.0.borrow(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(rx.stats().frames_received, 1);
        assert!(rx.tx_framer().is_none());
        assert!(!rx.rx_deframer().unwrap().in_frame());
    }

    #[test]
    fn cancelled_frame_is_abandoned_mid_payload() {
        let air = AirChannel::new();
        air.preload(&[0x37, 0x69, 0xAA, 0xBB]);
        let sink = SharedSink::default();
        let mut rx = ModeScheduler::receiver(
            MockRadio::new(air.clone()),
            ManualClock::new(),
            config(4),
            sink.clone(),
        )
        .unwrap();

        for _ in 0..20 {
            rx.step().unwrap();
        }
        assert!(rx.rx_deframer().unwrap().in_frame());
        assert_eq!(rx.rx_deframer().unwrap().remaining_payload(), 2);

        rx.cancel_receive();
        let deframer = rx.rx_deframer().unwrap();
        assert_eq!(deframer.sync_state(), SyncState::Searching);
        assert_eq!(deframer.remaining_payload(), 0);

        // The tail of the abandoned frame is junk to a searching detector.
        air.preload(&[0xCC, 0x37, 0x69, 1, 2, 3, 4]);
        for _ in 0..20 {
            rx.step().unwrap();
        }

        assert_eq!(*sink.0.borrow(), vec![0xAA, 0xBB, 1, 2, 3, 4]);
        assert_eq!(rx.stats().frames_received, 1);
    }

    #[test]
    fn transmitter_flushes_tail_when_source_ends() {
        let air = AirChannel::with_capture();
        let mut tx = ModeScheduler::transmitter(
            MockRadio::new(air.clone()),
            ManualClock::new(),
            config(4),
            VecDeque::from(vec![1u8, 2, 3, 4, 5]),
        )
        .unwrap();

        // VecDeque never reports the end of input, so the tail waits for
        // the flush timeout.
        for _ in 0..50 {
            tx.step().unwrap();
        }
        assert_eq!(air.captured().unwrap().as_ref(), &[0x37, 0x69, 1, 2, 3, 4]);
        assert!(!tx.is_drained());

        tx.clock().advance(Duration::from_millis(100));
        for _ in 0..50 {
            tx.step().unwrap();
        }
        assert_eq!(
            air.captured().unwrap().as_ref(),
            &[0x37, 0x69, 1, 2, 3, 4, 0x37, 0x69, 5, 0, 0, 0]
        );
        assert_eq!(tx.stats().bytes_in, 5);
        assert_eq!(tx.stats().padded_frames, 1);
    }

    #[test]
    fn sink_errors_surface() {
        let air = AirChannel::new();
        air.preload(&[0x37, 0x69, 1, 2, 3, 4]);
        let mut rx = ModeScheduler::receiver(
            MockRadio::new(air),
            ManualClock::new(),
            config(4),
            ClosedSink,
        )
        .unwrap();

        let err = (0..20)
            .find_map(|_| rx.step().err())
            .expect("sink error should stop the link");
        assert!(matches!(err, LinkError::Io(_)));
    }

    #[test]
    fn stuck_mode_change_is_recorded() {
        let radio = MockRadio::with_config(
            AirChannel::new(),
            MockRadioConfig {
                mode_ready_polls: 1_000_000,
                ..MockRadioConfig::default()
            },
        );
        let clock = ManualClock::new();
        let mut rx =
            ModeScheduler::receiver(radio, clock.clone(), config(4), Vec::<u8>::new()).unwrap();

        // Idle is already in effect after begin; the Rx request never settles.
        for _ in 0..3 {
            rx.step().unwrap();
        }
        clock.advance(Duration::from_millis(50));
        rx.step().unwrap();

        assert_eq!(rx.stats().mode_timeouts, 1);
        assert!(rx
            .take_events()
            .contains(&LinkEvent::ModeTimeout {
                mode: RadioMode::Rx
            }));
    }

    #[test]
    fn overrun_is_recorded_once_per_episode() {
        let cfg = LinkConfig {
            buffer_frames: 1,
            ..config(4)
        };
        let mut tx = ModeScheduler::transmitter(
            MockRadio::new(AirChannel::new()),
            ManualClock::new(),
            cfg,
            (0..64u8).collect::<VecDeque<u8>>(),
        )
        .unwrap();

        for _ in 0..5 {
            tx.step().unwrap();
        }
        assert_eq!(tx.stats().overruns, 1);
        assert_eq!(tx.stats().dropped_bytes, 0);
    }

    #[test]
    fn run_stops_when_flag_clears() {
        let running = AtomicBool::new(false);
        let mut rx = ModeScheduler::receiver(
            MockRadio::new(AirChannel::new()),
            ManualClock::new(),
            config(4),
            Vec::<u8>::new(),
        )
        .unwrap();
        rx.run(&running).unwrap();
        assert_eq!(rx.stats(), &LinkStats::default());
    }
}
