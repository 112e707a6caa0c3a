use std::sync::atomic::Ordering;

use fifolink_link::{ModeScheduler, Role, SystemClock};
use fifolink_transport::{AirChannel, MockRadio, WriterSink};
use tracing::warn;

use crate::cmd::{
    drain_receiver, install_ctrlc_handler, is_stdio, open_output, read_all, LinkArgs, RxArgs,
};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_run_report, report_writer, EndReport, OutputFormat, RunReport};

pub fn run(args: RxArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let config = link.resolve()?;
    let frame_size = config.frame_size;

    let wire = read_all(&args.wire_in)?;
    let air = AirChannel::new();
    air.preload(&wire);

    let sink = WriterSink::new(open_output(&args.output)?);
    let mut rx = ModeScheduler::receiver(
        MockRadio::new(air.clone()),
        SystemClock::new(),
        config,
        sink,
    )
    .map_err(|err| link_error("radio start failed", err))?;

    let running = install_ctrlc_handler()?;
    drain_receiver(&mut rx, &air, &running)?;

    if let Some(deframer) = rx.rx_deframer() {
        if deframer.in_frame() {
            warn!(
                missing = deframer.remaining_payload(),
                "capture ended inside a frame"
            );
        }
    }

    let report = RunReport {
        command: "rx",
        frame_size,
        wire_bytes: wire.len(),
        interrupted: !running.load(Ordering::SeqCst),
        ends: vec![EndReport {
            role: Role::Receiver,
            stats: *rx.stats(),
        }],
    };
    print_run_report(&report, format, &mut *report_writer(is_stdio(&args.output)));

    Ok(SUCCESS)
}
