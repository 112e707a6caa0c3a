use std::sync::atomic::Ordering;

use fifolink_link::{ModeScheduler, Role, SystemClock};
use fifolink_transport::{AirChannel, MockRadio, ThreadedSource};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, is_stdio, open_input, write_all, LinkArgs, TxArgs};
use crate::exit::{link_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_run_report, report_writer, EndReport, OutputFormat, RunReport};

pub fn run(args: TxArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let config = link.resolve()?;
    let frame_size = config.frame_size;

    let source = ThreadedSource::spawn(open_input(&args.input)?)
        .map_err(|err| transport_error("failed to start input reader", err))?;
    let air = AirChannel::with_capture();
    let mut tx = ModeScheduler::transmitter(
        MockRadio::new(air.clone()),
        SystemClock::new(),
        config,
        source,
    )
    .map_err(|err| link_error("radio start failed", err))?;

    let running = install_ctrlc_handler()?;
    tx.run_to_completion(&running)
        .map_err(|err| link_error("transmit failed", err))?;
    let interrupted = !running.load(Ordering::SeqCst) && !tx.is_drained();

    let wire = air.captured().unwrap_or_default();
    write_all(&args.wire_out, &wire)?;
    info!(
        frames = tx.stats().frames_sent,
        wire_bytes = wire.len(),
        "wire capture written"
    );

    let report = RunReport {
        command: "tx",
        frame_size,
        wire_bytes: wire.len(),
        interrupted,
        ends: vec![EndReport {
            role: Role::Transmitter,
            stats: *tx.stats(),
        }],
    };
    print_run_report(&report, format, &mut *report_writer(is_stdio(&args.wire_out)));

    Ok(SUCCESS)
}
