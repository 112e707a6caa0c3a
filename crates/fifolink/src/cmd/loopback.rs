use std::sync::atomic::Ordering;

use fifolink_link::{ModeScheduler, Role, SystemClock};
use fifolink_transport::{AirChannel, MockRadio, ThreadedSource, WriterSink};
use tracing::{debug, info};

use crate::cmd::{
    install_ctrlc_handler, is_stdio, open_input, open_output, receiver_caught_up, write_all,
    LinkArgs, LoopbackArgs,
};
use crate::exit::{link_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_run_report, report_writer, EndReport, OutputFormat, RunReport};

pub fn run(args: LoopbackArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let config = link.resolve()?;
    let frame_size = config.frame_size;
    let clock = SystemClock::new();

    let air = AirChannel::with_capture();
    let source = ThreadedSource::spawn(open_input(&args.input)?)
        .map_err(|err| transport_error("failed to start input reader", err))?;
    let mut tx = ModeScheduler::transmitter(
        MockRadio::new(air.clone()),
        clock,
        config.clone(),
        source,
    )
    .map_err(|err| link_error("transmitter start failed", err))?;

    let sink = WriterSink::new(open_output(&args.output)?);
    let mut rx = ModeScheduler::receiver(MockRadio::new(air.clone()), clock, config, sink)
        .map_err(|err| link_error("receiver start failed", err))?;

    let running = install_ctrlc_handler()?;
    let mut steps = 0u64;
    while running.load(Ordering::SeqCst) {
        tx.step().map_err(|err| link_error("transmit failed", err))?;
        rx.step().map_err(|err| link_error("receive failed", err))?;
        steps += 1;
        if tx.is_drained() && receiver_caught_up(&rx, &air) {
            break;
        }
    }
    debug!(steps, "loopback finished");

    let wire = air.captured().unwrap_or_default();
    if let Some(path) = &args.wire_out {
        write_all(path, &wire)?;
        info!(path = %path.display(), bytes = wire.len(), "wire capture written");
    }

    let report = RunReport {
        command: "loopback",
        frame_size,
        wire_bytes: wire.len(),
        interrupted: !running.load(Ordering::SeqCst),
        ends: vec![
            EndReport {
                role: Role::Transmitter,
                stats: *tx.stats(),
            },
            EndReport {
                role: Role::Receiver,
                stats: *rx.stats(),
            },
        ],
    };
    print_run_report(&report, format, &mut *report_writer(is_stdio(&args.output)));

    Ok(SUCCESS)
}
