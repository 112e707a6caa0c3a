use std::io::Write;

use bytes::BytesMut;
use fifolink_frame::{decode_frame, FrameConfig};
use tracing::debug;

use crate::cmd::{open_output, read_all, DecodeArgs, LinkArgs};
use crate::exit::{frame_error, io_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{
    payload_preview, print_decode_report, report_writer, DecodeReport, FrameRecord, OutputFormat,
};

pub fn run(args: DecodeArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let config = link.resolve()?.frame_config();
    let wire = read_all(&args.wire_in)?;

    let mut payload_out = match &args.output {
        Some(path) => Some(open_output(path)?),
        None => None,
    };
    let payload_on_stdout = args.output.as_deref().is_some_and(super::is_stdio);

    let report = decode_capture(&wire, &config, |payload| match payload_out.as_mut() {
        Some(out) => out
            .write_all(payload)
            .map_err(|err| io_error("failed to write payload", err)),
        None => Ok(()),
    })?;

    if let Some(out) = payload_out.as_mut() {
        out.flush()
            .map_err(|err| io_error("failed to write payload", err))?;
    }
    print_decode_report(&report, format, &mut *report_writer(payload_on_stdout));

    if report.frames.is_empty() && !wire.is_empty() {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

/// Walk a capture frame by frame, handing each payload to `on_payload`.
fn decode_capture<F>(wire: &[u8], config: &FrameConfig, mut on_payload: F) -> CliResult<DecodeReport>
where
    F: FnMut(&[u8]) -> CliResult<()>,
{
    let mut src = BytesMut::from(wire);
    let mut frames = Vec::new();
    let mut position = 0usize;
    let mut skipped = 0usize;

    loop {
        let before = src.len();
        let decoded =
            decode_frame(&mut src, config).map_err(|err| frame_error("decode failed", err))?;
        let consumed = before - src.len();

        let Some(frame) = decoded else {
            skipped += consumed;
            break;
        };

        let junk = consumed - frame.wire_size();
        skipped += junk;
        let offset = position + junk;
        position += consumed;

        let trailing_pad = frame
            .payload
            .iter()
            .rev()
            .take_while(|&&b| b == config.pad_byte)
            .count();
        debug!(index = frames.len(), offset, junk, "frame decoded");
        on_payload(&frame.payload)?;

        frames.push(FrameRecord {
            index: frames.len(),
            offset,
            payload_size: frame.payload.len(),
            trailing_pad,
            preview: payload_preview(&frame.payload),
        });
    }

    Ok(DecodeReport {
        frames,
        skipped_bytes: skipped,
        leftover_bytes: src.len(),
    })
}
