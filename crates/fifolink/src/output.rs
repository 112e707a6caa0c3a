use std::io::{self, IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use fifolink_link::{LinkConfig, LinkStats, Role};
use serde::Serialize;
use serde_json::Value;

const PREVIEW_BYTES: usize = 8;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Counters from one end of a run.
#[derive(Debug, Serialize)]
pub struct EndReport {
    pub role: Role,
    pub stats: LinkStats,
}

/// Summary printed after `tx`, `rx`, and `loopback`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub command: &'static str,
    pub frame_size: usize,
    pub wire_bytes: usize,
    pub interrupted: bool,
    pub ends: Vec<EndReport>,
}

/// One frame found by `decode`.
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    pub index: usize,
    pub offset: usize,
    pub payload_size: usize,
    pub trailing_pad: usize,
    pub preview: String,
}

#[derive(Debug, Serialize)]
pub struct DecodeReport {
    pub frames: Vec<FrameRecord>,
    pub skipped_bytes: usize,
    pub leftover_bytes: usize,
}

/// Where command output goes. Stdout unless it already carries payload.
pub fn report_writer(payload_on_stdout: bool) -> Box<dyn Write> {
    if payload_on_stdout {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    }
}

pub fn print_run_report(report: &RunReport, format: OutputFormat, out: &mut dyn Write) {
    match format {
        OutputFormat::Json => write_json(out, report),
        OutputFormat::Table => {
            let mut header = vec!["COUNTER".to_string()];
            header.extend(report.ends.iter().map(|end| end.role.to_string().to_uppercase()));

            let columns: Vec<Vec<(String, String)>> = report
                .ends
                .iter()
                .map(|end| counter_rows(&end.stats))
                .collect();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(header);
            if let Some(first) = columns.first() {
                for (row, (name, _)) in first.iter().enumerate() {
                    let mut cells = vec![name.clone()];
                    cells.extend(columns.iter().map(|col| col[row].1.clone()));
                    table.add_row(cells);
                }
            }
            let _ = writeln!(out, "{table}");
            let _ = writeln!(
                out,
                "frame size {} bytes, {} bytes on the wire{}",
                report.frame_size,
                report.wire_bytes,
                if report.interrupted {
                    " (interrupted)"
                } else {
                    ""
                }
            );
        }
        OutputFormat::Pretty => {
            let _ = writeln!(
                out,
                "{}: frame_size={} wire_bytes={} interrupted={}",
                report.command, report.frame_size, report.wire_bytes, report.interrupted
            );
            for end in &report.ends {
                let _ = writeln!(out, "  {}:", end.role);
                for (name, value) in counter_rows(&end.stats) {
                    if value != "0" {
                        let _ = writeln!(out, "    {name:<16} {value}");
                    }
                }
            }
        }
    }
}

pub fn print_decode_report(report: &DecodeReport, format: OutputFormat, out: &mut dyn Write) {
    match format {
        OutputFormat::Json => write_json(out, report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "OFFSET", "SIZE", "PAD", "PAYLOAD"]);
            for frame in &report.frames {
                table.add_row(vec![
                    frame.index.to_string(),
                    frame.offset.to_string(),
                    frame.payload_size.to_string(),
                    frame.trailing_pad.to_string(),
                    frame.preview.clone(),
                ]);
            }
            let _ = writeln!(out, "{table}");
            let _ = writeln!(
                out,
                "{} frames, {} bytes skipped, {} bytes left over",
                report.frames.len(),
                report.skipped_bytes,
                report.leftover_bytes
            );
        }
        OutputFormat::Pretty => {
            for frame in &report.frames {
                let _ = writeln!(
                    out,
                    "frame {} at {}: {} bytes ({} pad) {}",
                    frame.index, frame.offset, frame.payload_size, frame.trailing_pad, frame.preview
                );
            }
            let _ = writeln!(
                out,
                "skipped={} leftover={}",
                report.skipped_bytes, report.leftover_bytes
            );
        }
    }
}

pub fn print_config(config: &LinkConfig, format: OutputFormat, out: &mut dyn Write) {
    match format {
        OutputFormat::Json => write_json(out, config),
        OutputFormat::Pretty => {
            let text = serde_json::to_string_pretty(config).unwrap_or_else(|_| "{}".to_string());
            let _ = writeln!(out, "{text}");
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SETTING", "VALUE"]);
            for (name, value) in object_rows(config) {
                table.add_row(vec![name, value]);
            }
            let _ = writeln!(out, "{table}");
        }
    }
}

/// Hex preview of the first few payload bytes.
pub fn payload_preview(payload: &[u8]) -> String {
    let mut preview = payload
        .iter()
        .take(PREVIEW_BYTES)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    if payload.len() > PREVIEW_BYTES {
        preview.push_str(" ..");
    }
    preview
}

pub fn format_sync(sync: [u8; 2]) -> String {
    format!("{:02x}:{:02x}", sync[0], sync[1])
}

fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) {
    let text = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let _ = writeln!(out, "{text}");
}

fn counter_rows(stats: &LinkStats) -> Vec<(String, String)> {
    object_rows(stats)
}

fn object_rows<T: Serialize>(value: &T) -> Vec<(String, String)> {
    let Ok(Value::Object(map)) = serde_json::to_value(value) else {
        return Vec::new();
    };
    map.into_iter()
        .map(|(name, value)| {
            let shown = match (name.as_str(), &value) {
                ("sync", Value::Array(bytes)) if bytes.len() == 2 => {
                    let byte = |i: usize| bytes[i].as_u64().unwrap_or(0) as u8;
                    format_sync([byte(0), byte(1)])
                }
                (_, Value::String(s)) => s.clone(),
                (_, other) => other.to_string(),
            };
            (name, shown)
        })
        .collect()
}
