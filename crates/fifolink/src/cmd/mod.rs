use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Subcommand, ValueEnum};
use fifolink_frame::OverrunPolicy;
use fifolink_link::{Clock, LinkConfig, ModeScheduler};
use fifolink_transport::{AirChannel, MockRadio, RadioMode};

use crate::exit::{io_error, link_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod config;
pub mod decode;
pub mod loopback;
pub mod rx;
pub mod tx;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Frame an input stream through a simulated radio and capture the air bytes.
    Tx(TxArgs),
    /// Replay a wire capture into a simulated receiver.
    Rx(RxArgs),
    /// Run a transmitter and a receiver over one simulated air channel.
    Loopback(LoopbackArgs),
    /// Decode a wire capture offline and list its frames.
    Decode(DecodeArgs),
    /// Print the effective link configuration.
    Config,
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Tx(args) => tx::run(args, link, format),
        Command::Rx(args) => rx::run(args, link, format),
        Command::Loopback(args) => loopback::run(args, link, format),
        Command::Decode(args) => decode::run(args, link, format),
        Command::Config => config::run(link, format),
        Command::Version(args) => version::run(args),
    }
}

/// Link settings shared by every subcommand. Flags override the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct LinkArgs {
    /// JSON link configuration file.
    #[arg(long, value_name = "FILE", global = true, env = "FIFOLINK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Payload bytes per frame.
    #[arg(long, value_name = "BYTES", global = true)]
    pub frame_size: Option<usize>,
    /// Sync marker as two hex bytes (e.g. 37:69).
    #[arg(long, value_name = "HEX:HEX", global = true, value_parser = parse_sync)]
    pub sync: Option<[u8; 2]>,
    /// Partial transmit frame flush timeout (e.g. 100ms, 1s).
    #[arg(long, value_name = "DURATION", global = true, value_parser = parse_millis)]
    pub flush_timeout: Option<u32>,
    /// Receive link timeout (e.g. 2100ms).
    #[arg(long, value_name = "DURATION", global = true, value_parser = parse_millis)]
    pub link_timeout: Option<u32>,
    /// What to do when the input outruns the link.
    #[arg(long, value_name = "POLICY", global = true)]
    pub overrun_policy: Option<PolicyArg>,
    /// Cycle the receiver through idle after every frame.
    #[arg(long, global = true)]
    pub cycle_idle: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum PolicyArg {
    Reject,
    DropNewest,
    DropOldest,
}

impl From<PolicyArg> for OverrunPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Reject => OverrunPolicy::Reject,
            PolicyArg::DropNewest => OverrunPolicy::DropNewest,
            PolicyArg::DropOldest => OverrunPolicy::DropOldest,
        }
    }
}

impl LinkArgs {
    /// The config file (or defaults) with command-line overrides applied.
    pub fn resolve(&self) -> CliResult<LinkConfig> {
        let mut config = match &self.config {
            Some(path) => LinkConfig::from_json_file(path)
                .map_err(|err| link_error("failed to load config", err))?,
            None => LinkConfig::default(),
        };

        if let Some(frame_size) = self.frame_size {
            config.frame_size = frame_size;
        }
        if let Some(sync) = self.sync {
            config.sync = sync;
        }
        if let Some(ms) = self.flush_timeout {
            config.flush_timeout_ms = ms;
        }
        if let Some(ms) = self.link_timeout {
            config.link_timeout_ms = ms;
        }
        if let Some(policy) = self.overrun_policy {
            config.overrun_policy = policy.into();
        }
        if self.cycle_idle {
            config.cycle_idle_after_frame = true;
        }

        config
            .validate()
            .map_err(|err| link_error("invalid link configuration", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct TxArgs {
    /// Input file, or - for stdin.
    #[arg(long, short = 'i', default_value = "-")]
    pub input: PathBuf,
    /// Where to write the captured air bytes, or - for stdout.
    #[arg(long, value_name = "FILE")]
    pub wire_out: PathBuf,
}

#[derive(Args, Debug)]
pub struct RxArgs {
    /// Wire capture to replay, or - for stdin.
    #[arg(long, value_name = "FILE")]
    pub wire_in: PathBuf,
    /// Where to write the received payload stream, or - for stdout.
    #[arg(long, short = 'o', default_value = "-")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Input file, or - for stdin.
    #[arg(long, short = 'i', default_value = "-")]
    pub input: PathBuf,
    /// Where to write the received payload stream, or - for stdout.
    #[arg(long, short = 'o', default_value = "-")]
    pub output: PathBuf,
    /// Also save the air bytes as a wire capture.
    #[arg(long, value_name = "FILE")]
    pub wire_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire capture to decode, or - for stdin.
    #[arg(long, value_name = "FILE")]
    pub wire_in: PathBuf,
    /// Write the concatenated payloads here, or - for stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn open_input(path: &Path) -> CliResult<Box<dyn Read + Send>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdin()));
    }
    let file = File::open(path)
        .map_err(|err| io_error(&format!("failed to open {}", path.display()), err))?;
    Ok(Box::new(file))
}

pub fn open_output(path: &Path) -> CliResult<Box<dyn Write>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdout()));
    }
    let file = File::create(path)
        .map_err(|err| io_error(&format!("failed to create {}", path.display()), err))?;
    Ok(Box::new(file))
}

pub fn read_all(path: &Path) -> CliResult<Vec<u8>> {
    if is_stdio(path) {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| io_error("failed to read stdin", err))?;
        return Ok(buf);
    }
    fs::read(path).map_err(|err| io_error(&format!("failed to read {}", path.display()), err))
}

pub fn write_all(path: &Path, data: &[u8]) -> CliResult<()> {
    let mut out = open_output(path)?;
    out.write_all(data)
        .and_then(|()| out.flush())
        .map_err(|err| io_error(&format!("failed to write {}", path.display()), err))
}

/// The receiver has taken everything off the air and out of its FIFO.
pub fn receiver_caught_up<C: Clock>(rx: &ModeScheduler<MockRadio, C>, air: &AirChannel) -> bool {
    air.in_flight() == 0 && rx.radio().fifo_len() == 0 && rx.modes().in_mode(RadioMode::Rx)
}

/// Step a receiver until it has consumed everything on `air`.
pub fn drain_receiver<C: Clock>(
    rx: &mut ModeScheduler<MockRadio, C>,
    air: &AirChannel,
    running: &AtomicBool,
) -> CliResult<()> {
    while running.load(Ordering::SeqCst) && !receiver_caught_up(rx, air) {
        rx.step().map_err(|err| link_error("receive failed", err))?;
    }
    Ok(())
}

pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

fn parse_sync(input: &str) -> Result<[u8; 2], String> {
    let (first, second) = input
        .split_once(':')
        .ok_or_else(|| format!("expected two hex bytes like 37:69, got {input:?}"))?;
    let byte = |part: &str| {
        let digits = part.trim().trim_start_matches("0x");
        u8::from_str_radix(digits, 16).map_err(|_| format!("invalid hex byte: {part:?}"))
    };
    Ok([byte(first)?, byte(second)?])
}

fn parse_millis(input: &str) -> Result<u32, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, scale) = if let Some(num) = input.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, 1000)
    } else {
        (input, 1)
    };

    let value: u32 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }
    value
        .checked_mul(scale)
        .ok_or_else(|| format!("duration too large: {input}"))
}
