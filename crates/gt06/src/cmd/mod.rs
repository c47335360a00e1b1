use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use gt06_frame::ChecksumPolicy;
use gt06_message::TimestampEncoding;

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode_command;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept tracker connections and print decoded events.
    Serve(ServeArgs),
    /// Decode captured frames given as hex.
    Decode(DecodeArgs),
    /// Print the 0x80 frame for a device command.
    EncodeCommand(EncodeCommandArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::EncodeCommand(args) => encode_command::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// Inbound checksum policy.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ChecksumArg {
    Xor,
    CrcItu,
    Either,
}

impl From<ChecksumArg> for ChecksumPolicy {
    fn from(arg: ChecksumArg) -> Self {
        match arg {
            ChecksumArg::Xor => ChecksumPolicy::Xor,
            ChecksumArg::CrcItu => ChecksumPolicy::CrcItu,
            ChecksumArg::Either => ChecksumPolicy::Either,
        }
    }
}

/// How device clocks are read.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum TimestampArg {
    Bcd,
    Binary,
}

impl From<TimestampArg> for TimestampEncoding {
    fn from(arg: TimestampArg) -> Self {
        match arg {
            TimestampArg::Bcd => TimestampEncoding::Bcd,
            TimestampArg::Binary => TimestampEncoding::Binary,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "GT06_BIND", default_value = "0.0.0.0:9117")]
    pub bind: SocketAddr,
    /// Command script replayed with `@` (one command per line).
    #[arg(long, env = "GT06_SCRIPT", value_name = "FILE")]
    pub script: Option<PathBuf>,
    /// Append decoded events to FILE as JSON lines.
    #[arg(long, env = "GT06_EVENTS", value_name = "FILE")]
    pub events: Option<PathBuf>,
    /// Append every frame in both directions to FILE.
    #[arg(long, env = "GT06_CAPTURE", value_name = "FILE")]
    pub capture: Option<PathBuf>,
    /// Load queue progress from FILE at startup and save it on shutdown.
    #[arg(long, env = "GT06_SNAPSHOT", value_name = "FILE")]
    pub snapshot: Option<PathBuf>,
    /// Resend a command when no reply arrives within this time (e.g. 15s).
    #[arg(long, default_value = "15s")]
    pub ack_timeout: String,
    /// Pause between a reply and the next queued command.
    #[arg(long, default_value = "2s")]
    pub settle: String,
    /// How often pending acks are checked.
    #[arg(long, default_value = "5s")]
    pub sweep_interval: String,
    /// Close connections silent for this long.
    #[arg(long)]
    pub idle_timeout: Option<String>,
    /// Give up on a command after N sends. Default: retry until acked.
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,
    /// Checksum accepted on device frames.
    #[arg(long, value_enum, default_value = "xor")]
    pub checksum: ChecksumArg,
    /// Encoding of device timestamps.
    #[arg(long, value_enum, default_value = "bcd")]
    pub timestamp_encoding: TimestampArg,
    /// Read operator commands from stdin.
    #[arg(long)]
    pub operator: bool,
    /// Queue the script for each device the first time it logs in.
    #[arg(long, requires = "script")]
    pub auto_script: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frames as hex; spaces are ignored.
    #[arg(required = true, value_name = "HEX")]
    pub frames: Vec<String>,
    /// IMEI to attribute non-login frames to.
    #[arg(long)]
    pub imei: Option<String>,
    /// Checksum accepted on input frames. Command frames always use CRC-ITU.
    #[arg(long, value_enum, default_value = "either")]
    pub checksum: ChecksumArg,
    /// Encoding of device timestamps.
    #[arg(long, value_enum, default_value = "bcd")]
    pub timestamp_encoding: TimestampArg,
}

#[derive(Args, Debug)]
pub struct EncodeCommandArgs {
    /// ASCII command text, e.g. `RELAY,1#`.
    pub text: String,
    /// Serial number to stamp on the frame.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub serial: u16,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `15s`, `2m` or bare seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, scale_ms) = if let Some(num) = input.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = input.strip_suffix('m') {
        (num, 60_000)
    } else {
        (input, 1_000)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }
    value
        .checked_mul(scale_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| CliError::usage(format!("duration out of range: {input}")))
}
