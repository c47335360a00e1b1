use chrono::Utc;
use gt06_frame::{parse_frame, ChecksumPolicy, Frame, COMMAND};
use gt06_message::{decode, parse_command_frame, DecodeContext, TimestampEncoding};

use crate::cmd::DecodeArgs;
use crate::exit::{CliResult, DATA_INVALID, SUCCESS};
use crate::output::{decode_reason, print_command, print_decode_failure, print_event, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let policy = ChecksumPolicy::from(args.checksum);
    let timestamps = TimestampEncoding::from(args.timestamp_encoding);
    let mut failures = 0usize;

    for input in &args.frames {
        if let Err(reason) = decode_one(input, policy, timestamps, args.imei.as_deref(), format) {
            print_decode_failure(input, &reason, format);
            failures += 1;
        }
    }

    Ok(if failures == 0 { SUCCESS } else { DATA_INVALID })
}

fn decode_one(
    input: &str,
    policy: ChecksumPolicy,
    timestamps: TimestampEncoding,
    imei: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    let bytes = parse_hex(input)?;

    // Server commands carry CRC-ITU whatever the inbound policy says.
    let frame = match peek_protocol(&bytes) {
        Some(COMMAND) => parse_frame(&bytes, ChecksumPolicy::CrcItu),
        _ => parse_frame(&bytes, policy),
    }
    .map_err(|err| err.to_string())?;
    if frame.wire_size() != bytes.len() {
        return Err(format!(
            "{} trailing bytes after frame",
            bytes.len() - frame.wire_size()
        ));
    }

    print_frame(&frame, timestamps, imei, format)
}

fn print_frame(
    frame: &Frame,
    timestamps: TimestampEncoding,
    imei: Option<&str>,
    format: OutputFormat,
) -> Result<(), String> {
    if frame.protocol == COMMAND {
        let command = parse_command_frame(frame).map_err(|err| err.to_string())?;
        print_command(&command, &frame.raw, format);
        return Ok(());
    }

    let ctx = DecodeContext::new(Utc::now())
        .with_imei(imei)
        .with_timestamps(timestamps);
    let event = decode(frame, &ctx).map_err(|err| decode_reason(&err))?;
    print_event(&event, format);
    Ok(())
}

fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    if digits.is_empty() {
        return Err("empty input".to_string());
    }
    hex::decode(digits).map_err(|err| format!("invalid hex: {err}"))
}

fn peek_protocol(bytes: &[u8]) -> Option<u8> {
    bytes.get(3).copied()
}
