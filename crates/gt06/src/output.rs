use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gt06_message::{DecodeError, Event, ParsedCommand};
use gt06_server::{EventSink, QueueStatus, SessionInfo, SinkError, Submitted};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_event(event: &Event, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(event),
        OutputFormat::Table => {
            let mut table = table(&["RECEIVED", "IMEI", "TYPE", "SERIAL", "DETAIL"]);
            table.add_row(vec![
                event.received_at.format("%H:%M:%S%.3f").to_string(),
                event.imei.clone().unwrap_or_else(|| "-".to_string()),
                event.kind_name().to_string(),
                event.serial.to_string(),
                event.summary(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} {} serial={} device_time={} {}",
                event.received_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                event.imei.as_deref().unwrap_or("-"),
                event.kind_name(),
                event.serial,
                event.device_time.format("%Y-%m-%dT%H:%M:%SZ"),
                event.summary()
            );
        }
    }
}

#[derive(Serialize)]
struct CommandOutput<'a> {
    serial: u16,
    server_flag: u32,
    command: &'a str,
    frame: String,
}

/// A 0x80 frame, either parsed from a capture or freshly encoded.
pub fn print_command(command: &ParsedCommand, frame: &[u8], format: OutputFormat) {
    let frame = hex::encode_upper(frame);
    match format {
        OutputFormat::Json => print_json(&CommandOutput {
            serial: command.serial,
            server_flag: command.server_flag,
            command: &command.text,
            frame,
        }),
        OutputFormat::Table => {
            let mut table = table(&["SERIAL", "FLAG", "COMMAND", "FRAME"]);
            table.add_row(vec![
                command.serial.to_string(),
                format!("0x{:08X}", command.server_flag),
                command.text.clone(),
                frame,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "command serial={} flag=0x{:08X} text={:?} frame={frame}",
            command.serial, command.server_flag, command.text
        ),
    }
}

#[derive(Serialize)]
struct DecodeFailure<'a> {
    input: &'a str,
    error: String,
}

pub fn print_decode_failure(input: &str, reason: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DecodeFailure {
            input,
            error: reason.to_string(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("invalid {input}: {reason}"),
    }
}

pub fn decode_reason(err: &DecodeError) -> String {
    match err {
        DecodeError::UnknownProtocol(_) => format!("{err} (acked, no event)"),
        other => other.to_string(),
    }
}

pub fn print_sessions(sessions: &[SessionInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(sessions),
        OutputFormat::Table => {
            let mut table = table(&["IMEI", "SESSION", "PEER", "CONNECTED"]);
            for session in sessions {
                table.add_row(vec![
                    session.imei.clone(),
                    session.session.to_string(),
                    session.peer.to_string(),
                    session.connected_at.to_rfc3339(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if sessions.is_empty() {
                println!("no devices connected");
            }
            for session in sessions {
                println!(
                    "{} {} from {} since {}",
                    session.imei,
                    session.session,
                    session.peer,
                    session.connected_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
}

pub fn print_queue_status(entries: &[QueueStatus], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(entries),
        OutputFormat::Table => {
            let mut table = table(&[
                "IMEI", "STATE", "PROGRESS", "CURRENT", "ATTEMPTS", "ONLINE", "SENT",
            ]);
            for entry in entries {
                table.add_row(vec![
                    entry.imei.clone(),
                    format!("{:?}", entry.state),
                    format!("{}/{}", entry.cursor, entry.total),
                    entry.current.clone().unwrap_or_default(),
                    entry.attempts.to_string(),
                    if entry.attached { "yes" } else { "no" }.to_string(),
                    entry
                        .sent_ms_ago
                        .map(|ms| format!("{ms} ms ago"))
                        .unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if entries.is_empty() {
                println!("no queued commands");
            }
            for entry in entries {
                println!(
                    "{} {:?} {}/{} current={} attempts={} online={}",
                    entry.imei,
                    entry.state,
                    entry.cursor,
                    entry.total,
                    entry.current.as_deref().unwrap_or("-"),
                    entry.attempts,
                    entry.attached
                );
            }
        }
    }
}

#[derive(Serialize)]
struct SubmittedOutput<'a> {
    imei: &'a str,
    queued: &'a str,
    outcome: String,
    connected: bool,
    dispatched: bool,
}

pub fn print_submitted(imei: &str, queued: &str, submitted: &Submitted, format: OutputFormat) {
    let outcome = format!("{:?}", submitted.outcome).to_lowercase();
    match format {
        OutputFormat::Json => print_json(&SubmittedOutput {
            imei,
            queued,
            outcome,
            connected: submitted.connected,
            dispatched: submitted.dispatched,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            let delivery = match (submitted.connected, submitted.dispatched) {
                (_, true) => "sent",
                (true, false) => "waiting for the current command",
                (false, false) => "waiting for login",
            };
            println!("{imei}: {queued} {outcome}, {delivery}");
        }
    }
}

/// Prints every event to stdout as it arrives.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    format: OutputFormat,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl EventSink for ConsoleSink {
    fn publish(&self, event: &Event) -> Result<(), SinkError> {
        print_event(event, self.format);
        Ok(())
    }
}
