//! Operator console: one command per stdin line.
//!
//! ```text
//! IMEI:COMMAND     queue COMMAND for IMEI
//! !IMEI:COMMAND    replace whatever IMEI has pending
//! @                replay the script to every connected device
//! @IMEI            replay the script to one device
//! cancel IMEI      drop everything pending for IMEI
//! list             connected devices
//! status           queue progress
//! ```

use std::sync::Arc;

use gt06_server::ServerState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::exit::{CliError, CliResult};
use crate::output::{print_queue_status, print_sessions, print_submitted, OutputFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Submit {
        imei: String,
        command: String,
        override_busy: bool,
    },
    Replay {
        imei: Option<String>,
    },
    Cancel {
        imei: String,
    },
    List,
    Status,
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> CliResult<Option<OperatorCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match line {
        "list" => return Ok(Some(OperatorCommand::List)),
        "status" => return Ok(Some(OperatorCommand::Status)),
        _ => {}
    }

    if let Some(rest) = line.strip_prefix("cancel ") {
        let imei = check_imei(rest.trim())?;
        return Ok(Some(OperatorCommand::Cancel { imei }));
    }

    if let Some(rest) = line.strip_prefix('@') {
        let rest = rest.trim();
        let imei = if rest.is_empty() {
            None
        } else {
            Some(check_imei(rest)?)
        };
        return Ok(Some(OperatorCommand::Replay { imei }));
    }

    let (override_busy, line) = match line.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let Some((imei, command)) = line.split_once(':') else {
        return Err(CliError::usage(format!(
            "unrecognized input {line:?} (expected IMEI:COMMAND, @, @IMEI, cancel IMEI, list or status)"
        )));
    };
    let imei = check_imei(imei.trim())?;
    let command = command.trim();
    if command.is_empty() {
        return Err(CliError::usage(format!("no command given for {imei}")));
    }
    Ok(Some(OperatorCommand::Submit {
        imei,
        command: command.to_string(),
        override_busy,
    }))
}

fn check_imei(imei: &str) -> CliResult<String> {
    let numeric = !imei.is_empty() && imei.bytes().all(|b| b.is_ascii_digit());
    if !numeric || imei.bytes().all(|b| b == b'0') {
        return Err(CliError::usage(format!("invalid IMEI {imei:?}")));
    }
    Ok(imei.to_string())
}

pub fn execute(state: &ServerState, command: OperatorCommand, format: OutputFormat) {
    match command {
        OperatorCommand::Submit {
            imei,
            command,
            override_busy,
        } => match state.submit(&imei, &command, override_busy) {
            Ok(submitted) => print_submitted(&imei, &command, &submitted, format),
            Err(err) => eprintln!("error: {err}"),
        },
        OperatorCommand::Replay { imei } => {
            if state.script().is_empty() {
                eprintln!("error: no command script loaded");
                return;
            }
            let results = state.replay_script(imei.as_deref());
            if results.is_empty() {
                eprintln!("error: no devices connected");
            }
            let label = format!("script ({} commands)", state.script().len());
            for (imei, result) in results {
                match result {
                    Ok(submitted) => print_submitted(&imei, &label, &submitted, format),
                    Err(err) => eprintln!("error: {err}"),
                }
            }
        }
        OperatorCommand::Cancel { imei } => {
            if !state.cancel(&imei) {
                eprintln!("error: nothing queued for {imei}");
            }
        }
        OperatorCommand::List => print_sessions(&state.sessions(), format),
        OperatorCommand::Status => print_queue_status(&state.queue_status(), format),
    }
}

/// Read console lines from stdin until it closes.
pub async fn run(state: Arc<ServerState>, format: OutputFormat) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Ok(Some(command)) => execute(&state, command, format),
                Ok(None) => {}
                Err(err) => eprintln!("error: {err}"),
            },
            Ok(None) => {
                debug!("operator input closed");
                return;
            }
            Err(err) => {
                warn!(%err, "operator input failed");
                return;
            }
        }
    }
}
