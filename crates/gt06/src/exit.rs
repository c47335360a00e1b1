use std::fmt;
use std::io;

use gt06_message::EncodeError;
use gt06_server::{QueueError, ScriptError, ServerError, SinkError, SnapshotError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn encode_error(context: &str, err: EncodeError) -> CliError {
    match err {
        EncodeError::NonAscii | EncodeError::TooLong { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        EncodeError::Frame(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn script_error(err: ScriptError) -> CliError {
    match err {
        ScriptError::Read { path, source } => {
            io_error(&format!("failed to load script {}", path.display()), source)
        }
        ScriptError::InvalidCommand { .. } => CliError::new(DATA_INVALID, err.to_string()),
    }
}

pub fn snapshot_error(err: SnapshotError) -> CliError {
    match err {
        SnapshotError::Io { source, path } => {
            io_error(&format!("snapshot {}", path.display()), source)
        }
        SnapshotError::Json { .. } => CliError::new(DATA_INVALID, err.to_string()),
    }
}

pub fn sink_error(context: &str, err: SinkError) -> CliError {
    match err {
        SinkError::Io(source) => io_error(context, source),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn server_error(err: ServerError) -> CliError {
    match err {
        ServerError::Bind { addr, source } => {
            let code = match source.kind() {
                io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
                _ => TRANSPORT_ERROR,
            };
            CliError::new(code, format!("failed to bind {addr}: {source}"))
        }
        ServerError::Io(source) => {
            CliError::new(TRANSPORT_ERROR, format!("listener error: {source}"))
        }
        ServerError::Queue(err) => queue_error(err),
        ServerError::Sink(err) => sink_error("event sink", err),
        ServerError::Script(err) => script_error(err),
        ServerError::Snapshot(err) => snapshot_error(err),
    }
}

pub fn queue_error(err: QueueError) -> CliError {
    match err {
        QueueError::InvalidCommand { .. } => CliError::new(DATA_INVALID, err.to_string()),
        QueueError::Busy { .. } | QueueError::Empty => CliError::new(FAILURE, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;

    #[test]
    fn bind_failures_are_transport_errors() {
        let addr: SocketAddr = "127.0.0.1:9117".parse().unwrap();
        let err = server_error(ServerError::Bind {
            addr,
            source: io::Error::from(io::ErrorKind::AddrInUse),
        });
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("127.0.0.1:9117"));
    }

    #[test]
    fn bind_permission_denied_maps_to_permission_code() {
        let addr: SocketAddr = "0.0.0.0:80".parse().unwrap();
        let err = server_error(ServerError::Bind {
            addr,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        });
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn invalid_script_lines_are_data_errors() {
        let err = script_error(ScriptError::InvalidCommand {
            line: 3,
            source: EncodeError::NonAscii,
        });
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("line 3"));
    }

    #[test]
    fn missing_script_is_a_usage_error() {
        let err = script_error(ScriptError::Read {
            path: "/nonexistent/script.txt".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("/nonexistent/script.txt"));
    }

    #[test]
    fn busy_queue_is_a_plain_failure() {
        let err = queue_error(QueueError::Busy {
            imei: "865209077286178".into(),
            command: "WHERE#".into(),
        });
        assert_eq!(err.code, FAILURE);
    }
}
