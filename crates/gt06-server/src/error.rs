use std::net::SocketAddr;
use std::path::PathBuf;

use gt06_message::EncodeError;

/// Errors that end the server or a startup step.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Listener I/O error.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Rejections from the command queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A command is in flight and the caller did not ask to override it.
    #[error("IMEI {imei} is awaiting an ack for {command:?}; override to replace")]
    Busy { imei: String, command: String },

    #[error("no commands given")]
    Empty,

    #[error("invalid command {command:?}: {source}")]
    InvalidCommand {
        command: String,
        source: EncodeError,
    },
}

/// Failures writing events or captured frames.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The receiving side of a channel sink is gone.
    #[error("sink closed")]
    Closed,
}

/// Failures loading a command script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("script line {line}: {source}")]
    InvalidCommand { line: usize, source: EncodeError },
}

/// Failures loading or saving a queue snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid snapshot {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ServerError>;
