//! TCP gateway for GT06 trackers.
//!
//! [`Server`] accepts device connections and runs one task per session.
//! Sessions decode and acknowledge inbound frames, publish events to an
//! [`EventSink`], and write commands fed from the per-IMEI [`CommandQueue`].
//! The queue survives reconnects; a background sweep resends commands whose
//! ack never arrived.

pub mod capture;
pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod script;
pub mod server;
mod session;
pub mod sink;
pub mod snapshot;

pub use capture::{Direction, FrameCapture};
pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{QueueError, Result, ScriptError, ServerError, SinkError, SnapshotError};
pub use queue::{
    AckOutcome, CommandQueue, Dispatch, EnqueueOutcome, QueueConfig, QueueEntry, QueueSnapshot,
    QueueState, QueueStatus, SnapshotEntry,
};
pub use registry::{ConnectionRegistry, SessionHandle, SessionId, SessionInfo};
pub use script::CommandScript;
pub use server::{Server, ServerState, Submitted};
pub use sink::{ChannelSink, EventSink, FanoutSink, JsonLinesSink, NullSink};
pub use snapshot::{load_snapshot, save_snapshot};
