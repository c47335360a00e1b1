//! Semantic layer over GT06 frames.
//!
//! Turns a validated [`gt06_frame::Frame`] into a typed [`Event`], builds the
//! acknowledgements devices expect, and encodes outbound text commands.

pub mod ack;
pub mod command;
pub mod course;
pub mod decoder;
pub mod error;
pub mod event;
pub mod status;
pub mod timestamp;

pub use ack::{build_ack, requires_ack};
pub use command::{
    encode_command, parse_command_frame, CommandEncoder, ParsedCommand, SerialCounter,
    MAX_COMMAND_LEN, SERVER_FLAG,
};
pub use course::CourseField;
pub use decoder::{decode, DecodeContext};
pub use error::{DecodeError, EncodeError, Result};
pub use event::{
    AlarmReport, CellTower, CommandAck, Event, EventKind, GpsFix, Heartbeat, Login, PositionReport,
};
pub use status::{AccDuration, AlarmCode, PowerLevel, ReportMode, TerminalAlarm, TerminalStatus};
pub use timestamp::{decode_timestamp, parse_timestamp, sentinel, TimestampEncoding};
