//! Marker-delimited frame codec for GT06-family GPS trackers.
//!
//! Every frame on the wire looks like:
//! - A 2-byte start marker (`0x78 0x78`)
//! - A 1-byte length covering protocol id, payload, serial and checksum
//! - A 1-byte protocol id and the payload
//! - A 2-byte big-endian serial and a 2-byte checksum
//! - A 2-byte stop marker (`0x0D 0x0A`)
//!
//! Device frames and server acknowledgements carry an XOR checksum; server
//! commands carry CRC-ITU. Partial reads and line noise are handled here so
//! callers only ever see whole frames.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod protocol;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::Gt06Codec;
pub use checksum::{crc_itu, xor_checksum, Checksum, ChecksumPolicy};
pub use codec::{
    build_frame, decode_frame, encode_frame, parse_frame, Frame, FrameConfig, FRAME_OVERHEAD,
    MAX_PAYLOAD, START_MARKER, STOP_MARKER,
};
pub use error::{FrameError, Result};
pub use protocol::{
    protocol_name, ALARM, COMMAND, COMMAND_REPLY, GENERAL_RESPONSE, HEARTBEAT, LOGIN,
    TIMED_POSITION,
};
