//! Outbound 0x80 commands and the serial counter they draw from.

use std::sync::atomic::{AtomicU16, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use gt06_frame::{encode_frame, protocol, Checksum, Frame, MAX_PAYLOAD};

use crate::error::{DecodeError, EncodeError};

/// Constant written after the command-length byte.
pub const SERVER_FLAG: u32 = 0x0000_0001;

/// Longest command text: the payload is command-length byte + flag + text.
pub const MAX_COMMAND_LEN: usize = MAX_PAYLOAD - 5;

/// Outbound serial numbers shared by every session.
///
/// Runs 1..=0xFFFF and wraps back to 1; 0 is never handed out.
#[derive(Debug)]
pub struct SerialCounter {
    next: AtomicU16,
}

impl SerialCounter {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u16) -> Self {
        Self {
            next: AtomicU16::new(first.max(1)),
        }
    }

    /// Take the next serial.
    pub fn next(&self) -> u16 {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let successor = if current == u16::MAX { 1 } else { current + 1 };
            match self.next.compare_exchange_weak(
                current,
                successor,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for SerialCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds 0x80 command frames with serials from a shared counter.
#[derive(Debug, Default)]
pub struct CommandEncoder {
    serials: SerialCounter,
}

impl CommandEncoder {
    pub fn new(serials: SerialCounter) -> Self {
        Self { serials }
    }

    /// Encode `text`, returning the serial it was given and the frame.
    ///
    /// A serial is only consumed when the text is valid.
    pub fn encode(&self, text: &str) -> Result<(u16, Bytes), EncodeError> {
        validate(text)?;
        let serial = self.serials.next();
        Ok((serial, encode_command(text, serial)?))
    }
}

fn validate(text: &str) -> Result<(), EncodeError> {
    if !text.is_ascii() {
        return Err(EncodeError::NonAscii);
    }
    if text.len() > MAX_COMMAND_LEN {
        return Err(EncodeError::TooLong {
            len: text.len(),
            max: MAX_COMMAND_LEN,
        });
    }
    Ok(())
}

/// Encode `text` as a 0x80 frame with an explicit serial.
///
/// ```text
/// 7878 <len> 80 <4 + text len> 00000001 <text> <serial> <crc-itu> 0D0A
/// ```
pub fn encode_command(text: &str, serial: u16) -> Result<Bytes, EncodeError> {
    validate(text)?;
    let mut payload = BytesMut::with_capacity(5 + text.len());
    payload.put_u8((4 + text.len()) as u8);
    payload.put_u32(SERVER_FLAG);
    payload.put_slice(text.as_bytes());

    let mut wire = BytesMut::new();
    encode_frame(protocol::COMMAND, &payload, serial, Checksum::CrcItu, &mut wire)?;
    Ok(wire.freeze())
}

/// Fields of a parsed 0x80 command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub serial: u16,
    pub server_flag: u32,
    pub text: String,
}

/// Inverse of [`encode_command`].
pub fn parse_command_frame(frame: &Frame) -> Result<ParsedCommand, DecodeError> {
    if frame.protocol != protocol::COMMAND {
        return Err(DecodeError::UnexpectedProtocol {
            expected: protocol::COMMAND,
            actual: frame.protocol,
        });
    }
    if frame.payload.len() < 5 {
        return Err(DecodeError::Truncated {
            protocol: protocol::COMMAND,
            needed: 5,
            actual: frame.payload.len(),
        });
    }
    let mut buf = frame.payload.as_ref();
    let command_len = usize::from(buf.get_u8());
    let server_flag = buf.get_u32();
    let text_len = command_len.saturating_sub(4).min(buf.len());
    Ok(ParsedCommand {
        serial: frame.serial,
        server_flag,
        text: String::from_utf8_lossy(&buf[..text_len]).into_owned(),
    })
}
