//! Protocol ids seen on the wire.
//!
//! Ids below 0x80 travel device to server; 0x80 is the only server-originated
//! frame with its own id.

/// Device login carrying the IMEI.
pub const LOGIN: u8 = 0x01;

/// Server general response (never acknowledged).
pub const GENERAL_RESPONSE: u8 = 0x05;

/// Heartbeat with terminal status.
pub const HEARTBEAT: u8 = 0x13;

/// Device reply to a server command.
pub const COMMAND_REPLY: u8 = 0x15;

/// Alarm with GPS and LBS data.
pub const ALARM: u8 = 0x16;

/// Periodic position report.
pub const TIMED_POSITION: u8 = 0x32;

/// Server command carrying a text instruction.
pub const COMMAND: u8 = 0x80;

/// Returns a human-readable name for a protocol id.
pub fn protocol_name(id: u8) -> &'static str {
    match id {
        LOGIN => "LOGIN",
        GENERAL_RESPONSE => "GENERAL_RESPONSE",
        HEARTBEAT => "HEARTBEAT",
        COMMAND_REPLY => "COMMAND_REPLY",
        ALARM => "ALARM",
        TIMED_POSITION => "TIMED_POSITION",
        COMMAND => "COMMAND",
        _ => "UNKNOWN",
    }
}
