//! Device clock decoding.
//!
//! Devices send the calendar fields as six (or seven, with a 2-byte year)
//! bytes. Anything that doesn't produce a real UTC instant falls back to
//! [`sentinel`]; callers never see a missing timestamp.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// How each two-hex-char calendar group is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampEncoding {
    /// `0x19` means 19.
    #[default]
    Bcd,
    /// `0x13` means 19.
    Binary,
}

/// The fallback instant, `2020-01-01T00:00:00Z`.
pub fn sentinel() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_577_836_800, 0).unwrap_or_default()
}

/// Decode a raw timestamp field.
pub fn decode_timestamp(bytes: &[u8], encoding: TimestampEncoding) -> DateTime<Utc> {
    parse_timestamp(&hex::encode_upper(bytes), encoding)
}

/// Parse the hex text of a timestamp field: `YYMMDDHHMMSS` (century 2000) or
/// `YYYYMMDDHHMMSS`.
pub fn parse_timestamp(text: &str, encoding: TimestampEncoding) -> DateTime<Utc> {
    try_parse(text, encoding).unwrap_or_else(sentinel)
}

fn try_parse(text: &str, encoding: TimestampEncoding) -> Option<DateTime<Utc>> {
    if !text.is_ascii() {
        return None;
    }
    let (year, rest) = match text.len() {
        12 => (2000 + field(&text[0..2], encoding)?, &text[2..]),
        14 => (field(&text[0..4], encoding)?, &text[4..]),
        _ => return None,
    };
    let month = field(&rest[0..2], encoding)?;
    let day = field(&rest[2..4], encoding)?;
    let hour = field(&rest[4..6], encoding)?;
    let minute = field(&rest[6..8], encoding)?;
    let second = field(&rest[8..10], encoding)?;
    Utc.with_ymd_and_hms(year as i32, month, day, hour, minute, second)
        .single()
}

fn field(digits: &str, encoding: TimestampEncoding) -> Option<u32> {
    match encoding {
        TimestampEncoding::Bcd if digits.bytes().all(|b| b.is_ascii_digit()) => digits.parse().ok(),
        TimestampEncoding::Binary if digits.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u32::from_str_radix(digits, 16).ok()
        }
        _ => None,
    }
}
