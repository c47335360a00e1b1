/// Errors that can occur during frame encoding/decoding.
///
/// Variants produced by the streaming decoder have already consumed the bytes
/// they describe; `raw` holds those bytes as uppercase hex for logging.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Bytes before the next start marker were discarded.
    #[error("missing start marker (expected 0x7878), discarded {raw}")]
    MissingStartMarker { raw: String },

    /// The length byte cannot cover protocol id, serial and checksum.
    #[error("invalid length byte {length} (minimum 5): {raw}")]
    InvalidLength { length: u8, raw: String },

    /// A complete frame starts inside the span this length byte declares.
    #[error("length byte {length} overruns the next frame, discarded {raw}")]
    LengthOverrun { length: u8, raw: String },

    /// The declared frame span does not end with `0x0D0A`.
    #[error("missing stop marker (expected 0x0D0A) on protocol 0x{protocol:02X}: {raw}")]
    MissingStopMarker { protocol: u8, raw: String },

    /// The transmitted checksum does not match the computed one.
    #[error(
        "checksum mismatch on protocol 0x{protocol:02X} (transmitted 0x{transmitted:04X}, computed 0x{computed:04X}): {raw}"
    )]
    ChecksumMismatch {
        protocol: u8,
        transmitted: u16,
        computed: u16,
        raw: String,
    },

    /// The buffer is shorter than the length byte declares.
    #[error("truncated frame ({actual} bytes, declared {needed})")]
    Truncated { needed: usize, actual: usize },

    /// The payload does not fit the 1-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True when the stream can keep going after this error.
    ///
    /// Malformed frames are dropped individually; I/O failures end the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::MissingStartMarker { .. }
                | FrameError::InvalidLength { .. }
                | FrameError::LengthOverrun { .. }
                | FrameError::MissingStopMarker { .. }
                | FrameError::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
