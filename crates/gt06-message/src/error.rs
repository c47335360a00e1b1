use gt06_frame::FrameError;

/// Errors from turning a frame into an [`crate::Event`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Structurally valid frame with an id this decoder does not handle.
    #[error("unknown protocol 0x{0:02X}")]
    UnknownProtocol(u8),

    /// Payload shorter than the fixed layout for its protocol.
    #[error("truncated 0x{protocol:02X} payload ({actual} bytes, need {needed})")]
    Truncated {
        protocol: u8,
        needed: usize,
        actual: usize,
    },

    /// A frame of the wrong kind was handed to a protocol-specific parser.
    #[error("expected protocol 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedProtocol { expected: u8, actual: u8 },
}

/// Errors from building an outbound command frame.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("command text contains non-ASCII characters")]
    NonAscii,

    #[error("command text too long ({len} bytes, max {max})")]
    TooLong { len: usize, max: usize },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
