//! `tokio_util` codec for GT06 frames.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::FrameError;

/// Frame codec for use with `tokio_util::codec::Framed`.
///
/// Decoding yields `Result<Frame, FrameError>` as the item so a malformed
/// frame surfaces to the caller without terminating the stream. Only I/O
/// errors end it. Encoding writes pre-built frames unchanged.
#[derive(Debug, Clone, Default)]
pub struct Gt06Codec {
    config: FrameConfig,
}

impl Gt06Codec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for Gt06Codec {
    type Item = Result<Frame, FrameError>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_frame(src, &self.config) {
            Ok(Some(frame)) => {
                trace!(protocol = frame.protocol, serial = frame.serial, "frame decoded");
                Ok(Some(Ok(frame)))
            }
            Ok(None) => Ok(None),
            Err(err) if err.is_recoverable() => Ok(Some(Err(err))),
            Err(err) => Err(err),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let actual = buf.len();
        let needed = buf.get(2).map_or(actual + 1, |len| usize::from(*len) + 5);
        buf.clear();
        Ok(Some(Err(FrameError::Truncated { needed, actual })))
    }
}

impl Encoder<Bytes> for Gt06Codec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
