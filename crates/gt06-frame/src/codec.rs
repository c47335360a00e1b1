use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::checksum::{Checksum, ChecksumPolicy};
use crate::error::{FrameError, Result};

/// Start marker: 0x78 0x78.
pub const START_MARKER: [u8; 2] = [0x78, 0x78];

/// Stop marker: CR LF.
pub const STOP_MARKER: [u8; 2] = [0x0D, 0x0A];

/// Bytes outside the payload: start (2) + length (1) + protocol (1) + serial (2)
/// + checksum (2) + stop (2).
pub const FRAME_OVERHEAD: usize = 10;

/// Smallest legal length byte: protocol + serial + checksum.
const MIN_LENGTH: u8 = 5;

/// Largest payload the 1-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - MIN_LENGTH as usize;

/// A single decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol id (message type).
    pub protocol: u8,
    /// Bytes between the protocol id and the serial.
    pub payload: Bytes,
    /// Information serial number chosen by the sender.
    pub serial: u16,
    /// Checksum as transmitted.
    pub checksum: u16,
    /// The complete frame as it appeared on the wire.
    pub raw: Bytes,
}

impl Frame {
    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// The raw frame as uppercase hex.
    pub fn hex(&self) -> String {
        hex::encode_upper(&self.raw)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────┬────────┬──────────┬───────────────┬──────────┬──────────┬────────┐
/// │ Start  │ Length │ Protocol │ Payload       │ Serial   │ Checksum │ Stop   │
/// │ 0x7878 │ (1B)   │ (1B)     │ (Length - 5)  │ (2B BE)  │ (2B BE)  │ 0x0D0A │
/// └────────┴────────┴──────────┴───────────────┴──────────┴──────────┴────────┘
/// ```
///
/// The checksum covers Length through Serial.
pub fn encode_frame(
    protocol: u8,
    payload: &[u8],
    serial: u16,
    checksum: Checksum,
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(FRAME_OVERHEAD + payload.len());
    dst.put_slice(&START_MARKER);
    let body_start = dst.len();
    dst.put_u8(payload.len() as u8 + MIN_LENGTH);
    dst.put_u8(protocol);
    dst.put_slice(payload);
    dst.put_u16(serial);
    let sum = checksum.compute(&dst[body_start..]);
    dst.put_u16(sum);
    dst.put_slice(&STOP_MARKER);
    Ok(())
}

/// Build a standalone frame.
pub fn build_frame(protocol: u8, payload: &[u8], serial: u16, checksum: Checksum) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
    encode_frame(protocol, payload, serial, checksum, &mut buf)?;
    Ok(buf.freeze())
}

/// Parse one frame from the start of `buf`.
///
/// Bytes after the declared frame are ignored.
pub fn parse_frame(buf: &[u8], policy: ChecksumPolicy) -> Result<Frame> {
    if buf.len() < 3 {
        return Err(FrameError::Truncated {
            needed: FRAME_OVERHEAD,
            actual: buf.len(),
        });
    }
    if buf[0..2] != START_MARKER {
        return Err(FrameError::MissingStartMarker {
            raw: hex::encode_upper(buf),
        });
    }
    let length = buf[2];
    if length < MIN_LENGTH {
        return Err(FrameError::InvalidLength {
            length,
            raw: hex::encode_upper(buf),
        });
    }
    let total = usize::from(length) + MIN_LENGTH as usize;
    if buf.len() < total {
        return Err(FrameError::Truncated {
            needed: total,
            actual: buf.len(),
        });
    }

    let frame = &buf[..total];
    let protocol = frame[3];
    if frame[total - 2..] != STOP_MARKER {
        return Err(FrameError::MissingStopMarker {
            protocol,
            raw: hex::encode_upper(frame),
        });
    }

    // Length byte through serial.
    let checked = &frame[2..total - 4];
    let transmitted = u16::from_be_bytes([frame[total - 4], frame[total - 3]]);
    policy
        .verify(checked, transmitted)
        .map_err(|computed| FrameError::ChecksumMismatch {
            protocol,
            transmitted,
            computed,
            raw: hex::encode_upper(frame),
        })?;

    let serial = u16::from_be_bytes([frame[total - 6], frame[total - 5]]);
    let raw = Bytes::copy_from_slice(frame);
    Ok(Frame {
        protocol,
        payload: raw.slice(4..total - 6),
        serial,
        checksum: transmitted,
        raw,
    })
}

/// Decode the next frame from a stream buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet. Both
/// success and recoverable errors consume the bytes involved, so calling again
/// always makes progress.
///
/// The length byte is not trusted until the frame verifies. A frame that
/// fails its stop marker or checksum gives up only its start marker, and a
/// pending frame is abandoned as soon as a complete, valid frame starts
/// later in the buffer.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Frame>> {
    if src.is_empty() {
        return Ok(None);
    }
    if src.len() == 1 {
        if src[0] == START_MARKER[0] {
            return Ok(None); // Need more data
        }
        let junk = src.split_to(1);
        return Err(FrameError::MissingStartMarker {
            raw: hex::encode_upper(&junk),
        });
    }

    if src[0..2] != START_MARKER {
        let cut = match src.windows(2).position(|w| w == START_MARKER) {
            Some(pos) => pos,
            // Keep a trailing half marker; the rest of it may still arrive.
            None if src[src.len() - 1] == START_MARKER[0] => src.len() - 1,
            None => src.len(),
        };
        let junk = src.split_to(cut);
        return Err(FrameError::MissingStartMarker {
            raw: hex::encode_upper(&junk),
        });
    }

    if src.len() < 3 {
        return Ok(None); // Need more data
    }

    let length = src[2];
    if length < MIN_LENGTH {
        let junk = src.split_to(3);
        return Err(FrameError::InvalidLength {
            length,
            raw: hex::encode_upper(&junk),
        });
    }

    let total = usize::from(length) + MIN_LENGTH as usize;
    if src.len() < total {
        if let Some(next) = later_frame_start(&src[..], config.checksum) {
            let junk = src.split_to(next);
            return Err(FrameError::LengthOverrun {
                length,
                raw: hex::encode_upper(&junk),
            });
        }
        return Ok(None); // Need more data
    }

    match parse_frame(&src[..total], config.checksum) {
        Ok(frame) => {
            src.advance(total);
            Ok(Some(frame))
        }
        Err(err) => {
            src.advance(START_MARKER.len());
            Err(err)
        }
    }
}

/// Offset of the first complete, valid frame after position 0.
fn later_frame_start(buf: &[u8], policy: ChecksumPolicy) -> Option<usize> {
    (1..buf.len().saturating_sub(1))
        .filter(|&pos| buf[pos..pos + 2] == START_MARKER)
        .find(|&pos| parse_frame(&buf[pos..], policy).is_ok())
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    /// Which checksum algorithms inbound frames may use. Default: XOR.
    pub checksum: ChecksumPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_wire() -> Vec<u8> {
        hex::decode("78780D010865209077286178000100960D0A").unwrap()
    }

    #[test]
    fn test_build_parse_roundtrip() {
        let payload = [0xC6, 0x04, 0x04, 0x00, 0x02];
        let wire = build_frame(0x13, &payload, 0x0007, Checksum::Xor).unwrap();

        assert_eq!(wire.len(), FRAME_OVERHEAD + payload.len());

        let frame = parse_frame(&wire, ChecksumPolicy::Xor).unwrap();
        assert_eq!(frame.protocol, 0x13);
        assert_eq!(frame.payload.as_ref(), &payload);
        assert_eq!(frame.serial, 0x0007);
        assert_eq!(frame.raw, wire);
    }

    #[test]
    fn test_build_matches_captured_heartbeat() {
        let wire = build_frame(0x13, &[0xC6, 0x04, 0x04, 0x00, 0x02], 7, Checksum::Xor).unwrap();
        assert_eq!(hex::encode_upper(&wire), "78780A13C604040002000700DA0D0A");
    }

    #[test]
    fn test_roundtrip_across_payload_sizes_and_checksums() {
        for size in [0usize, 1, 8, 42, MAX_PAYLOAD] {
            for checksum in [Checksum::Xor, Checksum::CrcItu] {
                let payload: Vec<u8> = (0..size).map(|i| i as u8).collect();
                let wire = build_frame(0x32, &payload, 0xBEEF, checksum).unwrap();
                let policy = match checksum {
                    Checksum::Xor => ChecksumPolicy::Xor,
                    Checksum::CrcItu => ChecksumPolicy::CrcItu,
                };
                let frame = parse_frame(&wire, policy).unwrap();
                assert_eq!(
                    (frame.protocol, frame.payload.as_ref(), frame.serial),
                    (0x32, payload.as_slice(), 0xBEEF)
                );
            }
        }
    }

    #[test]
    fn test_parse_genuine_login() {
        let frame = parse_frame(&login_wire(), ChecksumPolicy::Xor).unwrap();
        assert_eq!(frame.protocol, 0x01);
        assert_eq!(hex::encode_upper(&frame.payload), "0865209077286178");
        assert_eq!(frame.serial, 1);
        assert_eq!(frame.checksum, 0x0096);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let err = build_frame(0x80, &payload, 1, Checksum::CrcItu).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_parse_truncated() {
        let wire = login_wire();
        let err = parse_frame(&wire[..10], ChecksumPolicy::Xor).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                needed: 18,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_parse_negative_payload() {
        let err = parse_frame(&[0x78, 0x78, 0x04, 0x01, 0x00], ChecksumPolicy::Xor).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { length: 4, .. }));
    }

    #[test]
    fn test_parse_missing_markers() {
        let mut wire = login_wire();
        wire[0] = 0x79;
        assert!(matches!(
            parse_frame(&wire, ChecksumPolicy::Xor),
            Err(FrameError::MissingStartMarker { .. })
        ));

        let mut wire = login_wire();
        let last = wire.len() - 1;
        wire[last] = 0x00;
        assert!(matches!(
            parse_frame(&wire, ChecksumPolicy::Xor),
            Err(FrameError::MissingStopMarker { protocol: 0x01, .. })
        ));
    }

    #[test]
    fn test_parse_checksum_mismatch() {
        let mut wire = login_wire();
        wire[14] = 0x00;
        wire[15] = 0x97;
        let err = parse_frame(&wire, ChecksumPolicy::Xor).unwrap_err();
        match err {
            FrameError::ChecksumMismatch {
                transmitted,
                computed,
                raw,
                ..
            } => {
                assert_eq!(transmitted, 0x0097);
                assert_eq!(computed, 0x0096);
                assert!(raw.starts_with("78780D01"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x78, 0x78][..]);
        let result = decode_frame(&mut buf, &FrameConfig::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let wire = login_wire();
        let mut buf = BytesMut::from(&wire[..12]);
        let result = decode_frame(&mut buf, &FrameConfig::default()).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 12);
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let wire = login_wire();
        let mut buf = BytesMut::new();
        let mut decoded = None;
        for byte in wire {
            buf.put_u8(byte);
            if let Some(frame) = decode_frame(&mut buf, &FrameConfig::default()).unwrap() {
                decoded = Some(frame);
            }
        }
        assert_eq!(decoded.unwrap().protocol, 0x01);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_resyncs_after_garbage() {
        let mut buf = BytesMut::from(&[0x00, 0x11, 0x22][..]);
        buf.extend_from_slice(&login_wire());

        let err = decode_frame(&mut buf, &FrameConfig::default()).unwrap_err();
        assert!(matches!(err, FrameError::MissingStartMarker { ref raw } if raw == "001122"));
        assert!(err.is_recoverable());

        let frame = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(frame.protocol, 0x01);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_keeps_trailing_half_marker() {
        let mut buf = BytesMut::from(&[0x00, 0x78][..]);
        assert!(decode_frame(&mut buf, &FrameConfig::default()).is_err());
        assert_eq!(buf.as_ref(), &[0x78]);
        assert!(decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .is_none());
    }

    /// Decode until the buffer needs more data.
    fn drain(buf: &mut BytesMut) -> (Vec<Frame>, Vec<FrameError>) {
        let mut frames = Vec::new();
        let mut errors = Vec::new();
        loop {
            match decode_frame(buf, &FrameConfig::default()) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return (frames, errors),
                Err(err) => {
                    assert!(err.is_recoverable(), "unexpected fatal error: {err}");
                    errors.push(err);
                }
            }
        }
    }

    /// Heartbeat whose length byte claims 0x30 instead of 0x0A.
    fn overlong_heartbeat() -> Vec<u8> {
        hex::decode("78783013C604040002000700DA0D0A").unwrap()
    }

    #[test]
    fn test_corrupt_frame_does_not_block_next() {
        let mut corrupt = login_wire();
        corrupt[15] ^= 0xFF;
        let mut buf = BytesMut::from(corrupt.as_slice());
        buf.extend_from_slice(&login_wire());

        let err = decode_frame(&mut buf, &FrameConfig::default()).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));

        let (frames, errors) = drain(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].serial, 1);
        assert!(errors
            .iter()
            .all(|err| matches!(err, FrameError::MissingStartMarker { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overlong_length_does_not_hold_back_next_frame() {
        let mut buf = BytesMut::from(overlong_heartbeat().as_slice());
        buf.extend_from_slice(&login_wire());

        let err = decode_frame(&mut buf, &FrameConfig::default()).unwrap_err();
        match err {
            FrameError::LengthOverrun { length, ref raw } => {
                assert_eq!(length, 0x30);
                assert_eq!(raw, "78783013C604040002000700DA0D0A");
            }
            ref other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_recoverable());

        let frame = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(frame.protocol, 0x01);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overlong_length_waits_without_a_later_frame() {
        let wire = login_wire();
        let mut buf = BytesMut::from(overlong_heartbeat().as_slice());
        buf.extend_from_slice(&wire[..10]);

        assert!(decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 25);

        buf.extend_from_slice(&wire[10..]);
        let (frames, errors) = drain(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].protocol, 0x01);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_frames_inside_a_filled_bad_span_survive() {
        // 15 + 18 + 18 + 2 = 53 bytes, exactly the span the bad length claims.
        let mut buf = BytesMut::from(overlong_heartbeat().as_slice());
        buf.extend_from_slice(&login_wire());
        buf.extend_from_slice(&login_wire());
        buf.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(buf.len(), 0x30 + 5);

        let (frames, errors) = drain(&mut buf);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|frame| frame.protocol == 0x01));
        assert!(!errors.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overlong_length_fed_byte_by_byte() {
        let mut stream = overlong_heartbeat();
        stream.extend_from_slice(&login_wire());

        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for byte in stream {
            buf.put_u8(byte);
            frames.extend(drain(&mut buf).0);
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].serial, 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_short_length_is_skipped() {
        let mut buf = BytesMut::from(&[0x78, 0x78, 0x02][..]);
        buf.extend_from_slice(&login_wire());
        let err = decode_frame(&mut buf, &FrameConfig::default()).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { length: 2, .. }));
        let frame = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(frame.protocol, 0x01);
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(0x01, &[0u8; 8], 1, Checksum::Xor, &mut buf).unwrap();
        encode_frame(0x13, &[0u8; 5], 2, Checksum::Xor, &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!((f1.protocol, f1.serial), (0x01, 1));

        let f2 = decode_frame(&mut buf, &FrameConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!((f2.protocol, f2.serial), (0x13, 2));

        assert!(buf.is_empty());
    }

    #[test]
    fn test_crc_frame_rejected_under_xor_policy() {
        let wire = build_frame(0x15, b"\x05\x00\x00\x00\x01O", 3, Checksum::CrcItu).unwrap();
        let mut buf = BytesMut::from(wire.as_ref());
        assert!(decode_frame(&mut buf, &FrameConfig::default()).is_err());

        let mut buf = BytesMut::from(wire.as_ref());
        let config = FrameConfig {
            checksum: ChecksumPolicy::Either,
        };
        assert!(decode_frame(&mut buf, &config).unwrap().is_some());
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = parse_frame(&login_wire(), ChecksumPolicy::Xor).unwrap();
        assert_eq!(frame.wire_size(), 18);
        assert_eq!(frame.hex(), "78780D010865209077286178000100960D0A");
    }
}
