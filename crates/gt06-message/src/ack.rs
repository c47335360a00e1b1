use bytes::Bytes;
use gt06_frame::{build_frame, protocol, Checksum};

/// Whether an inbound frame with this id gets an acknowledgement.
///
/// Every id is acked, including ones the decoder doesn't know, except the
/// general response which is itself an answer.
pub fn requires_ack(protocol: u8) -> bool {
    protocol != protocol::GENERAL_RESPONSE
}

/// Build the acknowledgement echoing `protocol` and `serial`.
///
/// Empty payload, length byte 0x05, XOR checksum.
pub fn build_ack(protocol: u8, serial: u16) -> gt06_frame::Result<Bytes> {
    build_frame(protocol, &[], serial, Checksum::Xor)
}

#[cfg(test)]
mod tests {
    use gt06_frame::{parse_frame, ChecksumPolicy};

    use super::*;

    #[test]
    fn login_ack_bytes() {
        assert_eq!(hex::encode_upper(build_ack(0x01, 1).unwrap()), "78780501000100050D0A");
    }

    #[test]
    fn heartbeat_ack_bytes() {
        assert_eq!(hex::encode_upper(build_ack(0x13, 7).unwrap()), "78780513000700110D0A");
    }

    #[test]
    fn ack_parses_as_frame() {
        let ack = build_ack(0x32, 0xABCD).unwrap();
        let frame = parse_frame(&ack, ChecksumPolicy::Xor).unwrap();
        assert_eq!(frame.protocol, 0x32);
        assert_eq!(frame.serial, 0xABCD);
        assert!(frame.payload.is_empty());
        assert_eq!(frame.raw, ack);
    }

    #[test]
    fn ack_for_unknown_id_echoes_it() {
        let ack = build_ack(0x99, 0xFFFF).unwrap();
        assert_eq!(ack.len(), 10);
        assert_eq!(ack[2], 0x05);
        assert_eq!(ack[3], 0x99);
    }

    #[test]
    fn ack_policy() {
        for id in [0x01, 0x13, 0x15, 0x16, 0x32, 0x80, 0x99] {
            assert!(requires_ack(id), "0x{id:02X} should be acked");
        }
        assert!(!requires_ack(0x05));
    }
}
