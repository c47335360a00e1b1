//! Checksum algorithms used on the wire.
//!
//! Both run over the span from the length byte through the serial.

/// Checksum algorithm for a single frame direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// XOR of every byte, placed in the low byte (device frames and acks).
    Xor,
    /// CRC-16/CCITT, poly 0x1021, init 0xFFFF, no final XOR (server commands).
    CrcItu,
}

impl Checksum {
    /// Compute the 2-byte checksum field for `data`.
    pub fn compute(self, data: &[u8]) -> u16 {
        match self {
            Checksum::Xor => xor_checksum(data),
            Checksum::CrcItu => crc_itu(data),
        }
    }
}

/// Which checksums the decoder accepts on inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    #[default]
    Xor,
    CrcItu,
    /// Accept a frame if either algorithm reproduces its checksum.
    Either,
}

impl ChecksumPolicy {
    /// Returns the computed checksum on success, or the preferred algorithm's
    /// value on mismatch (for error reporting).
    pub fn verify(self, data: &[u8], transmitted: u16) -> std::result::Result<u16, u16> {
        match self {
            ChecksumPolicy::Xor => check(Checksum::Xor.compute(data), transmitted),
            ChecksumPolicy::CrcItu => check(Checksum::CrcItu.compute(data), transmitted),
            ChecksumPolicy::Either => {
                let xor = Checksum::Xor.compute(data);
                if xor == transmitted {
                    return Ok(xor);
                }
                check(Checksum::CrcItu.compute(data), transmitted).map_err(|_| xor)
            }
        }
    }
}

fn check(computed: u16, transmitted: u16) -> std::result::Result<u16, u16> {
    if computed == transmitted {
        Ok(computed)
    } else {
        Err(computed)
    }
}

/// XOR of all bytes; high byte of the result is always zero.
pub fn xor_checksum(data: &[u8]) -> u16 {
    u16::from(data.iter().fold(0u8, |acc, b| acc ^ b))
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection, no final XOR).
pub fn crc_itu(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
