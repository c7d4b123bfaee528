//! Frame integrity checks.
//!
//! Frames either carry no checksum (the payload must then be printable ASCII) or
//! carry a hexadecimal checksum after a `*` separator:
//!
//! ```text
//! PA,100.0123*5B\r        (Sum8 / Xor8: two hex digits)
//! PA,100.0123*9C1E\r      (Crc16Modbus: four hex digits)
//! ```
//!
//! The checksum covers the body bytes before the separator.

use crate::error::CorruptReason;
use crc::{Crc, CRC_16_MODBUS};
use serde::{Deserialize, Serialize};

/// Separator between the frame body and its checksum suffix.
pub const CHECKSUM_SEPARATOR: u8 = b'*';

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Integrity check applied to every terminated frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameIntegrity {
    /// No checksum; every byte must be printable ASCII.
    #[default]
    None,
    /// 8-bit wrapping sum of the body bytes.
    Sum8,
    /// 8-bit XOR of the body bytes.
    Xor8,
    /// CRC-16/Modbus of the body bytes.
    Crc16Modbus,
}

impl FrameIntegrity {
    /// Number of hex digits in the checksum suffix (0 when no checksum is used).
    pub fn hex_digits(self) -> usize {
        match self {
            FrameIntegrity::None => 0,
            FrameIntegrity::Sum8 | FrameIntegrity::Xor8 => 2,
            FrameIntegrity::Crc16Modbus => 4,
        }
    }

    /// Compute the checksum of `body`. Returns 0 for [`FrameIntegrity::None`].
    pub fn checksum(self, body: &[u8]) -> u32 {
        match self {
            FrameIntegrity::None => 0,
            FrameIntegrity::Sum8 => body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) as u32,
            FrameIntegrity::Xor8 => body.iter().fold(0u8, |acc, &b| acc ^ b) as u32,
            FrameIntegrity::Crc16Modbus => MODBUS.checksum(body) as u32,
        }
    }

    /// Validate a terminated frame.
    ///
    /// On success returns the length of the body (the part before the checksum
    /// suffix) and the checksum value carried by the frame, if any.
    pub fn verify(self, frame: &[u8]) -> Result<(usize, Option<u32>), CorruptReason> {
        if let Some(offset) = frame.iter().position(|b| !(0x20..=0x7E).contains(b)) {
            return Err(CorruptReason::NonAscii {
                offset,
                byte: frame[offset],
            });
        }

        if self == FrameIntegrity::None {
            return Ok((frame.len(), None));
        }

        let sep = frame
            .iter()
            .rposition(|&b| b == CHECKSUM_SEPARATOR)
            .ok_or(CorruptReason::MissingChecksum)?;
        let body = &frame[..sep];
        let suffix = &frame[sep + 1..];

        if suffix.len() != self.hex_digits() || !suffix.iter().all(u8::is_ascii_hexdigit) {
            return Err(CorruptReason::MalformedChecksum);
        }
        let expected = std::str::from_utf8(suffix)
            .ok()
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .ok_or(CorruptReason::MalformedChecksum)?;

        let actual = self.checksum(body);
        if expected != actual {
            return Err(CorruptReason::Mismatch { expected, actual });
        }
        Ok((sep, Some(expected)))
    }

    /// Append the checksum suffix for `body` to `out` (nothing for `None`).
    pub fn append_suffix(self, body: &[u8], out: &mut Vec<u8>) {
        let digits = self.hex_digits();
        if digits == 0 {
            return;
        }
        let value = self.checksum(body);
        out.push(CHECKSUM_SEPARATOR);
        out.extend_from_slice(format!("{:0width$X}", value, width = digits).as_bytes());
    }
}
