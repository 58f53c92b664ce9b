//! The five-byte DHT11 data frame.

use crate::error::{AcqResult, AcquisitionError};

/// Bytes per frame.
pub const FRAME_LEN: usize = 5;
/// Bits per frame.
pub const FRAME_BITS: usize = FRAME_LEN * 8;

/// Checksum-verified frame: humidity int/frac, temperature int/frac, checksum.
///
/// Only constructible through [`DecodedFrame::from_bytes`], so a value of this
/// type always carries a valid checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedFrame {
    bytes: [u8; FRAME_LEN],
}

impl DecodedFrame {
    /// Sum of the four data bytes, truncated to 8 bits.
    #[must_use]
    pub fn checksum_of(bytes: &[u8; FRAME_LEN]) -> u8 {
        bytes[..4].iter().fold(0_u8, |sum, b| sum.wrapping_add(*b))
    }

    /// Verify and wrap raw frame bytes.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::ChecksumError`] when the last byte does not match.
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> AcqResult<Self> {
        let computed = Self::checksum_of(&bytes);
        let received = bytes[4];
        if computed != received {
            return Err(AcquisitionError::ChecksumError { computed, received });
        }
        Ok(Self { bytes })
    }

    /// Build a valid frame for the given integer readings.
    #[must_use]
    pub fn from_values(humidity: u8, temperature: u8) -> Self {
        let mut bytes = [humidity, 0, temperature, 0, 0];
        bytes[4] = Self::checksum_of(&bytes);
        Self { bytes }
    }

    /// Raw bytes, checksum included.
    #[must_use]
    pub const fn bytes(&self) -> [u8; FRAME_LEN] {
        self.bytes
    }

    /// Relative humidity in percent.
    #[must_use]
    pub fn humidity(&self) -> f32 {
        f32::from(self.bytes[0]) + f32::from(self.bytes[1]) / 10.0
    }

    /// Temperature in degrees Celsius.
    #[must_use]
    pub fn temperature(&self) -> f32 {
        f32::from(self.bytes[2]) + f32::from(self.bytes[3]) / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_frame() -> AcqResult<()> {
        let frame = DecodedFrame::from_bytes([0x23, 0x00, 0x17, 0x00, 0x3A])?;
        assert!((frame.humidity() - 35.0).abs() < f32::EPSILON);
        assert!((frame.temperature() - 23.0).abs() < f32::EPSILON);
        Ok(())
    }

    #[test]
    fn test_fractional_parts() -> AcqResult<()> {
        let frame = DecodedFrame::from_bytes([40, 5, 21, 3, 69])?;
        assert!((frame.humidity() - 40.5).abs() < 1e-5);
        assert!((frame.temperature() - 21.3).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_checksum_truncates() -> AcqResult<()> {
        let frame = DecodedFrame::from_bytes([200, 0, 100, 0, 44])?;
        assert_eq!(frame.bytes()[4], 44);
        Ok(())
    }

    #[test]
    fn test_checksum_mismatch() {
        assert_eq!(
            DecodedFrame::from_bytes([0x23, 0x00, 0x17, 0x00, 0x3B]),
            Err(AcquisitionError::ChecksumError {
                computed: 0x3A,
                received: 0x3B
            })
        );
    }

    #[test]
    fn test_from_values() {
        assert_eq!(
            DecodedFrame::from_values(0x23, 0x17).bytes(),
            [0x23, 0x00, 0x17, 0x00, 0x3A]
        );
    }
}
