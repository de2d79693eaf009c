use crate::codec::Codec;
use crate::hal::Cop1Error;
use crate::types::{SequenceNumber, VcId};
use core::convert::TryFrom;

/// Value of the 2-bit COP in Effect field of the CLCW.
///
/// (Reference: CCSDS 232.0-B, Section 4.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CopInEffect {
    /// No COP is in effect on this virtual channel.
    #[default]
    None = 0,
    /// COP-1 is in effect; the report value is FARM-1 feedback.
    Cop1 = 1,
    /// Reserved by the standard.
    Reserved2 = 2,
    /// Reserved by the standard.
    Reserved3 = 3,
}

impl TryFrom<u8> for CopInEffect {
    type Error = Cop1Error;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Cop1),
            2 => Ok(Self::Reserved2),
            3 => Ok(Self::Reserved3),
            _ => Err(Cop1Error::InvalidEnumValue),
        }
    }
}

/// The 4-octet Communications Link Control Word: the receiving end's
/// standard report about one virtual channel.
///
/// Only the lockout/wait/retransmit flags and the report value drive FOP-1;
/// the remaining fields are carried for completeness and for intake
/// filtering.
///
/// (Reference: CCSDS 232.0-B, Section 4.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Clcw {
    /// 3-bit status field, mission-specific.
    pub status_field: u8,
    pub cop_in_effect: CopInEffect,
    pub vc_id: VcId,
    pub no_rf_available: bool,
    pub no_bit_lock: bool,
    /// FARM-1 is in the Lockout state; all Type-A frames are being discarded.
    pub lockout: bool,
    /// FARM-1 has no buffer space; Type-A frames are being discarded.
    pub wait: bool,
    /// FARM-1 requests retransmission starting at the report value.
    pub retransmit: bool,
    /// 2-bit counter of accepted Type-B frames.
    pub farm_b_counter: u8,
    /// N(R): the next Type-AD frame sequence number FARM-1 expects.
    pub report_value: SequenceNumber,
}

impl Clcw {
    /// Size of the serialized CLCW in bytes.
    pub const SIZE: usize = 4;

    /// Creates a clean COP-1 report for `vc_id` carrying `report_value` as
    /// N(R): no lockout, no wait, no retransmit.
    pub fn report(vc_id: VcId, report_value: SequenceNumber) -> Self {
        Self {
            cop_in_effect: CopInEffect::Cop1,
            vc_id,
            report_value,
            ..Default::default()
        }
    }
}

impl Codec for Clcw {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, Cop1Error> {
        if buffer.len() < Self::SIZE {
            return Err(Cop1Error::BufferTooShort);
        }

        // Octet 0: type (1 bit, '0'), version (2 bits, '00'), status (3 bits),
        // COP in effect (2 bits).
        buffer[0] = ((self.status_field & 0b111) << 2) | (self.cop_in_effect as u8);
        // Octet 1: VCID (6 bits), spare (2 bits).
        buffer[1] = self.vc_id.value() << 2;
        // Octet 2: the five flags, FARM-B counter (2 bits), spare (1 bit).
        buffer[2] = ((self.no_rf_available as u8) << 7)
            | ((self.no_bit_lock as u8) << 6)
            | ((self.lockout as u8) << 5)
            | ((self.wait as u8) << 4)
            | ((self.retransmit as u8) << 3)
            | ((self.farm_b_counter & 0b11) << 1);
        // Octet 3: report value.
        buffer[3] = self.report_value;

        Ok(Self::SIZE)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, Cop1Error> {
        if buffer.len() < Self::SIZE {
            return Err(Cop1Error::BufferTooShort);
        }

        let octet0 = buffer[0];
        // Control word type must be '0' and the CLCW version '00'.
        if octet0 & 0b1110_0000 != 0 {
            return Err(Cop1Error::InvalidEnumValue);
        }

        Ok(Self {
            status_field: (octet0 >> 2) & 0b111,
            cop_in_effect: CopInEffect::try_from(octet0 & 0b11)?,
            vc_id: VcId::try_from(buffer[1] >> 2)?,
            no_rf_available: buffer[2] & 0b1000_0000 != 0,
            no_bit_lock: buffer[2] & 0b0100_0000 != 0,
            lockout: buffer[2] & 0b0010_0000 != 0,
            wait: buffer[2] & 0b0001_0000 != 0,
            retransmit: buffer[2] & 0b0000_1000 != 0,
            farm_b_counter: (buffer[2] >> 1) & 0b11,
            report_value: buffer[3],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clcw_codec_roundtrip() {
        let original = Clcw {
            status_field: 0b101,
            cop_in_effect: CopInEffect::Cop1,
            vc_id: VcId::try_from(5).unwrap(),
            no_rf_available: false,
            no_bit_lock: true,
            lockout: false,
            wait: false,
            retransmit: true,
            farm_b_counter: 2,
            report_value: 0xA7,
        };

        let mut buffer = [0u8; 4];
        let written = original.serialize(&mut buffer).unwrap();
        assert_eq!(written, 4);

        // Expected byte values based on the bit layout:
        // Octet 0: status(0b101)<<2 | cop(01) = 0x14 | 0x01 = 0x15
        // Octet 1: vcid(5)<<2 = 0x14
        // Octet 2: no_bit_lock(0x40) | retransmit(0x08) | farm_b(2)<<1 = 0x4C
        assert_eq!(buffer, [0x15, 0x14, 0x4C, 0xA7]);

        let decoded = Clcw::deserialize(&buffer).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_clcw_rejects_wrong_version() {
        // Control word type bit set: not a CLCW.
        let buffer = [0x80, 0x00, 0x00, 0x00];
        assert_eq!(
            Clcw::deserialize(&buffer),
            Err(Cop1Error::InvalidEnumValue)
        );
    }

    #[test]
    fn test_clcw_rejects_short_buffer() {
        assert_eq!(
            Clcw::deserialize(&[0x00, 0x00]),
            Err(Cop1Error::BufferTooShort)
        );
    }

    #[test]
    fn test_clean_report_builder() {
        let clcw = Clcw::report(VcId::try_from(1).unwrap(), 42);
        assert_eq!(clcw.cop_in_effect, CopInEffect::Cop1);
        assert_eq!(clcw.report_value, 42);
        assert!(!clcw.lockout && !clcw.wait && !clcw.retransmit);
    }
}
