//! Modbus RTU CRC16
//!
//! Table-driven CRC with separate high and low lookup tables, seeded with
//! `0xFF 0xFF`. The tables must match the meter firmware byte for byte.
//!
//! The accumulator byte named `hi` is transmitted first, so on the wire the
//! frame ends with `[hi, lo]`. Read as a little-endian `u16` this equals the
//! usual CRC-16/MODBUS value.

/// High-byte lookup table
pub const CRC_TABLE_HI: [u8; 256] = [
    0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41, 0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40,
    0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40, 0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41,
    0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40, 0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41,
    0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41, 0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40,
    0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40, 0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41,
    0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41, 0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40,
    0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41, 0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40,
    0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40, 0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41,
    0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40, 0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41,
    0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41, 0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40,
    0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41, 0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40,
    0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40, 0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41,
    0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41, 0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40,
    0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40, 0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41,
    0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40, 0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41,
    0x00, 0xC1, 0x81, 0x40, 0x01, 0xC0, 0x80, 0x41, 0x01, 0xC0, 0x80, 0x41, 0x00, 0xC1, 0x81, 0x40,
];

/// Low-byte lookup table
pub const CRC_TABLE_LO: [u8; 256] = [
    0x00, 0xC0, 0xC1, 0x01, 0xC3, 0x03, 0x02, 0xC2, 0xC6, 0x06, 0x07, 0xC7, 0x05, 0xC5, 0xC4, 0x04,
    0xCC, 0x0C, 0x0D, 0xCD, 0x0F, 0xCF, 0xCE, 0x0E, 0x0A, 0xCA, 0xCB, 0x0B, 0xC9, 0x09, 0x08, 0xC8,
    0xD8, 0x18, 0x19, 0xD9, 0x1B, 0xDB, 0xDA, 0x1A, 0x1E, 0xDE, 0xDF, 0x1F, 0xDD, 0x1D, 0x1C, 0xDC,
    0x14, 0xD4, 0xD5, 0x15, 0xD7, 0x17, 0x16, 0xD6, 0xD2, 0x12, 0x13, 0xD3, 0x11, 0xD1, 0xD0, 0x10,
    0xF0, 0x30, 0x31, 0xF1, 0x33, 0xF3, 0xF2, 0x32, 0x36, 0xF6, 0xF7, 0x37, 0xF5, 0x35, 0x34, 0xF4,
    0x3C, 0xFC, 0xFD, 0x3D, 0xFF, 0x3F, 0x3E, 0xFE, 0xFA, 0x3A, 0x3B, 0xFB, 0x39, 0xF9, 0xF8, 0x38,
    0x28, 0xE8, 0xE9, 0x29, 0xEB, 0x2B, 0x2A, 0xEA, 0xEE, 0x2E, 0x2F, 0xEF, 0x2D, 0xED, 0xEC, 0x2C,
    0xE4, 0x24, 0x25, 0xE5, 0x27, 0xE7, 0xE6, 0x26, 0x22, 0xE2, 0xE3, 0x23, 0xE1, 0x21, 0x20, 0xE0,
    0xA0, 0x60, 0x61, 0xA1, 0x63, 0xA3, 0xA2, 0x62, 0x66, 0xA6, 0xA7, 0x67, 0xA5, 0x65, 0x64, 0xA4,
    0x6C, 0xAC, 0xAD, 0x6D, 0xAF, 0x6F, 0x6E, 0xAE, 0xAA, 0x6A, 0x6B, 0xAB, 0x69, 0xA9, 0xA8, 0x68,
    0x78, 0xB8, 0xB9, 0x79, 0xBB, 0x7B, 0x7A, 0xBA, 0xBE, 0x7E, 0x7F, 0xBF, 0x7D, 0xBD, 0xBC, 0x7C,
    0xB4, 0x74, 0x75, 0xB5, 0x77, 0xB7, 0xB6, 0x76, 0x72, 0xB2, 0xB3, 0x73, 0xB1, 0x71, 0x70, 0xB0,
    0x50, 0x90, 0x91, 0x51, 0x93, 0x53, 0x52, 0x92, 0x96, 0x56, 0x57, 0x97, 0x55, 0x95, 0x94, 0x54,
    0x9C, 0x5C, 0x5D, 0x9D, 0x5F, 0x9F, 0x9E, 0x5E, 0x5A, 0x9A, 0x9B, 0x5B, 0x99, 0x59, 0x58, 0x98,
    0x88, 0x48, 0x49, 0x89, 0x4B, 0x8B, 0x8A, 0x4A, 0x4E, 0x8E, 0x8F, 0x4F, 0x8D, 0x4D, 0x4C, 0x8C,
    0x44, 0x84, 0x85, 0x45, 0x87, 0x47, 0x46, 0x86, 0x82, 0x42, 0x43, 0x83, 0x41, 0x81, 0x80, 0x40,
];

/// Running CRC accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    hi: u8,
    lo: u8,
}

impl Crc16 {
    /// Accumulator seeded with the protocol initial value
    #[inline]
    pub const fn new() -> Self {
        Self { hi: 0xFF, lo: 0xFF }
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Fold one byte into the CRC
    #[inline]
    pub fn accumulate(&mut self, byte: u8) {
        let index = (self.hi ^ byte) as usize;
        self.hi = self.lo ^ CRC_TABLE_HI[index];
        self.lo = CRC_TABLE_LO[index];
    }

    /// Fold a slice into the CRC
    #[inline]
    pub fn accumulate_slice(&mut self, data: &[u8]) {
        for &byte in data {
            self.accumulate(byte);
        }
    }

    /// CRC bytes in wire order
    #[inline]
    pub fn finish(&self) -> [u8; 2] {
        [self.hi, self.lo]
    }

    /// CRC as a CRC-16/MODBUS value
    #[inline]
    pub fn value(&self) -> u16 {
        u16::from_le_bytes(self.finish())
    }

    /// Whether `wire` (two received CRC bytes) matches the accumulated CRC
    #[inline]
    pub fn matches(&self, wire: [u8; 2]) -> bool {
        self.finish() == wire
    }

    /// CRC of a whole buffer in wire order
    pub fn checksum(data: &[u8]) -> [u8; 2] {
        let mut crc = Self::new();
        crc.accumulate_slice(data);
        crc.finish()
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MODBUS: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

    #[test]
    fn test_known_request_vector() {
        // Read 2 registers at 0x4000 from slave 1
        let frame = [0x01, 0x03, 0x40, 0x00, 0x00, 0x02];
        assert_eq!(Crc16::checksum(&frame), [0xD1, 0xCB]);
    }

    #[test]
    fn test_reset_restores_seed() {
        let mut crc = Crc16::new();
        crc.accumulate(0x55);
        assert_ne!(crc, Crc16::new());
        crc.reset();
        assert_eq!(crc.finish(), [0xFF, 0xFF]);
    }

    #[test]
    fn test_tables_match_polynomial() {
        for index in 0..=255u8 {
            let mut crc = Crc16 { hi: index, lo: 0 };
            crc.accumulate(0);
            let mut reg = index as u16;
            for _ in 0..8 {
                reg = if reg & 1 != 0 { (reg >> 1) ^ 0xA001 } else { reg >> 1 };
            }
            assert_eq!(crc.finish(), reg.to_le_bytes(), "table entry {index}");
        }
    }

    proptest! {
        #[test]
        fn prop_matches_reference_crc(data in proptest::collection::vec(any::<u8>(), 0..300)) {
            let mut crc = Crc16::new();
            for &byte in &data {
                crc.accumulate(byte);
            }
            prop_assert_eq!(crc.value(), MODBUS.checksum(&data));
        }

        #[test]
        fn prop_appended_crc_leaves_zero_residue(data in proptest::collection::vec(any::<u8>(), 1..64)) {
            let mut crc = Crc16::new();
            crc.accumulate_slice(&data);
            let wire = crc.finish();
            crc.accumulate_slice(&wire);
            prop_assert_eq!(crc.value(), 0);
        }
    }
}
