//! CRC-16/X-25 checksum over frame payloads.
//!
//! Reflected CCITT polynomial (`0x1021`, reversed `0x8408`), initial value
//! `0xFFFF`, final XOR `0xFFFF`. This is the ISO 3309 / HDLC variant; the
//! check value for `"123456789"` is `0x906E`.

/// Reversed CCITT polynomial.
const CRC16_POLYNOMIAL: u16 = 0x8408;

const CRC16_TABLE: [u16; 256] = generate_crc16_table();

const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;

        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC16_POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Incremental CRC-16 calculator.
#[derive(Debug, Clone, Copy)]
pub struct Crc16 {
    state: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    /// Creates a calculator in the initial state.
    #[inline]
    pub const fn new() -> Self {
        Self { state: 0xFFFF }
    }

    /// Feeds `data` into the checksum.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let index = ((self.state ^ byte as u16) & 0xFF) as usize;
            self.state = (self.state >> 8) ^ CRC16_TABLE[index];
        }
    }

    /// Returns the final checksum.
    #[inline]
    pub const fn finalize(self) -> u16 {
        self.state ^ 0xFFFF
    }

    /// Computes the checksum of `data` in one call.
    #[inline]
    pub fn checksum(data: &[u8]) -> u16 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }

    /// Returns true if `data` matches `expected`.
    #[inline]
    pub fn verify(data: &[u8], expected: u16) -> bool {
        Self::checksum(data) == expected
    }
}
