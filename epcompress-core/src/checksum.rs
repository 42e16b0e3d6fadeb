//! Stream checksum.
//!
//! The first byte of an M0 or M2 stream is chosen so that running the
//! recurrence `c = rotl1(c ^ b) + K` backward over the *whole* stream, from a
//! profile specific seed, ends at `0x80`. Decoders verify it before looking
//! at any symbol.

use crate::error::{EpError, Result};

/// Checksum parameters of a stream profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    /// Initial register value.
    pub seed: u8,
    /// Constant added after each rotate.
    pub addend: u8,
}

impl Checksum {
    /// Final value every valid stream produces.
    pub const EXPECTED: u8 = 0x80;

    /// Checksum used by the M2 format.
    pub const M2: Self = Self {
        seed: 0xFF,
        addend: 0xAC,
    };

    /// Checksum used by the M0 format.
    pub const M0: Self = Self {
        seed: 0x00,
        addend: 0xC4,
    };

    #[inline]
    fn step(self, c: u8, b: u8) -> u8 {
        (c ^ b).rotate_left(1).wrapping_add(self.addend)
    }

    /// Run the recurrence backward over `data`.
    pub fn compute(self, data: &[u8]) -> u8 {
        data.iter()
            .rev()
            .fold(self.seed, |c, &b| self.step(c, b))
    }

    /// Store the checksum byte at `data[0]`, covering `data[1..]`.
    pub fn seal(self, data: &mut [u8]) {
        if data.is_empty() {
            return;
        }
        let c = self.compute(&data[1..]);
        // rotl1(k) + addend == 0x80 for k = (0x180 - addend) / 2
        let k = ((0x180u16 - self.addend as u16) >> 1) as u8;
        data[0] = k ^ c;
    }

    /// Verify a sealed stream.
    pub fn verify(self, data: &[u8]) -> Result<()> {
        let computed = self.compute(data);
        if computed != Self::EXPECTED {
            return Err(EpError::checksum_mismatch(Self::EXPECTED, computed));
        }
        Ok(())
    }
}
