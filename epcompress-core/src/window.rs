//! Decoder output targets.
//!
//! Addressed streams load their blocks into the 64 KiB address space of the
//! target machine. Every byte may be written only once and a back-reference
//! may only read bytes that were already written, so a damaged stream can
//! never read undefined memory. Raw streams are either decoded into a
//! 64 KiB wrapping window or into a growing linear buffer.

use crate::error::{EpError, Result};
use crate::traits::AddressedBlock;

/// Size of the target address space.
pub const ADDRESS_SPACE_SIZE: usize = 0x1_0000;

/// Largest raw output accepted by [`LinearOutput::new`] callers by default.
pub const DEFAULT_OUTPUT_LIMIT: usize = 16 << 20;

/// Common operations of decoder output targets.
pub trait OutputWindow {
    /// Append one byte.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Copy `length` bytes from `distance` bytes back, adding `delta` to
    /// every copied byte.
    fn copy_match(&mut self, distance: usize, length: usize, delta: u8) -> Result<()>;

    /// Current write position.
    fn position(&self) -> usize;
}

/// How an [`AddressSpace`] treats writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// Writes past 0xFFFF and writes to used addresses are errors.
    Addressed,
    /// The write position wraps at 64 KiB and bytes may be overwritten.
    Wrapping,
}

/// The 64 KiB memory image of the target machine.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    memory: Vec<u8>,
    used: Vec<bool>,
    cursor: usize,
    mode: AddressMode,
}

impl AddressSpace {
    /// Create an empty address space.
    pub fn new(mode: AddressMode) -> Self {
        Self {
            memory: vec![0; ADDRESS_SPACE_SIZE],
            used: vec![false; ADDRESS_SPACE_SIZE],
            cursor: 0,
            mode,
        }
    }

    /// Address space for addressed streams.
    pub fn addressed() -> Self {
        Self::new(AddressMode::Addressed)
    }

    /// Wrapping window for raw streams.
    pub fn wrapping() -> Self {
        Self::new(AddressMode::Wrapping)
    }

    /// Move the write position.
    pub fn set_cursor(&mut self, address: usize) {
        self.cursor = match self.mode {
            AddressMode::Addressed => address,
            AddressMode::Wrapping => address & 0xFFFF,
        };
    }

    /// Whether `address` holds decoded data.
    pub fn is_used(&self, address: usize) -> bool {
        self.used.get(address).copied().unwrap_or(false)
    }

    /// Byte at `address`; the address must hold decoded data.
    pub fn read(&self, address: usize) -> Result<u8> {
        if !self.is_used(address) {
            return Err(EpError::invalid_address(address, "read from unwritten memory"));
        }
        Ok(self.memory[address])
    }

    /// `len` bytes starting at `start`, wrapping at 64 KiB.
    pub fn wrapped_range(&self, start: usize, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.memory[(start + i) & 0xFFFF])
            .collect()
    }

    /// Contiguous runs of decoded bytes, in address order.
    pub fn blocks(&self) -> Vec<AddressedBlock> {
        let mut blocks = Vec::new();
        let mut start = None;
        for address in 0..=ADDRESS_SPACE_SIZE {
            let used = address < ADDRESS_SPACE_SIZE && self.used[address];
            match (used, start) {
                (true, None) => start = Some(address),
                (false, Some(s)) => {
                    blocks.push(AddressedBlock {
                        start: s as u16,
                        data: self.memory[s..address].to_vec(),
                    });
                    start = None;
                }
                _ => {}
            }
        }
        blocks
    }

    fn advance(&mut self) {
        self.cursor += 1;
        if self.mode == AddressMode::Wrapping {
            self.cursor &= 0xFFFF;
        }
    }
}

impl OutputWindow for AddressSpace {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        let address = self.cursor;
        if self.mode == AddressMode::Addressed {
            if address >= ADDRESS_SPACE_SIZE {
                return Err(EpError::invalid_address(address, "write beyond 64 KiB"));
            }
            if self.used[address] {
                return Err(EpError::invalid_address(address, "address written twice"));
            }
        }
        self.memory[address] = byte;
        self.used[address] = true;
        self.advance();
        Ok(())
    }

    fn copy_match(&mut self, distance: usize, length: usize, delta: u8) -> Result<()> {
        if distance == 0 || distance > ADDRESS_SPACE_SIZE {
            return Err(EpError::invalid_distance(distance, ADDRESS_SPACE_SIZE));
        }
        let mut source = self.cursor.wrapping_sub(distance) & 0xFFFF;
        for _ in 0..length {
            let byte = self.read(source)?.wrapping_add(delta);
            self.write_byte(byte)?;
            source = (source + 1) & 0xFFFF;
        }
        Ok(())
    }

    fn position(&self) -> usize {
        self.cursor
    }
}

/// Growing output buffer for raw streams.
#[derive(Debug, Clone)]
pub struct LinearOutput {
    data: Vec<u8>,
    limit: usize,
}

impl LinearOutput {
    /// Create an empty buffer holding at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    /// Decoded bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Take the decoded bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn check_room(&self, extra: usize) -> Result<()> {
        if self.data.len() + extra > self.limit {
            return Err(EpError::corrupted(
                self.data.len(),
                format!("decompressed data exceeds {} bytes", self.limit),
            ));
        }
        Ok(())
    }
}

impl Default for LinearOutput {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT)
    }
}

impl OutputWindow for LinearOutput {
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.check_room(1)?;
        self.data.push(byte);
        Ok(())
    }

    fn copy_match(&mut self, distance: usize, length: usize, delta: u8) -> Result<()> {
        if distance == 0 || distance > self.data.len() {
            return Err(EpError::invalid_distance(distance, self.data.len()));
        }
        self.check_room(length)?;
        let start = self.data.len() - distance;
        // Overlapping copies repeat the pattern byte by byte.
        for i in 0..length {
            let byte = self.data[start + i].wrapping_add(delta);
            self.data.push(byte);
        }
        Ok(())
    }

    fn position(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addressed_blocks() {
        let mut space = AddressSpace::addressed();
        space.set_cursor(0x0100);
        for b in [1u8, 2, 3] {
            space.write_byte(b).unwrap();
        }
        space.copy_match(3, 4, 0).unwrap();
        space.set_cursor(0xFFFE);
        space.write_byte(9).unwrap();
        space.write_byte(8).unwrap();

        let blocks = space.blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].start, 0x0100);
        assert_eq!(blocks[0].data, vec![1, 2, 3, 1, 2, 3, 1]);
        assert_eq!(blocks[1].start, 0xFFFE);
        assert_eq!(blocks[1].end(), ADDRESS_SPACE_SIZE);
    }

    #[test]
    fn test_addressed_rejects_overwrite_and_overflow() {
        let mut space = AddressSpace::addressed();
        space.set_cursor(0x10);
        space.write_byte(0).unwrap();
        space.set_cursor(0x10);
        assert!(matches!(space.write_byte(1), Err(EpError::InvalidAddress { address: 0x10, .. })));

        space.set_cursor(0xFFFF);
        space.write_byte(0).unwrap();
        assert!(space.write_byte(0).is_err());
    }

    #[test]
    fn test_match_source_must_exist() {
        let mut space = AddressSpace::addressed();
        space.set_cursor(0x2000);
        space.write_byte(5).unwrap();
        assert!(space.copy_match(2, 1, 0).is_err());
        assert!(space.copy_match(1, 3, 1).is_ok());
        assert_eq!(space.blocks()[0].data, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_wrapping_window() {
        let mut space = AddressSpace::wrapping();
        space.set_cursor(0xFFFF);
        space.write_byte(0xAA).unwrap();
        assert_eq!(space.position(), 0);
        space.write_byte(0xBB).unwrap();
        space.copy_match(2, 2, 0).unwrap();
        assert_eq!(space.wrapped_range(0xFFFF, 4), vec![0xAA, 0xBB, 0xAA, 0xBB]);
    }

    #[test]
    fn test_linear_output() {
        let mut out = LinearOutput::new(8);
        out.write_byte(b'a').unwrap();
        out.write_byte(b'b').unwrap();
        out.copy_match(2, 5, 0).unwrap();
        assert_eq!(out.as_slice(), b"abababa");
        assert!(matches!(
            out.copy_match(9, 1, 0),
            Err(EpError::InvalidDistance { distance: 9, available: 7 })
        ));
        assert!(out.copy_match(1, 2, 0).is_err());
    }
}
