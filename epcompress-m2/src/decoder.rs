//! M2 decompressor.

use crate::tables::{DecodeTables, MAX_MATCH, Symbol};
use epcompress_core::bitstream::BitReader;
use epcompress_core::checksum::Checksum;
use epcompress_core::error::{EpError, Result};
use epcompress_core::traits::{AddressedBlock, Decompressor, Profile};
use epcompress_core::window::{AddressSpace, DEFAULT_OUTPUT_LIMIT, LinearOutput, OutputWindow};
use log::trace;

/// M2 stream decompressor.
#[derive(Debug, Clone)]
pub struct M2Decompressor {
    output_limit: usize,
}

impl M2Decompressor {
    /// Create a decompressor.
    pub fn new() -> Self {
        Self::with_output_limit(DEFAULT_OUTPUT_LIMIT)
    }

    /// Create a decompressor whose raw output may not exceed `limit` bytes.
    pub fn with_output_limit(limit: usize) -> Self {
        Self { output_limit: limit }
    }
}

impl Default for M2Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify the checksum and position a reader after it.
fn open(input: &[u8]) -> Result<BitReader<'_>> {
    if input.is_empty() {
        return Err(EpError::invalid_input("empty compressed stream"));
    }
    Checksum::M2.verify(input)?;
    Ok(BitReader::msb_first(input, 1))
}

fn check_end(reader: &BitReader<'_>) -> Result<()> {
    if !reader.is_cleanly_finished() {
        return Err(EpError::corrupted(reader.position(), "trailing data after the last block"));
    }
    Ok(())
}

/// Decode one block after its optional address field. Returns the
/// last-block flag.
fn decode_block<W: OutputWindow>(reader: &mut BitReader<'_>, out: &mut W) -> Result<bool> {
    let count = reader.read_bits(16)? as usize + 1;
    let is_last = reader.read_bit()?;
    let compressed = reader.read_bit()?;
    trace!(
        "M2 block at {}: {} {}, last {}",
        out.position(),
        count,
        if compressed { "symbols" } else { "bytes" },
        is_last
    );
    if !compressed {
        for _ in 0..count {
            out.write_byte(reader.read_aligned_byte()?)?;
        }
        return Ok(is_last);
    }

    let tables = DecodeTables::read(reader)?;
    for _ in 0..count {
        match tables.read_symbol(reader)? {
            Symbol::Literal => out.write_byte(reader.read_aligned_byte()?)?,
            Symbol::LiteralRun(len) => {
                for _ in 0..len {
                    out.write_byte(reader.read_aligned_byte()?)?;
                }
            }
            Symbol::Match(len) => {
                if len > MAX_MATCH {
                    return Err(EpError::corrupted(reader.position(), format!("match length {len} out of range")));
                }
                let distance = tables.read_offset(len, reader)?;
                out.copy_match(distance, len, 0)?;
            }
        }
    }
    Ok(is_last)
}

impl Decompressor for M2Decompressor {
    fn profile(&self) -> Profile {
        Profile::M2
    }

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut reader = open(input)?;
        let mut out = LinearOutput::new(self.output_limit);
        while !decode_block(&mut reader, &mut out)? {}
        check_end(&reader)?;
        Ok(out.into_inner())
    }

    fn decompress_blocks(&mut self, input: &[u8]) -> Result<Vec<AddressedBlock>> {
        let mut reader = open(input)?;
        let mut memory = AddressSpace::addressed();
        loop {
            let address = reader.read_bits(16)? as usize;
            memory.set_cursor(address);
            if decode_block(&mut reader, &mut memory)? {
                break;
            }
        }
        check_end(&reader)?;
        Ok(memory.blocks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcompress_core::bitstream::BitWriter;

    fn sealed(build: impl FnOnce(&mut BitWriter)) -> Vec<u8> {
        let mut writer = BitWriter::msb_first();
        writer.write_aligned_byte(0);
        build(&mut writer);
        let mut data = writer.finish();
        Checksum::M2.seal(&mut data);
        data
    }

    #[test]
    fn test_stored_block() {
        let data = sealed(|w| {
            w.write_bits(2, 16);
            w.write_bit(true);
            w.write_bit(false);
            for b in [7, 8, 9] {
                w.write_aligned_byte(b);
            }
        });
        assert_eq!(M2Decompressor::new().decompress(&data).unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_addressed_stored_blocks() {
        let data = sealed(|w| {
            for (address, bytes, last) in [(0x4000u32, &[1u8, 2][..], false), (0x4002, &[3][..], true)] {
                w.write_bits(address, 16);
                w.write_bits(bytes.len() as u32 - 1, 16);
                w.write_bit(last);
                w.write_bit(false);
                for &b in bytes {
                    w.write_aligned_byte(b);
                }
            }
        });
        let blocks = M2Decompressor::new().decompress_blocks(&data).unwrap();
        assert_eq!(
            blocks,
            vec![AddressedBlock {
                start: 0x4000,
                data: vec![1, 2, 3]
            }]
        );
    }

    #[test]
    fn test_overlapping_blocks_rejected() {
        let data = sealed(|w| {
            for last in [false, true] {
                w.write_bits(0x8000, 16);
                w.write_bits(0, 16);
                w.write_bit(last);
                w.write_bit(false);
                w.write_aligned_byte(0x55);
            }
        });
        assert!(matches!(
            M2Decompressor::new().decompress_blocks(&data),
            Err(EpError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_truncated_and_corrupted() {
        let data = sealed(|w| {
            w.write_bits(4, 16);
            w.write_bit(true);
            w.write_bit(false);
            w.write_aligned_byte(1);
        });
        let err = M2Decompressor::new().decompress(&data).unwrap_err();
        assert!(err.is_data_error());

        let mut flipped = data.clone();
        flipped[2] ^= 0x10;
        assert!(matches!(
            M2Decompressor::new().decompress(&flipped),
            Err(EpError::ChecksumMismatch { .. })
        ));
        assert!(M2Decompressor::new().decompress(&[]).is_err());
    }

    #[test]
    fn test_output_limit() {
        let data = sealed(|w| {
            w.write_bits(9, 16);
            w.write_bit(true);
            w.write_bit(false);
            for b in 0..10 {
                w.write_aligned_byte(b);
            }
        });
        assert!(M2Decompressor::with_output_limit(4).decompress(&data).is_err());
        assert_eq!(M2Decompressor::with_output_limit(10).decompress(&data).unwrap().len(), 10);
    }
}
