//! M0 decompressor.

use crate::tables::{
    AlphabetDecoder, ClassCode, DELTA_BASE, DELTA_BITS, DISTANCE_BASE, LENGTH_SYMBOL_COUNT, MIN_MATCH,
    RAW_LENGTH_BITS, RAW_SYMBOL_BITS, RECENT_BASE, RECENT_DISTANCES, SYMBOL_COUNT, decode_delta,
};
use epcompress_core::bitstream::BitReader;
use epcompress_core::checksum::Checksum;
use epcompress_core::error::{EpError, Result};
use epcompress_core::traits::{AddressedBlock, Decompressor, Profile};
use epcompress_core::window::{AddressSpace, DEFAULT_OUTPUT_LIMIT, OutputWindow};
use log::trace;

/// Symbols at or above this are invalid.
const SYMBOL_LIMIT: u16 = 0x144;
/// Distance classes below this code the distance directly.
const SHORT_CLASS_END: u16 = DISTANCE_BASE + 8;

/// M0 stream decompressor.
#[derive(Debug, Clone)]
pub struct M0Decompressor {
    output_limit: usize,
}

impl M0Decompressor {
    /// Create a decompressor.
    pub fn new() -> Self {
        Self::with_output_limit(DEFAULT_OUTPUT_LIMIT)
    }

    /// Create a decompressor whose raw output may not exceed `limit` bytes.
    pub fn with_output_limit(limit: usize) -> Self {
        Self { output_limit: limit }
    }
}

impl Default for M0Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

fn open(input: &[u8]) -> Result<BitReader<'_>> {
    if input.is_empty() {
        return Err(EpError::invalid_input("empty compressed stream"));
    }
    Checksum::M0.verify(input)?;
    Ok(BitReader::msb_first(input, 1))
}

fn check_end(reader: &BitReader<'_>) -> Result<()> {
    if !reader.is_cleanly_finished() {
        return Err(EpError::corrupted(reader.position(), "trailing data after the last block"));
    }
    Ok(())
}

/// Recently used long distances, stored as `distance - 1`.
struct RecentDistances {
    values: [u32; RECENT_DISTANCES],
    head: usize,
}

impl RecentDistances {
    fn new() -> Self {
        Self {
            values: [u32::MAX; RECENT_DISTANCES],
            head: 0,
        }
    }

    fn push(&mut self, value: u32) {
        self.head = (self.head + RECENT_DISTANCES - 1) % RECENT_DISTANCES;
        self.values[self.head] = value;
    }

    fn get(&self, slot: usize) -> u32 {
        self.values[(self.head + slot) % RECENT_DISTANCES]
    }
}

/// Block header after the optional address field.
struct BlockHeader {
    count: usize,
    is_last: bool,
}

/// Decode one block after its optional address field.
fn decode_block<W: OutputWindow>(reader: &mut BitReader<'_>, out: &mut W) -> Result<BlockHeader> {
    let count = (reader.read_bits(16)? ^ 0xFFFF) as usize + 1;
    let is_last = reader.read_bit()?;
    let compressed = reader.read_bit()?;
    trace!(
        "M0 block at {}: {} bytes, {}, last {}",
        out.position(),
        count,
        if compressed { "compressed" } else { "stored" },
        is_last
    );
    let header = BlockHeader { count, is_last };
    if !compressed {
        for _ in 0..count {
            out.write_byte(reader.read_bits(8)? as u8)?;
        }
        return Ok(header);
    }

    let symbols = AlphabetDecoder::read(reader, SYMBOL_COUNT, RAW_SYMBOL_BITS)?;
    let lengths = AlphabetDecoder::read(reader, LENGTH_SYMBOL_COUNT, RAW_LENGTH_BITS)?;
    let mut recent = RecentDistances::new();
    let mut written = 0usize;
    while written < count {
        let symbol = symbols.decode(reader)?;
        if symbol >= SYMBOL_LIMIT {
            return Err(EpError::corrupted(reader.position(), format!("invalid symbol 0x{symbol:03X}")));
        }
        if symbol < DISTANCE_BASE {
            out.write_byte(symbol as u8)?;
            written += 1;
            continue;
        }
        let (offset, delta) = if symbol >= RECENT_BASE {
            (recent.get((symbol - RECENT_BASE) as usize), 0)
        } else if symbol >= DELTA_BASE {
            let delta = decode_delta(reader.read_bits(DELTA_BITS)?);
            ((symbol - DELTA_BASE) as u32, delta)
        } else if symbol < SHORT_CLASS_END {
            ((symbol - DISTANCE_BASE) as u32, 0)
        } else {
            let offset = ClassCode::read_value((symbol - DISTANCE_BASE) as u8, reader)?;
            recent.push(offset);
            (offset, 0)
        };
        if offset > 0xFFFF {
            return Err(EpError::corrupted(reader.position(), "match distance out of range"));
        }
        let length_code = lengths.decode(reader)?;
        let len = ClassCode::read_value(length_code as u8, reader)? as usize + MIN_MATCH;
        if written + len > count {
            return Err(EpError::corrupted(reader.position(), "match crosses the end of the block"));
        }
        out.copy_match(offset as usize + 1, len, delta)?;
        written += len;
    }
    Ok(header)
}

impl Decompressor for M0Decompressor {
    fn profile(&self) -> Profile {
        Profile::M0
    }

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut reader = open(input)?;
        let mut window = AddressSpace::wrapping();
        let mut out = Vec::new();
        loop {
            let start = window.position();
            let header = decode_block(&mut reader, &mut window)?;
            if out.len() + header.count > self.output_limit {
                return Err(EpError::corrupted(
                    reader.position(),
                    format!("decompressed data exceeds {} bytes", self.output_limit),
                ));
            }
            out.extend(window.wrapped_range(start, header.count));
            if header.is_last {
                break;
            }
        }
        check_end(&reader)?;
        Ok(out)
    }

    fn decompress_blocks(&mut self, input: &[u8]) -> Result<Vec<AddressedBlock>> {
        let mut reader = open(input)?;
        let mut memory = AddressSpace::addressed();
        loop {
            let address = reader.read_bits(16)? as usize;
            memory.set_cursor(address);
            if decode_block(&mut reader, &mut memory)?.is_last {
                break;
            }
        }
        check_end(&reader)?;
        Ok(memory.blocks())
    }
}
