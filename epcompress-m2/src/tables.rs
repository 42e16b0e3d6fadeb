//! M2 code tables.
//!
//! A match is written as a length code followed by an offset code. The
//! length slot prefix is unary (`slot + 1` one-bits and a terminating zero),
//! nine one-bits introduce a literal run. The offset table depends on the
//! match length: length 1 and 2 matches have their own short tables, longer
//! matches use a table whose prefix size is chosen per block.

use epcompress_core::bitstream::{BitReader, Token};
use epcompress_core::error::{EpError, Result};
use epcompress_core::slot::{SlotDecodeTable, SlotEncodeTable};

/// Shortest match.
pub const MIN_MATCH: usize = 1;
/// Longest match the parser considers at every length.
pub const MAX_SEARCH_LENGTH: usize = 512;
/// Longest match.
pub const MAX_MATCH: usize = 65_535;
/// Largest match offset.
pub const MAX_OFFSET: usize = 65_535;

/// Number of length slots.
pub const LENGTH_SLOTS: usize = 8;
/// Prefix size of each length slot, not counting the leading one-bit.
pub const LENGTH_PREFIX_SIZES: [usize; LENGTH_SLOTS] = [1, 2, 3, 4, 5, 6, 7, 8];

/// Offsets encodable by length 1 matches.
pub const OFFS1_MAX: usize = 4096;
/// Slots of the length 1 offset table.
pub const OFFS1_SLOTS: usize = 4;
/// Prefix size of the length 1 offset table.
pub const OFFS1_PREFIX: usize = 2;

/// Offsets encodable by length 2 matches.
pub const OFFS2_MAX: usize = 16_384;
/// Slots of the length 2 offset table.
pub const OFFS2_SLOTS: usize = 8;
/// Prefix size of the length 2 offset table.
pub const OFFS2_PREFIX: usize = 3;

/// Smallest prefix size of the long offset table.
pub const OFFS3_MIN_PREFIX: usize = 2;
/// Slot count for each long offset prefix size (2, 3, 4, 5).
pub const OFFS3_SLOT_COUNTS: [usize; 4] = [4, 8, 16, 32];

/// Shortest literal run.
pub const LITERAL_RUN_MIN: usize = LENGTH_SLOTS + 9;
/// Longest literal run.
pub const LITERAL_RUN_MAX: usize = LITERAL_RUN_MIN + 255;

/// Code lengths above this are treated as not encodable.
pub const MAX_CODE_BITS: usize = 64;

/// Cost of an unencodable length while parsing with statistics.
pub(crate) const PARSE_UNUSED_LENGTH_SIZE: usize = LENGTH_SLOTS + 15;

/// Token introducing a literal run: nine one-bits.
pub(crate) fn literal_run_marker() -> Token {
    Token::bits((1 << (LENGTH_SLOTS + 1)) - 1, (LENGTH_SLOTS + 1) as u8)
}

/// The four encode tables of a block.
#[derive(Debug, Clone)]
pub struct EncodeTables {
    /// Match lengths minus one.
    pub length: SlotEncodeTable,
    /// Offsets of length 1 matches.
    pub offs1: SlotEncodeTable,
    /// Offsets of length 2 matches.
    pub offs2: SlotEncodeTable,
    /// Offsets of longer matches.
    pub offs3: SlotEncodeTable,
}

impl EncodeTables {
    /// Create empty tables.
    pub fn new() -> Result<Self> {
        Ok(Self {
            length: SlotEncodeTable::with_prefix_sizes(MAX_MATCH, &LENGTH_PREFIX_SIZES)?,
            offs1: SlotEncodeTable::fixed(OFFS1_MAX, OFFS1_PREFIX, OFFS1_SLOTS)?,
            offs2: SlotEncodeTable::fixed(OFFS2_MAX, OFFS2_PREFIX, OFFS2_SLOTS)?,
            offs3: SlotEncodeTable::prefix_range(MAX_OFFSET, OFFS3_MIN_PREFIX, &OFFS3_SLOT_COUNTS)?,
        })
    }

    /// Forget all statistics and encodable ranges.
    pub fn clear(&mut self) {
        self.length.clear();
        self.offs1.clear();
        self.offs2.clear();
        self.offs3.clear();
    }

    /// Offset table used by matches of `len` bytes.
    pub fn offset_table(&self, len: usize) -> &SlotEncodeTable {
        match len {
            1 => &self.offs1,
            2 => &self.offs2,
            _ => &self.offs3,
        }
    }

    /// Mutable offset table used by matches of `len` bytes.
    pub fn offset_table_mut(&mut self, len: usize) -> &mut SlotEncodeTable {
        match len {
            1 => &mut self.offs1,
            2 => &mut self.offs2,
            _ => &mut self.offs3,
        }
    }

    /// Size in bits of a match of `len` bytes at `distance`.
    #[inline]
    pub fn match_size(&self, distance: usize, len: usize) -> usize {
        self.length.symbol_size(len - MIN_MATCH)
            + 1
            + self.offset_table(len).symbol_size(distance - 1)
    }

    /// Append the tokens of a match.
    pub fn write_match(&self, distance: usize, len: usize, out: &mut Vec<Token>) -> Result<()> {
        let length = self.length.encode(len - MIN_MATCH)?;
        let prefix = length.slot + 2;
        out.push(Token::bits((1 << prefix) - 2, prefix as u8));
        if length.width > 0 {
            out.push(length.extra_token());
        }

        let table = self.offset_table(len);
        let offset = table.encode(distance - 1)?;
        let prefix_bits = match len {
            1 => OFFS1_PREFIX,
            2 => OFFS2_PREFIX,
            _ => table.prefix_size(),
        };
        out.push(Token::bits(offset.slot as u32, prefix_bits as u8));
        if offset.width > 0 {
            out.push(offset.extra_token());
        }
        Ok(())
    }

    /// Append the table descriptor of a compressed block.
    pub fn write_descriptor(&self, out: &mut Vec<Token>) {
        out.push(Token::bits((self.offs3.prefix_size() - OFFS3_MIN_PREFIX) as u32, 2));
        for table in [&self.length, &self.offs1, &self.offs2, &self.offs3] {
            for slot in 0..table.slot_count() {
                out.push(Token::bits(table.slot_width(slot) as u32, 4));
            }
        }
    }
}

/// Decode tables read from a block descriptor.
#[derive(Debug, Clone)]
pub struct DecodeTables {
    length: SlotDecodeTable,
    offs1: SlotDecodeTable,
    offs2: SlotDecodeTable,
    offs3: SlotDecodeTable,
    offs3_prefix: u8,
}

/// A decoded M2 symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// One literal byte follows.
    Literal,
    /// A run of literal bytes follows.
    LiteralRun(usize),
    /// A match of `len` bytes (the offset code follows).
    Match(usize),
}

impl DecodeTables {
    /// Read a table descriptor.
    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let offs3_prefix = reader.read_bits(2)? as u8 + OFFS3_MIN_PREFIX as u8;
        Ok(Self {
            length: SlotDecodeTable::read(reader, LENGTH_SLOTS)?,
            offs1: SlotDecodeTable::read(reader, OFFS1_SLOTS)?,
            offs2: SlotDecodeTable::read(reader, OFFS2_SLOTS)?,
            offs3: SlotDecodeTable::read(reader, 1 << offs3_prefix)?,
            offs3_prefix,
        })
    }

    /// Read the next symbol code.
    pub fn read_symbol(&self, reader: &mut BitReader<'_>) -> Result<Symbol> {
        let mut ones = 0usize;
        while ones <= LENGTH_SLOTS && reader.read_bit()? {
            ones += 1;
        }
        Ok(match ones {
            0 => Symbol::Literal,
            n if n > LENGTH_SLOTS => {
                Symbol::LiteralRun(reader.read_bits(8)? as usize + LITERAL_RUN_MIN)
            }
            n => Symbol::Match(self.length.decode(n - 1, reader)? as usize + MIN_MATCH),
        })
    }

    /// Read the offset of a match of `len` bytes.
    pub fn read_offset(&self, len: usize, reader: &mut BitReader<'_>) -> Result<usize> {
        let (table, prefix) = match len {
            1 => (&self.offs1, OFFS1_PREFIX as u8),
            2 => (&self.offs2, OFFS2_PREFIX as u8),
            _ => (&self.offs3, self.offs3_prefix),
        };
        let slot = reader.read_bits(prefix)? as usize;
        let value = table.decode(slot, reader)? as usize;
        if value >= MAX_OFFSET {
            return Err(EpError::corrupted(reader.position(), format!("match offset {} out of range", value + 1)));
        }
        Ok(value + 1)
    }
}
