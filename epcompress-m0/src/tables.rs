//! M0 alphabets, value classes, gamma codes and delta matches.
//!
//! The main alphabet has 324 symbols:
//!
//! | symbols         | meaning                                         |
//! |-----------------|-------------------------------------------------|
//! | `0x000..=0x0FF` | literal byte                                    |
//! | `0x100..=0x13B` | match, distance class `s - 0x100`               |
//! | `0x13C..=0x13F` | delta match at distance `s - 0x13B`, 7-bit delta |
//! | `0x140..=0x143` | match at a recently used distance               |
//!
//! Every match is followed by a symbol of the 28-symbol length alphabet,
//! the class of `length - 2`.

use epcompress_core::bitstream::{BitReader, Token, stream_bits};
use epcompress_core::error::{EpError, Result};
use epcompress_core::huffman::{HuffmanBuilder, HuffmanDecoder, MAX_CODE_LENGTH, canonical_codes};

/// Shortest match.
pub const MIN_MATCH: usize = 2;
/// Longest match.
pub const MAX_MATCH: usize = 256;
/// Largest match distance.
pub const MAX_OFFSET: usize = 65_536;
/// Size of the main alphabet.
pub const SYMBOL_COUNT: usize = 324;
/// Size of the length alphabet.
pub const LENGTH_SYMBOL_COUNT: usize = 28;
/// First distance class symbol.
pub const DISTANCE_BASE: u16 = 0x100;
/// First delta match symbol.
pub const DELTA_BASE: u16 = 0x13C;
/// First recent-distance symbol.
pub const RECENT_BASE: u16 = 0x140;
/// Symbol width when the main alphabet is not Huffman coded.
pub const RAW_SYMBOL_BITS: u8 = 9;
/// Symbol width when the length alphabet is not Huffman coded.
pub const RAW_LENGTH_BITS: u8 = 5;
/// Distances up to this are coded directly and never cached.
pub const SHORT_DISTANCE_MAX: usize = 8;
/// Number of cached recent distances.
pub const RECENT_DISTANCES: usize = 4;
/// Largest distance of a delta match.
pub const MAX_DELTA_DISTANCE: usize = 4;
/// Bits of the delta value following a delta match symbol.
pub const DELTA_BITS: u8 = 7;

const CLASS_LIMIT: u8 = 0x3C;
const GAMMA_LIMIT: u32 = 325;

/// A value split into a class code and extra bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassCode {
    /// Class code.
    pub code: u8,
    /// Number of extra bits.
    pub extra_bits: u8,
    /// Extra bit value.
    pub extra: u32,
}

impl ClassCode {
    /// Class of `value` (0..=65535).
    ///
    /// Values below 8 are their own class. Larger values keep their two bits
    /// below the leading one and their bit length in the class code; the
    /// remaining low bits follow as extra bits.
    pub fn of(value: u32) -> Self {
        if value < 8 {
            return Self {
                code: value as u8,
                extra_bits: 0,
                extra: 0,
            };
        }
        let bits = 32 - value.leading_zeros();
        let extra_bits = bits - 3;
        Self {
            code: (((value >> extra_bits) & 3) | ((bits - 2) << 2)) as u8,
            extra_bits: extra_bits as u8,
            extra: value & ((1 << extra_bits) - 1),
        }
    }

    /// Extra bits as a token, if there are any.
    pub fn extra_token(&self) -> Option<Token> {
        (self.extra_bits > 0).then(|| Token::bits(self.extra, self.extra_bits))
    }

    /// Read the extra bits of class `code` and return the value.
    pub fn read_value(code: u8, reader: &mut BitReader<'_>) -> Result<u32> {
        if code < 8 {
            return Ok(code as u32);
        }
        if code >= CLASS_LIMIT {
            return Err(EpError::corrupted(reader.position(), format!("invalid value class {code}")));
        }
        let extra_bits = (code >> 2) - 1;
        let base = ((code as u32 & 3) | 4) << extra_bits;
        Ok(base | reader.read_bits(extra_bits)?)
    }
}

/// Length of the Elias gamma code of `n` (n >= 1).
pub fn gamma_length(n: u32) -> usize {
    1 + 2 * (31 - n.leading_zeros()) as usize
}

/// Append the gamma code of `n` (n >= 1): for every bit below the leading
/// one, most significant first, a `1` and the bit; then a `0`.
pub fn write_gamma(n: u32, tokens: &mut Vec<Token>) {
    let bits = 31 - n.leading_zeros();
    for i in (0..bits).rev() {
        tokens.push(Token::bits(2 | ((n >> i) & 1), 2));
    }
    tokens.push(Token::bits(0, 1));
}

/// Read a gamma code. Values above 325 are never written.
pub fn read_gamma(reader: &mut BitReader<'_>) -> Result<u32> {
    let mut value = 1u32;
    while reader.read_bit()? {
        value = (value << 1) | reader.read_bit()? as u32;
        if value > GAMMA_LIMIT {
            return Err(EpError::corrupted(reader.position(), "gamma code out of range"));
        }
    }
    Ok(value)
}

/// 7-bit code of a delta value (`0xC0..=0xFF` or `0x01..=0x40`).
pub fn encode_delta(delta: u8) -> u32 {
    let t = delta.wrapping_add(0x40);
    (if t > 0x40 { t - 1 } else { t }) as u32
}

/// Delta value of a 7-bit code.
pub fn decode_delta(code: u32) -> u8 {
    let code = code as u8 & 0x7F;
    if code < 0x40 {
        code.wrapping_add(0xC0)
    } else {
        code - 0x3F
    }
}

fn is_delta_value(delta: u8) -> bool {
    delta != 0 && (delta >= 0xC0 || delta <= 0x40)
}

/// The longest delta match at one distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaRun {
    /// Value added to every source byte.
    pub delta: u8,
    /// Match length (0 = none).
    pub len: u16,
}

/// Delta matches at distances 1..=4 for every position of a buffer.
#[derive(Debug)]
pub struct DeltaMatches {
    runs: Vec<[DeltaRun; MAX_DELTA_DISTANCE]>,
}

impl DeltaMatches {
    /// Find the delta matches of `buf`.
    pub fn build(buf: &[u8]) -> Self {
        let mut runs = vec![[DeltaRun::default(); MAX_DELTA_DISTANCE]; buf.len()];
        for distance in 1..=MAX_DELTA_DISTANCE {
            // Walk backwards counting positions with the same difference.
            let mut same = 0usize;
            let mut next_delta = None;
            for i in (distance..buf.len()).rev() {
                let delta = buf[i].wrapping_sub(buf[i - distance]);
                same = if next_delta == Some(delta) { same + 1 } else { 1 };
                next_delta = Some(delta);
                let len = same.min(MAX_MATCH);
                if len >= MIN_MATCH && is_delta_value(delta) {
                    runs[i][distance - 1] = DeltaRun {
                        delta,
                        len: len as u16,
                    };
                }
            }
        }
        Self { runs }
    }

    /// Delta match at `pos` with `distance` (1..=4).
    pub fn get(&self, pos: usize, distance: usize) -> Option<DeltaRun> {
        let run = *self.runs.get(pos)?.get(distance.checked_sub(1)?)?;
        (run.len > 0).then_some(run)
    }
}

/// Code of one alphabet in one block: canonical Huffman or fixed width.
#[derive(Debug, Clone)]
pub struct AlphabetCode {
    lengths: Vec<u8>,
    codes: Vec<u32>,
    description: Vec<Token>,
}

impl AlphabetCode {
    /// Fixed-width code.
    pub fn raw(size: usize, bits: u8) -> Self {
        Self {
            lengths: vec![bits; size],
            codes: (0..size as u32).collect(),
            description: vec![Token::bits(0, 1)],
        }
    }

    /// Length-limited canonical Huffman code for the builder's statistics.
    pub fn huffman(builder: &HuffmanBuilder, size: usize) -> Self {
        let mut lengths = builder.build_lengths();
        lengths.resize(size, 0);
        let mut codes = canonical_codes(&lengths);
        // The 7-bit all-ones code is reserved.
        if let Some(s) = (0..size).find(|&s| lengths[s] == 7 && codes[s] == 0x7F) {
            lengths[s] = 8;
            codes[s] = 0xFE;
        }

        let mut description = vec![Token::bits(1, 1)];
        for len in 1..=MAX_CODE_LENGTH as u8 {
            let symbols: Vec<u32> = (0..size as u32).filter(|&s| lengths[s as usize] == len).collect();
            write_gamma(symbols.len() as u32 + 1, &mut description);
            let mut previous = u32::MAX;
            for s in symbols {
                write_gamma(s.wrapping_sub(previous), &mut description);
                previous = s;
            }
        }
        Self {
            lengths,
            codes,
            description,
        }
    }

    /// Size of the code of `symbol` in bits (0 = no code).
    pub fn symbol_size(&self, symbol: usize) -> usize {
        self.lengths.get(symbol).copied().unwrap_or(0) as usize
    }

    /// The code of `symbol`.
    pub fn token(&self, symbol: usize) -> Token {
        Token::bits(self.codes[symbol], self.lengths[symbol])
    }

    /// Table description written before the block's symbols.
    pub fn description(&self) -> &[Token] {
        &self.description
    }

    /// Description plus coded symbols, for the given frequencies.
    pub fn encoded_size(&self, builder: &HuffmanBuilder) -> usize {
        let symbols: usize = (0..self.lengths.len())
            .map(|s| builder.frequency(s) as usize * self.symbol_size(s))
            .sum();
        stream_bits(&self.description) + symbols
    }
}

/// Decoder for one alphabet.
#[derive(Debug, Clone)]
pub enum AlphabetDecoder {
    /// Fixed-width symbols.
    Raw(u8),
    /// Canonical Huffman code.
    Huffman(HuffmanDecoder),
}

impl AlphabetDecoder {
    /// Read a table description for an alphabet of `size` symbols.
    pub fn read(reader: &mut BitReader<'_>, size: usize, raw_bits: u8) -> Result<Self> {
        if !reader.read_bit()? {
            return Ok(Self::Raw(raw_bits));
        }
        let mut used = vec![false; size];
        let mut total = 0usize;
        let mut by_length = Vec::with_capacity(MAX_CODE_LENGTH);
        for _ in 0..MAX_CODE_LENGTH {
            let count = read_gamma(reader)? as usize - 1;
            if count > size {
                return Err(EpError::invalid_table("too many Huffman codes of one length"));
            }
            let mut symbols = Vec::with_capacity(count);
            let mut symbol = u32::MAX;
            for _ in 0..count {
                symbol = symbol.wrapping_add(read_gamma(reader)?);
                let index = symbol as usize;
                if index >= size || total >= size || used[index] {
                    return Err(EpError::invalid_table(format!("invalid Huffman symbol {index}")));
                }
                used[index] = true;
                total += 1;
                symbols.push(symbol as u16);
            }
            by_length.push(symbols);
        }
        Ok(Self::Huffman(HuffmanDecoder::from_symbol_lists(&by_length)?))
    }

    /// Decode one symbol.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        match self {
            Self::Raw(bits) => Ok(reader.read_bits(*bits)? as u16),
            Self::Huffman(decoder) => decoder.decode(reader),
        }
    }
}
