//! Bit-level I/O for the Enterprise compressed stream formats.
//!
//! All profiles pack variable-width codes into an 8-bit shift register and
//! interleave *byte-aligned* literal bytes with them. When a literal byte is
//! emitted while the register is partially filled, the writer reserves one
//! output byte for the register, appends the literal, and later stores the
//! completed register into the reserved slot. A reader that fetches a new
//! register byte whenever it needs a bit and reads literal bytes straight
//! from the current input position sees exactly the same layout.
//!
//! Compressors first produce a list of [`Token`]s (so that candidate encodings
//! can be sized and hashed cheaply) and serialize the winner through a
//! [`BitWriter`] at the end.

use crate::error::{EpError, Result};

/// Order in which bits enter and leave the shift register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// First bit lands in bit 7 of the byte; padding bits are zero.
    MsbFirst,
    /// First bit lands in bit 0 of the byte; padding bits are one.
    LsbFirst,
}

/// One unit of encoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `count` bits of `value`, most significant bit first.
    Bits {
        /// Code value; only the low `count` bits are used.
        value: u32,
        /// Number of bits (0..=24).
        count: u8,
    },
    /// A literal byte stored byte-aligned in the output.
    Byte(u8),
}

impl Token {
    /// Create a bit field token.
    #[inline]
    pub fn bits(value: u32, count: u8) -> Self {
        debug_assert!(count <= 24);
        Self::Bits {
            value: value & mask(count),
            count,
        }
    }

    /// Size of the token in the output, in bits.
    #[inline]
    pub fn bit_len(&self) -> usize {
        match *self {
            Self::Bits { count, .. } => count as usize,
            Self::Byte(_) => 8,
        }
    }

    /// Packed 32-bit form used for hashing token streams.
    ///
    /// Bit fields pack as `count << 24 | value`, aligned bytes set bit 31.
    #[inline]
    pub fn packed(&self) -> u32 {
        match *self {
            Self::Bits { value, count } => ((count as u32) << 24) | value,
            Self::Byte(b) => 0x8800_0000 | b as u32,
        }
    }
}

/// Total size of a token list in bits.
pub fn stream_bits(tokens: &[Token]) -> usize {
    tokens.iter().map(Token::bit_len).sum()
}

#[inline]
fn mask(count: u8) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}

/// Bit writer with byte-aligned literal support.
///
/// The writer keeps its register between calls, so several blocks can be
/// appended to one stream. [`finish`](Self::finish) pads the register and
/// returns the bytes.
#[derive(Debug)]
pub struct BitWriter {
    /// Output buffer.
    output: Vec<u8>,
    /// Shift register.
    register: u8,
    /// Number of bits in the register.
    bit_count: u8,
    /// Output slot reserved for the register, if any.
    reserved: Option<usize>,
    /// Bit order.
    order: BitOrder,
}

impl BitWriter {
    /// Create a writer with the given bit order.
    pub fn new(order: BitOrder) -> Self {
        Self {
            output: Vec::new(),
            register: 0,
            bit_count: 0,
            reserved: None,
            order,
        }
    }

    /// Create an MSB-first writer (zero padding).
    pub fn msb_first() -> Self {
        Self::new(BitOrder::MsbFirst)
    }

    /// Create an LSB-first writer (one padding).
    pub fn lsb_first() -> Self {
        Self::new(BitOrder::LsbFirst)
    }

    /// Write a single bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        match self.order {
            BitOrder::MsbFirst => self.register = (self.register << 1) | bit as u8,
            BitOrder::LsbFirst => self.register = (self.register >> 1) | ((bit as u8) << 7),
        }
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.store_register();
        }
    }

    /// Write the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: u8) {
        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    /// Write a byte-aligned literal byte.
    pub fn write_aligned_byte(&mut self, byte: u8) {
        if self.bit_count > 0 && self.reserved.is_none() {
            self.reserved = Some(self.output.len());
            self.output.push(0);
        }
        self.output.push(byte);
    }

    /// Write one token.
    #[inline]
    pub fn write_token(&mut self, token: &Token) {
        match *token {
            Token::Bits { value, count } => self.write_bits(value, count),
            Token::Byte(b) => self.write_aligned_byte(b),
        }
    }

    /// Write a token list.
    pub fn write_tokens(&mut self, tokens: &[Token]) {
        for token in tokens {
            self.write_token(token);
        }
    }

    fn store_register(&mut self) {
        match self.reserved.take() {
            Some(pos) => self.output[pos] = self.register,
            None => self.output.push(self.register),
        }
        self.register = 0;
        self.bit_count = 0;
    }

    /// Pad the register to a byte boundary and store it.
    pub fn flush(&mut self) {
        let pad = self.order == BitOrder::LsbFirst;
        while self.bit_count != 0 {
            self.write_bit(pad);
        }
    }

    /// Whether the register is empty.
    pub fn is_aligned(&self) -> bool {
        self.bit_count == 0
    }

    /// Number of bytes produced so far (including any reserved slot).
    pub fn len(&self) -> usize {
        self.output.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.output.is_empty() && self.bit_count == 0
    }

    /// Mutable access to the bytes produced so far.
    ///
    /// Used to patch header fields such as the checksum byte once the stream
    /// is complete.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.output
    }

    /// Flush and return the output.
    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        self.output
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::msb_first()
    }
}

/// Bit reader mirroring [`BitWriter`].
#[derive(Debug)]
pub struct BitReader<'a> {
    /// Input data.
    data: &'a [u8],
    /// Next input position.
    pos: usize,
    /// Shift register.
    register: u8,
    /// Bits left in the register.
    bits_left: u8,
    /// Bit order.
    order: BitOrder,
}

impl<'a> BitReader<'a> {
    /// Create a reader starting at byte `start` of `data`.
    pub fn new(data: &'a [u8], start: usize, order: BitOrder) -> Self {
        Self {
            data,
            pos: start,
            register: 0,
            bits_left: 0,
            order,
        }
    }

    /// Create an MSB-first reader starting at byte `start`.
    pub fn msb_first(data: &'a [u8], start: usize) -> Self {
        Self::new(data, start, BitOrder::MsbFirst)
    }

    /// Create an LSB-first reader starting at byte `start`.
    pub fn lsb_first(data: &'a [u8], start: usize) -> Self {
        Self::new(data, start, BitOrder::LsbFirst)
    }

    /// Read a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.bits_left == 0 {
            self.register = self.next_byte()?;
            self.bits_left = 8;
        }
        self.bits_left -= 1;
        let bit = match self.order {
            BitOrder::MsbFirst => {
                let b = self.register & 0x80 != 0;
                self.register <<= 1;
                b
            }
            BitOrder::LsbFirst => {
                let b = self.register & 0x01 != 0;
                self.register >>= 1;
                b
            }
        };
        Ok(bit)
    }

    /// Read `count` bits (at most 32), most significant first.
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= 32);
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }

    /// Read a byte-aligned literal byte.
    #[inline]
    pub fn read_aligned_byte(&mut self) -> Result<u8> {
        self.next_byte()
    }

    #[inline]
    fn next_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(EpError::unexpected_end(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Current input position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Whether every input byte was consumed and the unread register bits
    /// are the padding the writer would have produced.
    pub fn is_cleanly_finished(&self) -> bool {
        if self.pos < self.data.len() {
            return false;
        }
        match self.order {
            BitOrder::MsbFirst => self.register == 0,
            BitOrder::LsbFirst => {
                let pad = ((1u16 << self.bits_left) - 1) as u8;
                self.register == pad
            }
        }
    }
}
