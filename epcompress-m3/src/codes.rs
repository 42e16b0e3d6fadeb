//! Gamma and match codes of the M3 stream.
//!
//! A gamma code of `n >= 1` is `k` one-bits, a zero, then the `k` bits of
//! `n` below its leading one, where `k = floor(log2 n)`. Literal runs carry
//! their length as a gamma code. Matches carry `len - 1` as a gamma code
//! followed by the distance: two-byte matches store `d + 1` behind a 3-bit
//! width field, longer ones store `d` behind a 4-bit width field.

use epcompress_core::bitstream::{BitReader, Token};
use epcompress_core::error::{EpError, Result};

/// Shortest match.
pub const MIN_MATCH: usize = 2;
/// Matches longer than this are only taken whole.
pub const MAX_SEARCH_LENGTH: usize = 512;
/// Longest match or literal run.
pub const MAX_LENGTH: usize = 65_535;
/// Largest match distance.
pub const MAX_OFFSET: usize = 65_535;
/// Largest distance of a two-byte match.
pub const MAX_SHORT_OFFSET: usize = 510;
/// Largest input a stream can hold.
pub const MAX_INPUT: usize = 65_535;

/// `floor(log2 n)` for `n >= 1`.
#[inline]
pub fn floor_log2(n: usize) -> u8 {
    debug_assert!(n > 0);
    (usize::BITS - 1 - n.leading_zeros()) as u8
}

/// Size of the gamma code of `n`.
#[inline]
pub fn gamma_size(n: usize) -> usize {
    floor_log2(n) as usize * 2 + 1
}

/// Append the gamma code of `n` (1..=65535).
pub fn write_gamma(n: usize, tokens: &mut Vec<Token>) {
    let k = floor_log2(n);
    tokens.push(Token::bits((1u32 << (k + 1)) - 2, k + 1));
    if k > 0 {
        tokens.push(Token::bits(n as u32, k));
    }
}

/// Read a gamma code.
pub fn read_gamma(reader: &mut BitReader<'_>) -> Result<usize> {
    let mut k = 0u8;
    while reader.read_bit()? {
        k += 1;
        if k > 15 {
            return Err(EpError::corrupted(reader.position(), "gamma code too long"));
        }
    }
    Ok((1usize << k) | reader.read_bits(k)? as usize)
}

/// Size of a literal run of `len` bytes, bytes included.
#[inline]
pub fn literal_run_size(len: usize) -> usize {
    gamma_size(len) + len * 8
}

/// Size of a match code, without the flag bit in front of it.
#[inline]
pub fn match_size(distance: usize, len: usize) -> usize {
    let offset = if len == 2 {
        3 + floor_log2(distance + 1) as usize
    } else {
        4 + floor_log2(distance) as usize
    };
    gamma_size(len - 1) + offset
}

/// Append a match code.
pub fn write_match(distance: usize, len: usize, tokens: &mut Vec<Token>) -> Result<()> {
    if !(MIN_MATCH..=MAX_LENGTH).contains(&len) || !(1..=MAX_OFFSET).contains(&distance) {
        return Err(EpError::internal(format!("match {len}@{distance} cannot be encoded")));
    }
    write_gamma(len - 1, tokens);
    if len == 2 {
        if distance > MAX_SHORT_OFFSET {
            return Err(EpError::internal("two-byte match offset overflow"));
        }
        let value = distance + 1;
        let width = floor_log2(value);
        tokens.push(Token::bits(width as u32 - 1, 3));
        tokens.push(Token::bits(value as u32, width));
    } else {
        let width = floor_log2(distance);
        tokens.push(Token::bits(width as u32, 4));
        if width > 0 {
            tokens.push(Token::bits(distance as u32, width));
        }
    }
    Ok(())
}

/// Read a match code; returns `(distance, len)`.
pub fn read_match(reader: &mut BitReader<'_>) -> Result<(usize, usize)> {
    let len = read_gamma(reader)? + 1;
    if len > MAX_LENGTH {
        return Err(EpError::corrupted(reader.position(), "match length out of range"));
    }
    let distance = if len == 2 {
        let width = reader.read_bits(3)? as u8 + 1;
        ((1usize << width) | reader.read_bits(width)? as usize) - 1
    } else {
        let width = reader.read_bits(4)? as u8;
        (1usize << width) | reader.read_bits(width)? as usize
    };
    Ok((distance, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcompress_core::bitstream::{BitWriter, stream_bits};

    fn pack(tokens: &[Token]) -> Vec<u8> {
        let mut writer = BitWriter::lsb_first();
        writer.write_tokens(tokens);
        writer.finish()
    }

    #[test]
    fn test_gamma_codes() {
        let mut tokens = Vec::new();
        write_gamma(1, &mut tokens);
        assert_eq!(tokens, vec![Token::bits(0, 1)]);
        tokens.clear();
        write_gamma(6, &mut tokens);
        // 6 = 110b: two ones, a zero, then "10".
        assert_eq!(tokens, vec![Token::bits(0b110, 3), Token::bits(0b10, 2)]);
        assert_eq!(stream_bits(&tokens), gamma_size(6));

        let values = [1usize, 2, 3, 7, 8, 255, 256, 65_535];
        let mut tokens = Vec::new();
        for &v in &values {
            write_gamma(v, &mut tokens);
        }
        let data = pack(&tokens);
        let mut reader = BitReader::lsb_first(&data, 0);
        for &v in &values {
            assert_eq!(read_gamma(&mut reader).unwrap(), v);
        }
    }

    #[test]
    fn test_match_codes() {
        let cases = [(1usize, 2usize), (510, 2), (1, 3), (2, 3), (65_535, 9), (300, 512), (1, 65_535)];
        let mut tokens = Vec::new();
        for &(d, len) in &cases {
            let before = stream_bits(&tokens);
            write_match(d, len, &mut tokens).unwrap();
            assert_eq!(stream_bits(&tokens) - before, match_size(d, len), "{len}@{d}");
        }
        let data = pack(&tokens);
        let mut reader = BitReader::lsb_first(&data, 0);
        for &case in &cases {
            assert_eq!(read_match(&mut reader).unwrap(), case);
        }
    }

    #[test]
    fn test_unencodable_matches() {
        let mut tokens = Vec::new();
        assert!(write_match(511, 2, &mut tokens).is_err());
        assert!(write_match(0, 3, &mut tokens).is_err());
        assert!(write_match(65_536, 3, &mut tokens).is_err());
        assert!(write_match(5, 1, &mut tokens).is_err());
    }

    #[test]
    fn test_overlong_gamma_rejected() {
        let data = [0xFFu8, 0xFF, 0xFF];
        let mut reader = BitReader::lsb_first(&data, 0);
        assert!(read_gamma(&mut reader).unwrap_err().is_data_error());
    }

    #[test]
    fn test_literal_run_size() {
        assert_eq!(literal_run_size(1), 9);
        assert_eq!(literal_run_size(2), 19);
        assert_eq!(literal_run_size(4), 37);
    }
}
