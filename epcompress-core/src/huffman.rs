//! Length-limited canonical Huffman coding.
//!
//! Code lengths are computed with the package-merge algorithm, so they are
//! optimal for the given limit. Codes are canonical: shorter codes come
//! first, and codes of equal length are assigned in increasing symbol order.
//! A decoder therefore only needs the number of codes of every length and
//! the symbols sorted by (length, value).

use crate::bitstream::BitReader;
use crate::error::{EpError, Result};

/// Longest code length supported by the decoder.
pub const MAX_CODE_LENGTH: usize = 16;

/// Builder for creating Huffman code lengths from frequencies.
#[derive(Debug, Clone)]
pub struct HuffmanBuilder {
    frequencies: Vec<u32>,
    max_length: u8,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf(usize),
    Package(usize, usize),
}

impl HuffmanBuilder {
    /// Create a new Huffman builder.
    pub fn new(alphabet_size: usize, max_length: u8) -> Self {
        Self {
            frequencies: vec![0; alphabet_size],
            max_length: max_length.clamp(1, MAX_CODE_LENGTH as u8),
        }
    }

    /// Add a symbol occurrence.
    pub fn add(&mut self, symbol: usize) {
        if let Some(f) = self.frequencies.get_mut(symbol) {
            *f += 1;
        }
    }

    /// Add multiple occurrences of a symbol.
    pub fn add_count(&mut self, symbol: usize, count: u32) {
        if let Some(f) = self.frequencies.get_mut(symbol) {
            *f += count;
        }
    }

    /// Occurrences recorded for `symbol`.
    pub fn frequency(&self, symbol: usize) -> u32 {
        self.frequencies.get(symbol).copied().unwrap_or(0)
    }

    /// Total number of occurrences.
    pub fn total(&self) -> usize {
        self.frequencies.iter().map(|&f| f as usize).sum()
    }

    /// Forget all frequencies.
    pub fn clear(&mut self) {
        self.frequencies.iter_mut().for_each(|f| *f = 0);
    }

    /// Build code lengths from frequencies.
    ///
    /// Returns an array where `result[i]` is the code length for symbol `i`;
    /// unused symbols get length 0.
    pub fn build_lengths(&self) -> Vec<u8> {
        let mut lengths = vec![0u8; self.frequencies.len()];
        let mut symbols: Vec<(u32, usize)> = self
            .frequencies
            .iter()
            .enumerate()
            .filter(|&(_, f)| *f > 0)
            .map(|(i, f)| (*f, i))
            .collect();

        match symbols.len() {
            0 => return lengths,
            1 => {
                lengths[symbols[0].1] = 1;
                return lengths;
            }
            _ => {}
        }
        symbols.sort_unstable();

        for (i, len) in self.package_merge(&symbols).into_iter().enumerate() {
            lengths[symbols[i].1] = len;
        }
        lengths
    }

    /// Package-merge over symbols sorted by ascending frequency.
    fn package_merge(&self, symbols: &[(u32, usize)]) -> Vec<u8> {
        let n = symbols.len();
        let mut nodes: Vec<(u64, Node)> = symbols
            .iter()
            .enumerate()
            .map(|(i, &(f, _))| (f as u64, Node::Leaf(i)))
            .collect();
        let leaves: Vec<usize> = (0..n).collect();

        let mut current = leaves.clone();
        for _ in 1..self.max_length {
            let mut packages = Vec::with_capacity(current.len() / 2);
            for pair in current.chunks_exact(2) {
                let weight = nodes[pair[0]].0 + nodes[pair[1]].0;
                nodes.push((weight, Node::Package(pair[0], pair[1])));
                packages.push(nodes.len() - 1);
            }
            // Merge, leaves first on equal weight.
            let mut merged = Vec::with_capacity(n + packages.len());
            let (mut a, mut b) = (0, 0);
            while a < leaves.len() || b < packages.len() {
                let take_leaf = b >= packages.len()
                    || (a < leaves.len() && nodes[leaves[a]].0 <= nodes[packages[b]].0);
                if take_leaf {
                    merged.push(leaves[a]);
                    a += 1;
                } else {
                    merged.push(packages[b]);
                    b += 1;
                }
            }
            current = merged;
        }

        let mut lengths = vec![0u8; n];
        let mut stack = Vec::new();
        for &item in current.iter().take(2 * n - 2) {
            stack.push(item);
            while let Some(node) = stack.pop() {
                match nodes[node].1 {
                    Node::Leaf(i) => lengths[i] += 1,
                    Node::Package(x, y) => {
                        stack.push(x);
                        stack.push(y);
                    }
                }
            }
        }
        lengths
    }
}

/// Canonical codes for the given code lengths (0 = unused).
pub fn canonical_codes(lengths: &[u8]) -> Vec<u32> {
    let mut bl_count = [0u32; MAX_CODE_LENGTH + 2];
    for &len in lengths {
        if len > 0 {
            bl_count[len as usize] += 1;
        }
    }
    let mut next_code = [0u32; MAX_CODE_LENGTH + 2];
    let mut code = 0u32;
    for bits in 1..=MAX_CODE_LENGTH + 1 {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }
    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return 0;
            }
            let c = next_code[len as usize];
            next_code[len as usize] += 1;
            c
        })
        .collect()
}

/// Bits needed for a symbol seen once among `total` occurrences, used as
/// the size estimate of symbols without a code.
pub fn estimate_symbol_length(total: usize) -> usize {
    let mut count = 1usize;
    let mut bits = 0;
    loop {
        count <<= 1;
        bits += 1;
        if count >= total {
            return bits;
        }
    }
}

/// Canonical Huffman decoder reading MSB-first codes.
#[derive(Debug, Clone, Default)]
pub struct HuffmanDecoder {
    /// Number of codes of each length; index 0 is length 1.
    counts: [u16; MAX_CODE_LENGTH],
    /// Symbols sorted by (code length, symbol).
    symbols: Vec<u16>,
}

impl HuffmanDecoder {
    /// Build a decoder from per-length symbol lists.
    ///
    /// `by_length[l]` holds the symbols with code length `l + 1`.
    pub fn from_symbol_lists(by_length: &[Vec<u16>]) -> Result<Self> {
        if by_length.len() > MAX_CODE_LENGTH {
            return Err(EpError::invalid_table("Huffman code longer than 16 bits"));
        }
        let mut decoder = Self::default();
        let mut space = 1u64 << MAX_CODE_LENGTH;
        for (l, list) in by_length.iter().enumerate() {
            let cost = (list.len() as u64) << (MAX_CODE_LENGTH - 1 - l);
            if cost > space {
                return Err(EpError::invalid_table("over-subscribed Huffman code"));
            }
            space -= cost;
            decoder.counts[l] = list.len() as u16;
            decoder.symbols.extend_from_slice(list);
        }
        Ok(decoder)
    }

    /// Build a decoder from code lengths indexed by symbol.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut by_length = vec![Vec::new(); MAX_CODE_LENGTH];
        for (symbol, &len) in lengths.iter().enumerate() {
            match len as usize {
                0 => {}
                l if l <= MAX_CODE_LENGTH => by_length[l - 1].push(symbol as u16),
                _ => return Err(EpError::invalid_table("Huffman code longer than 16 bits")),
            }
        }
        Self::from_symbol_lists(&by_length)
    }

    /// Decode one symbol.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        let mut code: i32 = 0;
        let mut offset = 0usize;
        for &count in &self.counts {
            code = ((code << 1) | reader.read_bit()? as i32) - count as i32;
            if code < 0 {
                let index = (offset as i32 + count as i32 + code) as usize;
                return Ok(self.symbols[index]);
            }
            offset += count as usize;
        }
        Err(EpError::corrupted(reader.position(), "invalid Huffman code"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;

    fn kraft_ok(lengths: &[u8]) -> bool {
        let sum: u64 = lengths
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| 1u64 << (MAX_CODE_LENGTH - l as usize))
            .sum();
        sum <= 1 << MAX_CODE_LENGTH
    }

    #[test]
    fn test_huffman_builder() {
        let mut builder = HuffmanBuilder::new(4, 15);
        builder.add_count(0, 100);
        builder.add_count(1, 50);
        builder.add_count(2, 25);
        builder.add_count(3, 25);
        assert_eq!(builder.build_lengths(), vec![1, 2, 3, 3]);
    }

    #[test]
    fn test_single_and_empty() {
        let builder = HuffmanBuilder::new(5, 16);
        assert_eq!(builder.build_lengths(), vec![0; 5]);
        let mut builder = HuffmanBuilder::new(5, 16);
        builder.add(3);
        assert_eq!(builder.build_lengths(), vec![0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_length_limit() {
        // Fibonacci frequencies produce a degenerate tree without a limit.
        let mut builder = HuffmanBuilder::new(30, 8);
        let (mut a, mut b) = (1u32, 1u32);
        for i in 0..30 {
            builder.add_count(i, a);
            (a, b) = (b, a + b);
        }
        let lengths = builder.build_lengths();
        assert!(lengths.iter().all(|&l| (1..=8).contains(&l)));
        assert!(kraft_ok(&lengths));
    }

    #[test]
    fn test_canonical_codes() {
        let codes = canonical_codes(&[2, 1, 3, 3, 0]);
        assert_eq!(codes, vec![0b10, 0b0, 0b110, 0b111, 0]);
    }

    #[test]
    fn test_encode_decode() {
        let mut builder = HuffmanBuilder::new(40, 16);
        for s in 0..40 {
            builder.add_count(s, (s as u32 % 7) * 3 + (s as u32 == 5) as u32 * 200);
        }
        let lengths = builder.build_lengths();
        let codes = canonical_codes(&lengths);
        let message: Vec<usize> = (0..40).filter(|&s| lengths[s] > 0).chain([5, 5, 13]).collect();

        let mut writer = BitWriter::msb_first();
        for &s in &message {
            writer.write_bits(codes[s], lengths[s]);
        }
        let data = writer.finish();

        let decoder = HuffmanDecoder::from_lengths(&lengths).unwrap();
        let mut reader = BitReader::msb_first(&data, 0);
        for &s in &message {
            assert_eq!(decoder.decode(&mut reader).unwrap() as usize, s);
        }
    }

    #[test]
    fn test_oversubscribed_rejected() {
        assert!(HuffmanDecoder::from_lengths(&[1, 1, 1]).is_err());
    }

    #[test]
    fn test_estimate_symbol_length() {
        assert_eq!(estimate_symbol_length(1), 1);
        assert_eq!(estimate_symbol_length(2), 1);
        assert_eq!(estimate_symbol_length(3), 2);
        assert_eq!(estimate_symbol_length(1025), 11);
    }
}
