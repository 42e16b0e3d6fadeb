//! M0 compressor.
//!
//! The input is cut into `2^depth` blocks. Every block is compressed on its
//! own: rounds of parse, symbol emission and Huffman table construction,
//! each round pricing symbols with the code sizes of the previous one. The
//! blocks are then merged left to right while a merged block is not larger
//! than its halves.

use crate::parse::{CostModel, ParseRange, Step, parse, walk};
use crate::tables::{
    AlphabetCode, ClassCode, DELTA_BASE, DELTA_BITS, DISTANCE_BASE, DeltaMatches, LENGTH_SYMBOL_COUNT, MAX_OFFSET,
    MIN_MATCH, RAW_LENGTH_BITS, RAW_SYMBOL_BITS, RECENT_BASE, RECENT_DISTANCES, SHORT_DISTANCE_MAX, SYMBOL_COUNT,
    encode_delta,
};
use epcompress_core::bitstream::{BitWriter, Token, stream_bits};
use epcompress_core::checksum::Checksum;
use epcompress_core::config::CompressionParameters;
use epcompress_core::error::{EpError, Result};
use epcompress_core::huffman::{HuffmanBuilder, MAX_CODE_LENGTH};
use epcompress_core::optimize::{IterationTracker, iteration_hash};
use epcompress_core::progress::{Progress, ProgressTracker};
use epcompress_core::search::{MatchTable, SearchLimits};
use epcompress_core::split::{BlockSpan, MAX_BLOCK_SIZE, SizedBlock, merge_sequential, split_evenly, split_fixed};
use epcompress_core::traits::{CompressStatus, Compressor, FormatDescriptor, Profile};
use epcompress_core::window::ADDRESS_SPACE_SIZE;
use log::{debug, trace};
use std::cell::Cell;

/// Header bits of a block with a load address.
const ADDRESSED_HEADER_BITS: usize = 34;
/// Header bits of a raw block.
const RAW_HEADER_BITS: usize = 18;
/// Rounds per block never exceed this.
const MAX_ITERATIONS: usize = 16;

/// One unit of a block before entropy coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    /// Main alphabet symbol.
    Symbol(u16),
    /// Length alphabet symbol.
    Length(u8),
    /// Bits written as they are.
    Raw(Token),
}

/// Input shared by all blocks of one call.
struct Source<'a> {
    input: &'a [u8],
    matches: &'a MatchTable,
    deltas: &'a DeltaMatches,
    address: Option<u16>,
}

/// M0 stream compressor.
#[derive(Debug)]
pub struct M0Compressor {
    params: CompressionParameters,
    writer: BitWriter,
    closed: bool,
    /// Optimization rounds run by the current `compress_block` call.
    rounds: Cell<usize>,
}

impl M0Compressor {
    /// Create a compressor with default parameters.
    pub fn new() -> Self {
        Self::with_parameters(CompressionParameters::default())
    }

    /// Create a compressor with the given parameters.
    pub fn with_parameters(params: CompressionParameters) -> Self {
        Self {
            params: params.limited(),
            writer: BitWriter::msb_first(),
            closed: false,
            rounds: Cell::new(0),
        }
    }

    fn iterations(&self) -> usize {
        self.params.optimize_iterations.min(MAX_ITERATIONS)
    }

    /// Compress one block and return its tokens, header included.
    /// Returns `None` if cancelled.
    fn compress_span(
        &self,
        source: &Source<'_>,
        span: BlockSpan,
        is_last: bool,
        progress: &mut ProgressTracker<'_>,
    ) -> Result<Option<Vec<Token>>> {
        let header_bits = if source.address.is_some() {
            ADDRESSED_HEADER_BITS
        } else {
            RAW_HEADER_BITS
        };
        let range = ParseRange {
            input: source.input,
            matches: source.matches,
            deltas: source.deltas,
            start: span.start,
            len: span.len,
            min_length: self.params.min_length,
            max_offset: self.params.max_offset,
        };
        let mut costs = CostModel::new();
        let mut rounds: IterationTracker<Vec<Token>> = IterationTracker::new();
        for round in 0..self.iterations() {
            if !progress.step_by(span.len) {
                return Ok(None);
            }
            if rounds.is_converged() {
                continue;
            }
            let steps = parse(&range, &costs);
            let items = emit(&source.input[span.start..span.end()], &steps, &costs);
            let tokens = entropy_code(&items, &mut costs);
            let size = header_bits + stream_bits(&tokens);
            let hash = iteration_hash(&tokens, size);
            trace!("M0 block {}+{}, round {}: {} bits", span.start, span.len, round, size);
            rounds.submit(size, hash, tokens);
        }
        self.rounds.set(self.rounds.get() + rounds.rounds());

        let remaining = (MAX_BLOCK_SIZE - span.len) as u32;
        let mut out = Vec::new();
        match source.address {
            Some(base) => {
                out.push(Token::bits((base as u32 + span.start as u32) & 0xFFFF, 16));
                out.push(Token::bits(remaining, 16));
            }
            None => {
                out.push(Token::bits(remaining >> 8, 8));
                out.push(Token::bits(remaining & 0xFF, 8));
            }
        }
        out.push(Token::bits(is_last as u32, 1));
        match rounds.into_best() {
            Some((size, tokens)) if size < header_bits + span.len * 8 => {
                out.push(Token::bits(1, 1));
                out.extend(tokens);
            }
            _ => {
                debug!("M0 block {}+{} stored uncompressed", span.start, span.len);
                out.push(Token::bits(0, 1));
                out.extend(source.input[span.start..span.end()].iter().map(|&b| Token::bits(b as u32, 8)));
            }
        }
        Ok(Some(out))
    }

    fn pack(&mut self, tokens: &[Token], is_last: bool) {
        if self.writer.is_empty() {
            // Checksum byte.
            self.writer.write_aligned_byte(0);
        }
        self.writer.write_tokens(tokens);
        if is_last {
            self.writer.flush();
            Checksum::M0.seal(self.writer.bytes_mut());
            self.closed = true;
        }
    }
}

impl Default for M0Compressor {
    fn default() -> Self {
        Self::new()
    }
}

fn push_length(len: usize, items: &mut Vec<Item>) {
    let class = ClassCode::of((len - MIN_MATCH) as u32);
    items.push(Item::Length(class.code));
    items.extend(class.extra_token().map(Item::Raw));
}

/// Turn the parse into symbols. Matches at a cached distance use the
/// cache symbol when it is cheaper than the explicit distance.
fn emit(block: &[u8], steps: &[Step], costs: &CostModel) -> Vec<Item> {
    let mut items = Vec::with_capacity(block.len());
    let mut recent = [0usize; RECENT_DISTANCES];
    for (pos, step) in walk(steps) {
        if step.len < MIN_MATCH {
            items.push(Item::Symbol(block[pos] as u16));
            continue;
        }
        if let Some(delta) = step.delta {
            items.push(Item::Symbol(DELTA_BASE + step.distance as u16 - 1));
            items.push(Item::Raw(Token::bits(encode_delta(delta), DELTA_BITS)));
            push_length(step.len, &mut items);
            continue;
        }
        if step.distance > SHORT_DISTANCE_MAX {
            if let Some(slot) = recent.iter().position(|&d| d == step.distance) {
                if costs.recent_size(slot) < costs.distance_size(step.distance) {
                    items.push(Item::Symbol(RECENT_BASE + slot as u16));
                    push_length(step.len, &mut items);
                    continue;
                }
            }
            recent.rotate_right(1);
            recent[0] = step.distance;
        }
        let class = ClassCode::of((step.distance - 1) as u32);
        items.push(Item::Symbol(DISTANCE_BASE + class.code as u16));
        items.extend(class.extra_token().map(Item::Raw));
        push_length(step.len, &mut items);
    }
    items
}

/// Build both codes for `items`, write the table descriptions and the coded
/// symbols, and feed the code sizes back into `costs`.
fn entropy_code(items: &[Item], costs: &mut CostModel) -> Vec<Token> {
    let mut symbols = HuffmanBuilder::new(SYMBOL_COUNT, MAX_CODE_LENGTH as u8);
    let mut lengths = HuffmanBuilder::new(LENGTH_SYMBOL_COUNT, MAX_CODE_LENGTH as u8);
    for item in items {
        match *item {
            Item::Symbol(s) => symbols.add(s as usize),
            Item::Length(s) => lengths.add(s as usize),
            Item::Raw(_) => {}
        }
    }
    let (symbol_count, length_count) = (symbols.total(), lengths.total());
    let symbol_code = choose_code(&symbols, SYMBOL_COUNT, RAW_SYMBOL_BITS);
    let length_code = choose_code(&lengths, LENGTH_SYMBOL_COUNT, RAW_LENGTH_BITS);

    let mut tokens = Vec::with_capacity(items.len() + 128);
    tokens.extend_from_slice(symbol_code.description());
    tokens.extend_from_slice(length_code.description());
    tokens.extend(items.iter().map(|item| match *item {
        Item::Symbol(s) => symbol_code.token(s as usize),
        Item::Length(s) => length_code.token(s as usize),
        Item::Raw(token) => token,
    }));
    costs.update(&symbol_code, symbol_count, &length_code, length_count);
    tokens
}

/// Huffman code for the statistics, unless fixed-width symbols are not
/// larger.
fn choose_code(builder: &HuffmanBuilder, size: usize, raw_bits: u8) -> AlphabetCode {
    let huffman = AlphabetCode::huffman(builder, size);
    let raw = AlphabetCode::raw(size, raw_bits);
    if huffman.encoded_size(builder) >= raw.encoded_size(builder) {
        raw
    } else {
        huffman
    }
}

impl Compressor for M0Compressor {
    fn profile(&self) -> Profile {
        Profile::M0
    }

    fn parameters(&self) -> CompressionParameters {
        self.params
    }

    fn set_parameters(&mut self, params: CompressionParameters) {
        self.params = params.limited();
    }

    fn compress_block(
        &mut self,
        input: &[u8],
        start_address: Option<u16>,
        is_last: bool,
        progress: &mut dyn Progress,
    ) -> Result<CompressStatus> {
        if self.closed {
            return Err(EpError::invalid_input("the stream was already closed by its last block"));
        }
        if input.is_empty() {
            return Err(EpError::invalid_input("empty input block"));
        }
        if let Some(address) = start_address {
            if address as usize + input.len() > ADDRESS_SPACE_SIZE {
                return Err(EpError::invalid_input(format!(
                    "{} bytes at 0x{:04X} do not fit the address space",
                    input.len(),
                    address
                )));
            }
        }
        let params = self.params;
        let iterations = self.iterations();
        self.rounds.set(0);
        let limits = SearchLimits {
            min_length: params.min_length.max(MIN_MATCH),
            max_distance: params.max_offset.min(MAX_OFFSET),
            ..SearchLimits::for_format(&FormatDescriptor::M0)
        };
        let matches = MatchTable::build(input, limits)?;
        let deltas = DeltaMatches::build(input);
        let source = Source {
            input,
            matches: &matches,
            deltas: &deltas,
            address: start_address,
        };

        let mut split_depth = params.split_optimization_depth;
        let mut split_count = 1usize << split_depth;
        while input.len().div_ceil(split_count) > MAX_BLOCK_SIZE {
            split_depth += 1;
            split_count <<= 1;
        }
        while split_count > input.len() {
            split_depth -= 1;
            split_count >>= 1;
        }
        let mut steps = iterations * input.len();
        if params.block_size == 0 {
            // Rough number of merge sweeps.
            let mut sweeps = 0;
            let mut size = input.len().div_ceil(split_count);
            loop {
                sweeps += 1;
                size <<= 1;
                if sweeps >= split_depth || size > MAX_BLOCK_SIZE {
                    break;
                }
            }
            steps *= sweeps + (sweeps > 1) as usize;
        }

        progress.message("Compressing data");
        let mut tracker = ProgressTracker::new(progress, steps);
        tracker.set_percent(0);

        let spans = if params.block_size == 0 {
            split_evenly(input.len(), split_count)
        } else {
            split_fixed(input.len(), params.block_size)
        };
        let mut blocks = Vec::with_capacity(spans.len());
        for span in spans {
            let last = is_last && span.end() >= input.len();
            let Some(tokens) = self.compress_span(&source, span, last, &mut tracker)? else {
                tracker.message("");
                return Ok(CompressStatus::Cancelled);
            };
            blocks.push(SizedBlock {
                span,
                is_last: last,
                bits: stream_bits(&tokens),
                data: tokens,
            });
        }

        if params.block_size == 0 && blocks.len() > 1 {
            let status = merge_sequential(&mut blocks, |span, last| {
                tracker.reserve(iterations * span.len);
                let tokens = self.compress_span(&source, span, last, &mut tracker)?;
                Ok(tokens.map(|t| (stream_bits(&t), t)))
            })?;
            if status == CompressStatus::Cancelled {
                tracker.message("");
                return Ok(CompressStatus::Cancelled);
            }
        }
        tracker.set_percent(100);
        tracker.message("");
        debug!("M0: {} blocks, {} optimization rounds", blocks.len(), self.rounds.get());

        let mut tokens = Vec::new();
        for block in blocks {
            debug!(
                "M0 block {}+{}: {} bits{}",
                block.span.start,
                block.span.len,
                block.bits,
                if block.is_last { " (last)" } else { "" }
            );
            tokens.extend(block.data);
        }
        self.pack(&tokens, is_last);
        Ok(CompressStatus::Done)
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        if !self.closed {
            return Err(EpError::invalid_input("the last block has not been compressed yet"));
        }
        self.closed = false;
        Ok(std::mem::take(&mut self.writer).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcompress_core::progress::NoProgress;

    #[test]
    fn test_emit_uses_recent_distances() {
        let block = vec![0u8; 64];
        let steps_at = |len: usize, distance: usize| Step {
            len,
            distance,
            delta: None,
        };
        // Literal, match at distance 20, literal, match at distance 20 again.
        let mut steps = vec![Step::default(); 64];
        steps[0] = steps_at(1, 0);
        steps[1] = steps_at(30, 20);
        steps[31] = steps_at(1, 0);
        steps[32] = steps_at(32, 20);
        let mut costs = CostModel::new();
        costs.symbol_bits[RECENT_BASE as usize] = 2;
        let items = emit(&block, &steps, &costs);
        assert!(items.contains(&Item::Symbol(RECENT_BASE)));
        assert_eq!(
            items.iter().filter(|i| matches!(i, Item::Symbol(s) if *s >= DISTANCE_BASE && *s < DELTA_BASE)).count(),
            1
        );
    }

    #[test]
    fn test_short_distances_not_cached() {
        let block = vec![7u8; 20];
        let mut steps = vec![Step::default(); 20];
        steps[0] = Step { len: 1, distance: 0, delta: None };
        steps[1] = Step { len: 9, distance: 1, delta: None };
        steps[10] = Step { len: 10, distance: 1, delta: None };
        let items = emit(&block, &steps, &CostModel::new());
        assert!(!items.iter().any(|i| matches!(i, Item::Symbol(s) if *s >= RECENT_BASE)));
        assert_eq!(items.iter().filter(|i| **i == Item::Symbol(DISTANCE_BASE)).count(), 2);
    }

    #[test]
    fn test_entropy_code_falls_back_to_raw() {
        // A handful of scattered symbols: the table costs more than it saves.
        let items: Vec<Item> = [0u16, 100, 200, 300].into_iter().map(Item::Symbol).collect();
        let mut costs = CostModel::new();
        let tokens = entropy_code(&items, &mut costs);
        assert_eq!(tokens[0], Token::bits(0, 1));
        assert_eq!(tokens[1], Token::bits(0, 1));
        assert_eq!(stream_bits(&tokens), 2 + 4 * 9);
        assert_eq!(costs.symbol_bits[0], 9);
    }

    #[test]
    fn test_entropy_code_huffman() {
        let items: Vec<Item> = std::iter::repeat_n(Item::Symbol(0x41), 500)
            .chain(std::iter::repeat_n(Item::Symbol(0x42), 100))
            .collect();
        let mut costs = CostModel::new();
        let tokens = entropy_code(&items, &mut costs);
        assert_eq!(tokens[0], Token::bits(1, 1));
        assert!(stream_bits(&tokens) < 700);
        assert_eq!(costs.symbol_bits[0x41], 1);
        assert!(costs.symbol_bits[0x43] > 1);
    }

    #[test]
    fn test_closed_stream_rejects_blocks() {
        let mut compressor = M0Compressor::new();
        assert!(compressor.finish().is_err());
        compressor
            .compress_block(b"abcabcabc", None, true, &mut NoProgress)
            .unwrap();
        assert!(compressor.compress_block(b"x", None, true, &mut NoProgress).is_err());
        let stream = compressor.finish().unwrap();
        assert!(Checksum::M0.verify(&stream).is_ok());
    }

    fn single_block(input: &[u8], optimize_iterations: usize) -> M0Compressor {
        let mut compressor = M0Compressor::with_parameters(CompressionParameters {
            optimize_iterations,
            block_size: 65_536,
            ..Default::default()
        });
        compressor.compress_block(input, None, true, &mut NoProgress).unwrap();
        compressor
    }

    #[test]
    fn test_identical_bytes_converge_early() {
        let compressor = single_block(&[0x55; 4096], 16);
        assert!(compressor.rounds.get() >= 2);
        assert!(compressor.rounds.get() < MAX_ITERATIONS);
    }

    #[test]
    fn test_rounds_within_cap() {
        let mut seed = 99u32;
        let input: Vec<u8> = (0..4096)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (seed >> 16) as u8
            })
            .collect();
        let compressor = single_block(&input, 40);
        assert!(compressor.rounds.get() >= 1);
        assert!(compressor.rounds.get() <= MAX_ITERATIONS);
        assert_eq!(single_block(&input, 2).rounds.get(), 2);
    }

    #[test]
    fn test_iterations_capped() {
        let compressor = M0Compressor::with_parameters(CompressionParameters {
            optimize_iterations: 50,
            ..Default::default()
        });
        assert_eq!(compressor.iterations(), MAX_ITERATIONS);
        assert_eq!(compressor.parameters().optimize_iterations, 50);
    }
}
