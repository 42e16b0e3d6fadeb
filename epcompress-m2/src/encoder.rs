//! M2 compressor.
//!
//! The whole input is searched once. It is then cut into `2^(depth-1)`
//! blocks, and neighbouring blocks are merged while that saves bits (block
//! sizes are measured with the fast table optimizer). Every final block is
//! compressed with the full number of parse/statistics rounds and appended
//! to the stream.

use crate::parse::{Choice, ParseRange, parse, parse_initial, walk};
use crate::tables::{
    EncodeTables, LITERAL_RUN_MAX, LITERAL_RUN_MIN, MAX_CODE_BITS, MIN_MATCH, OFFS1_PREFIX,
    OFFS2_PREFIX, PARSE_UNUSED_LENGTH_SIZE, literal_run_marker,
};
use epcompress_core::bitstream::{BitWriter, Token, stream_bits};
use epcompress_core::checksum::Checksum;
use epcompress_core::config::CompressionParameters;
use epcompress_core::error::{EpError, Result};
use epcompress_core::optimize::{IterationTracker, iteration_hash};
use epcompress_core::progress::{Progress, ProgressTracker};
use epcompress_core::search::{MatchTable, SearchLimits};
use epcompress_core::slot::DEFAULT_UNUSED_SYMBOL_SIZE;
use epcompress_core::split::{BlockSpan, PairMerger, split_evenly, split_fixed};
use epcompress_core::traits::{CompressStatus, Compressor, FormatDescriptor, Profile};
use epcompress_core::window::ADDRESS_SPACE_SIZE;
use log::{debug, trace};

/// Header bits of a block with a load address.
const ADDRESSED_HEADER_BITS: usize = 34;
/// Header bits of a raw block.
const RAW_HEADER_BITS: usize = 18;

/// Input shared by all blocks of one call.
struct Source<'a> {
    input: &'a [u8],
    matches: &'a MatchTable,
    address: Option<u16>,
}

/// Output of one parse/statistics round.
struct Pass {
    tokens: Vec<Token>,
    symbols: usize,
}

/// M2 stream compressor.
#[derive(Debug)]
pub struct M2Compressor {
    params: CompressionParameters,
    tables: EncodeTables,
    writer: BitWriter,
    closed: bool,
    /// Optimization rounds run by the current `compress_block` call.
    rounds: usize,
}

impl M2Compressor {
    /// Create a compressor with default parameters.
    pub fn new() -> Result<Self> {
        Self::with_parameters(CompressionParameters::default())
    }

    /// Create a compressor with the given parameters.
    pub fn with_parameters(params: CompressionParameters) -> Result<Self> {
        Ok(Self {
            params: params.limited(),
            tables: EncodeTables::new()?,
            writer: BitWriter::msb_first(),
            closed: false,
            rounds: 0,
        })
    }

    /// One round: rebuild the offset tables, parse, rebuild the length
    /// table and collect offset statistics for the next round.
    ///
    /// The first round only gathers statistics and returns `None`.
    fn run_pass(&mut self, source: &Source<'_>, span: BlockSpan, first: bool, fast: bool) -> Result<Option<Pass>> {
        if !first {
            self.tables.offs1.update_tables(false)?;
            self.tables.offs2.update_tables(false)?;
            self.tables.offs3.update_tables(fast)?;
        }
        let range = ParseRange {
            matches: source.matches,
            start: span.start,
            len: span.len,
            min_length: self.params.min_length,
            max_offset: self.params.max_offset,
        };
        let choices = if first {
            parse_initial(range)
        } else {
            self.tables.length.set_unused_symbol_size(PARSE_UNUSED_LENGTH_SIZE);
            parse(range, &self.tables)
        };
        self.tables.length.set_unused_symbol_size(DEFAULT_UNUSED_SYMBOL_SIZE);

        for (_, choice) in walk(&choices).filter(|(_, c)| c.is_match()) {
            let prefix = if choice.len > 1 { OFFS2_PREFIX } else { OFFS1_PREFIX };
            let cost = (choice.len * 9).saturating_sub(1 + prefix);
            self.tables.length.add_symbol(choice.len - MIN_MATCH, cost);
        }
        self.tables.length.update_tables(false)?;
        for (_, choice) in walk(&choices).filter(|(_, c)| c.is_match()) {
            let length_bits = self.tables.length.symbol_size(choice.len - MIN_MATCH);
            if length_bits <= MAX_CODE_BITS {
                let cost = (choice.len * 9).saturating_sub(1 + length_bits);
                self.tables
                    .offset_table_mut(choice.len)
                    .add_symbol(choice.distance - 1, cost);
            }
        }
        if first {
            return Ok(None);
        }

        let block = &source.input[span.start..span.end()];
        let mut tokens = Vec::with_capacity(span.len * 2);
        self.tables.write_descriptor(&mut tokens);
        let mut symbols = 0usize;
        for (pos, choice) in walk(&choices) {
            if choice.is_match() && !self.prefer_literals(choice) {
                self.tables.write_match(choice.distance, choice.len, &mut tokens)?;
                symbols += 1;
                continue;
            }
            symbols += write_literals(&block[pos..pos + choice.len], &mut tokens);
        }
        Ok(Some(Pass { tokens, symbols }))
    }

    /// Whether a match should rather be written as literals.
    fn prefer_literals(&self, choice: Choice) -> bool {
        let mut bits = self.tables.match_size(choice.distance, choice.len);
        if bits > MAX_CODE_BITS {
            bits = usize::MAX / 2;
        }
        (choice.len >= LITERAL_RUN_MIN && bits > LITERAL_RUN_MIN + choice.len * 8)
            || bits >= choice.len * 9
    }

    /// Compress one block with `iterations` rounds and return its tokens,
    /// header included. Returns `None` if cancelled.
    fn compress_span(
        &mut self,
        source: &Source<'_>,
        span: BlockSpan,
        is_last: bool,
        fast: bool,
        progress: &mut ProgressTracker<'_>,
    ) -> Result<Option<Vec<Token>>> {
        self.tables.clear();
        let header_bits = if source.address.is_some() {
            ADDRESSED_HEADER_BITS
        } else {
            RAW_HEADER_BITS
        };
        let mut rounds: IterationTracker<Pass> = IterationTracker::new();
        for round in 0..self.params.optimize_iterations {
            if !progress.step() {
                return Ok(None);
            }
            if rounds.is_converged() {
                continue;
            }
            let Some(pass) = self.run_pass(source, span, round == 0, fast)? else {
                continue;
            };
            let size = header_bits + stream_bits(&pass.tokens);
            let hash = iteration_hash(&pass.tokens, size);
            trace!("M2 block {}+{}, round {}: {} bits", span.start, span.len, round, size);
            rounds.submit(size, hash, pass);
        }
        self.rounds += rounds.rounds();

        let mut out = Vec::new();
        if let Some(base) = source.address {
            out.push(Token::bits((base as u32 + span.start as u32) & 0xFFFF, 16));
        }
        match rounds.into_best() {
            Some((size, pass)) if size < header_bits + span.len * 8 => {
                out.push(Token::bits(pass.symbols as u32 - 1, 16));
                out.push(Token::bits(is_last as u32, 1));
                out.push(Token::bits(1, 1));
                out.extend(pass.tokens);
            }
            _ => {
                if !fast {
                    debug!("M2 block {}+{} stored uncompressed", span.start, span.len);
                }
                out.push(Token::bits(span.len as u32 - 1, 16));
                out.push(Token::bits(is_last as u32, 1));
                out.push(Token::bits(0, 1));
                out.extend(source.input[span.start..span.end()].iter().map(|&b| Token::Byte(b)));
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
            Checksum::M2.seal(self.writer.bytes_mut());
            self.closed = true;
        }
    }
}

/// Append `bytes` as literal runs and single literals; returns the number
/// of symbols written.
fn write_literals(bytes: &[u8], tokens: &mut Vec<Token>) -> usize {
    let mut symbols = 0;
    let mut rest = bytes;
    while rest.len() >= LITERAL_RUN_MIN {
        let (run, tail) = rest.split_at(rest.len().min(LITERAL_RUN_MAX));
        tokens.push(literal_run_marker());
        tokens.push(Token::bits((run.len() - LITERAL_RUN_MIN) as u32, 8));
        tokens.extend(run.iter().map(|&b| Token::Byte(b)));
        symbols += 1;
        rest = tail;
    }
    for &b in rest {
        tokens.push(Token::bits(0, 1));
        tokens.push(Token::Byte(b));
        symbols += 1;
    }
    symbols
}

impl Compressor for M2Compressor {
    fn profile(&self) -> Profile {
        Profile::M2
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
        self.rounds = 0;
        let matches = MatchTable::build(input, SearchLimits::for_format(&FormatDescriptor::M2))?;
        let source = Source {
            input,
            matches: &matches,
            address: start_address,
        };

        let mut split_depth = params.split_optimization_depth - 1;
        while input.len() > 1 << (split_depth + 16) {
            split_depth += 1;
        }
        let split_count = (1usize << split_depth).min(input.len());
        let steps = (split_count
            + split_count.saturating_sub(1)
            + split_count.saturating_sub(2)
            + split_count.saturating_sub(3))
            * params.optimize_iterations
            * (split_depth / 2 + 2)
            / (split_depth / 2 + 1);

        progress.message("Compressing data");
        let mut tracker = ProgressTracker::new(progress, steps);
        tracker.set_percent(0);

        let mut blocks = if params.block_size == 0 {
            split_evenly(input.len(), split_count)
        } else {
            split_fixed(input.len(), params.block_size)
        };
        if params.block_size == 0 && blocks.len() > 1 {
            let mut merger = PairMerger::new();
            let status = merger.merge(&mut blocks, |span| {
                let tokens = self.compress_span(&source, span, false, true, &mut tracker)?;
                Ok(tokens.map(|t| stream_bits(&t)))
            })?;
            if status == CompressStatus::Cancelled {
                tracker.message("");
                return Ok(CompressStatus::Cancelled);
            }
            debug!(
                "M2 split: {} blocks after {} size evaluations",
                blocks.len(),
                merger.evaluations()
            );
        }

        tracker.rescale(params.optimize_iterations * blocks.len());
        let mut tokens = Vec::new();
        for span in &blocks {
            let last = is_last && span.end() >= input.len();
            let Some(block) = self.compress_span(&source, *span, last, false, &mut tracker)? else {
                tracker.message("");
                return Ok(CompressStatus::Cancelled);
            };
            debug!(
                "M2 block {}+{}: {} bits{}",
                span.start,
                span.len,
                stream_bits(&block),
                if last { " (last)" } else { "" }
            );
            tokens.extend(block);
        }
        tracker.set_percent(100);
        tracker.message("");
        debug!("M2: {} blocks, {} optimization rounds", blocks.len(), self.rounds);

        self.pack(&tokens, is_last);
        Ok(CompressStatus::Done)
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        if !self.closed {
            return Err(EpError::invalid_input("the last block has not been compressed yet"));
        }
        self.closed = false;
        self.tables.clear();
        Ok(std::mem::take(&mut self.writer).finish())
    }
}
