//! M3 compressor.
//!
//! The input is reversed, searched and parsed once; there are no adaptive
//! tables to iterate on. The token stream is packed with bits entering the
//! register from the top, framed with the size fields, and the finished
//! byte sequence is reversed again so that a decoder can consume it from
//! the end of memory downwards.

use crate::codes::{MAX_INPUT, write_gamma, write_match};
use crate::parse::{ParseLimits, Plan, parse};
use epcompress_core::bitstream::{BitWriter, Token, stream_bits};
use epcompress_core::config::CompressionParameters;
use epcompress_core::error::{EpError, Result};
use epcompress_core::progress::{Progress, ProgressTracker};
use epcompress_core::search::{MatchTable, SearchLimits};
use epcompress_core::traits::{CompressStatus, Compressor, FormatDescriptor, Profile};
use log::{debug, warn};

/// Only load address an M3 stream may carry (a program after its EXOS header).
pub const PROGRAM_ADDRESS: u16 = 0x0100;

/// M3 stream compressor.
#[derive(Debug)]
pub struct M3Compressor {
    params: CompressionParameters,
    output: Option<Vec<u8>>,
}

impl M3Compressor {
    /// Create a compressor with default parameters.
    pub fn new() -> Self {
        Self::with_parameters(CompressionParameters::default())
    }

    /// Create a compressor with the given parameters.
    ///
    /// Only `min_length` and `max_offset` affect M3.
    pub fn with_parameters(params: CompressionParameters) -> Self {
        Self {
            params: params.limited(),
            output: None,
        }
    }
}

impl Default for M3Compressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize the parse of `reversed` into tokens.
fn encode(reversed: &[u8], plan: &Plan) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity(reversed.len());
    let mut after_literal = false;
    for (pos, step) in plan.walk() {
        if step.is_literal() {
            if pos != 0 {
                tokens.push(Token::bits(0, 1));
            }
            write_gamma(step.len, &mut tokens);
            tokens.extend(reversed[pos..pos + step.len].iter().map(|&b| Token::Byte(b)));
            after_literal = true;
        } else {
            if !after_literal {
                tokens.push(Token::bits(1, 1));
            }
            write_match(step.distance, step.len, &mut tokens)?;
            after_literal = false;
        }
    }
    Ok(tokens)
}

/// Frame a body and return the finished stream.
///
/// `extra` is written first and `body_len` last; the whole output is then
/// reversed.
fn frame(extra: usize, body: &[Token], body_len: usize) -> Vec<u8> {
    let mut writer = BitWriter::lsb_first();
    writer.write_aligned_byte((extra >> 8) as u8);
    writer.write_aligned_byte(extra as u8);
    writer.write_tokens(body);
    writer.write_aligned_byte((body_len >> 8) as u8);
    writer.write_aligned_byte(body_len as u8);
    let mut out = writer.finish();
    out.reverse();
    out
}

impl Compressor for M3Compressor {
    fn profile(&self) -> Profile {
        Profile::M3
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
        if self.output.is_some() {
            return Err(EpError::invalid_input("M3 streams hold a single block"));
        }
        if !is_last || start_address.is_some_and(|a| a != PROGRAM_ADDRESS) {
            return Err(EpError::invalid_input(
                "M3 needs one last block without a load address, or at 0x0100",
            ));
        }
        if input.is_empty() {
            return Err(EpError::invalid_input("empty input block"));
        }
        if input.len() > MAX_INPUT {
            return Err(EpError::invalid_input(format!(
                "M3 input is limited to {MAX_INPUT} bytes, got {}",
                input.len()
            )));
        }

        progress.message("Compressing data");
        let mut tracker = ProgressTracker::new(progress, 2);
        if !tracker.step() {
            tracker.message("");
            return Ok(CompressStatus::Cancelled);
        }

        let n = input.len();
        let reversed: Vec<u8> = input.iter().rev().copied().collect();
        let matches = MatchTable::build(&reversed, SearchLimits::for_format(&FormatDescriptor::M3))?;
        let plan = parse(
            &matches,
            ParseLimits {
                min_length: self.params.min_length,
                max_offset: self.params.max_offset,
            },
        );
        if !tracker.step() {
            tracker.message("");
            return Ok(CompressStatus::Cancelled);
        }

        if n > 1 && plan.steps[0].len == n && plan.bits[1] + 1 < (n - 1) * 8 {
            warn!("M3: compression disabled to keep in-place decompression safe");
        }
        let tokens = encode(&reversed, &plan)?;
        let body_bits = stream_bits(&tokens);
        let body_len = body_bits.div_ceil(8);
        let stream = if body_len * 8 >= n * 8 {
            debug!("M3: {n} bytes stored uncompressed");
            let stored: Vec<Token> = reversed.iter().map(|&b| Token::Byte(b)).collect();
            frame(0, &stored, n)
        } else {
            debug!("M3: {n} bytes -> {body_bits} bits (planned {})", plan.total_bits());
            frame(n - body_len, &tokens, body_len)
        };
        tracker.set_percent(100);
        tracker.message("");
        self.output = Some(stream);
        Ok(CompressStatus::Done)
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        self.output
            .take()
            .ok_or_else(|| EpError::invalid_input("the last block has not been compressed yet"))
    }
}
