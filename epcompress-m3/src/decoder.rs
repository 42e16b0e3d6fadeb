//! M3 decompressor.

use crate::codes::{MAX_INPUT, read_gamma, read_match};
use crate::encoder::PROGRAM_ADDRESS;
use epcompress_core::bitstream::BitReader;
use epcompress_core::error::{EpError, Result};
use epcompress_core::traits::{AddressedBlock, Decompressor, Profile};
use log::trace;

/// M3 stream decompressor.
#[derive(Debug, Clone, Default)]
pub struct M3Decompressor;

impl M3Decompressor {
    /// Create a decompressor.
    pub fn new() -> Self {
        Self
    }
}

/// Split a stream into its size fields and the body in writing order.
fn open(input: &[u8]) -> Result<(Vec<u8>, usize)> {
    if input.len() < 4 {
        return Err(EpError::unexpected_end(input.len()));
    }
    let end = input.len() - 2;
    let body_len = u16::from_le_bytes([input[0], input[1]]) as usize;
    let extra = u16::from_le_bytes([input[end], input[end + 1]]) as usize;
    if body_len + 4 != input.len() {
        return Err(EpError::corrupted(
            0,
            format!("compressed size {body_len} does not match a {} byte stream", input.len()),
        ));
    }
    let size = body_len + extra;
    if size == 0 || size > MAX_INPUT {
        return Err(EpError::corrupted(end, format!("invalid uncompressed size {size}")));
    }
    if extra == 0 {
        return Ok((input[2..end].to_vec(), size));
    }
    Ok((input[2..end].iter().rev().copied().collect(), size))
}

/// Decode a body into the reversed output.
fn decode_body(body: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut reader = BitReader::lsb_first(body, 0);
    let mut out = Vec::with_capacity(size);
    let mut after_literal = false;
    while out.len() < size {
        let is_match = if out.is_empty() {
            false
        } else {
            after_literal || reader.read_bit()?
        };
        if is_match {
            let (distance, len) = read_match(&mut reader)?;
            if distance > out.len() {
                return Err(EpError::invalid_distance(distance, out.len()));
            }
            if out.len() + len > size {
                return Err(EpError::corrupted(reader.position(), "match runs past the end of the data"));
            }
            let start = out.len() - distance;
            for k in 0..len {
                out.push(out[start + k]);
            }
            after_literal = false;
        } else {
            let len = read_gamma(&mut reader)?;
            if out.len() + len > size {
                return Err(EpError::corrupted(reader.position(), "literal run past the end of the data"));
            }
            for _ in 0..len {
                out.push(reader.read_aligned_byte()?);
            }
            after_literal = true;
        }
    }
    if !reader.is_cleanly_finished() {
        return Err(EpError::corrupted(reader.position(), "trailing data after the last token"));
    }
    Ok(out)
}

impl Decompressor for M3Decompressor {
    fn profile(&self) -> Profile {
        Profile::M3
    }

    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let (body, size) = open(input)?;
        if body.len() == size {
            trace!("M3 stored block of {size} bytes");
            return Ok(body);
        }
        trace!("M3 block: {} -> {} bytes", body.len(), size);
        let mut out = decode_body(&body, size)?;
        out.reverse();
        Ok(out)
    }

    fn decompress_blocks(&mut self, input: &[u8]) -> Result<Vec<AddressedBlock>> {
        let data = self.decompress(input)?;
        Ok(vec![AddressedBlock {
            start: PROGRAM_ADDRESS,
            data,
        }])
    }
}
