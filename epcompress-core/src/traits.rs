//! Core traits and shared types for compressors and decompressors.

use crate::checksum::Checksum;
use crate::config::CompressionParameters;
use crate::error::{EpError, Result};
use crate::progress::{NoProgress, Progress};
use std::fmt;

/// Stream format ("compression type") identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Canonical Huffman codes, delta matches and a recent-offset cache.
    M0,
    /// Slot-coded lengths and offsets with byte-aligned literals.
    M2,
    /// Gamma codes, single block, decoded backward in place.
    M3,
}

impl Profile {
    /// All supported profiles, in auto-detection order.
    pub const DETECTION_ORDER: [Profile; 3] = [Profile::M2, Profile::M0, Profile::M3];

    /// Numeric compression type id.
    pub fn id(self) -> i32 {
        match self {
            Self::M0 => 0,
            Self::M2 => 2,
            Self::M3 => 3,
        }
    }

    /// Look up a profile by numeric id.
    pub fn from_id(id: i32) -> Result<Self> {
        match id {
            0 => Ok(Self::M0),
            2 => Ok(Self::M2),
            3 => Ok(Self::M3),
            _ => Err(EpError::invalid_profile(id)),
        }
    }

    /// Format descriptor of this profile.
    pub fn format(self) -> &'static FormatDescriptor {
        match self {
            Self::M0 => &FormatDescriptor::M0,
            Self::M2 => &FormatDescriptor::M2,
            Self::M3 => &FormatDescriptor::M3,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.id())
    }
}

/// Fixed limits of a stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Shortest encodable match.
    pub min_match: usize,
    /// Longest match the suffix search reports directly.
    pub max_search_length: usize,
    /// Longest encodable match (long runs are extended up to this).
    pub max_match: usize,
    /// Largest encodable match offset.
    pub max_offset: usize,
    /// Largest input a single call accepts, if limited.
    pub max_input: Option<usize>,
    /// Whether blocks may carry a load address.
    pub addressed_blocks: bool,
    /// Stream checksum, if the format has one.
    pub checksum: Option<Checksum>,
}

impl FormatDescriptor {
    /// M0 format limits.
    pub const M0: Self = Self {
        min_match: 2,
        max_search_length: 256,
        max_match: 256,
        max_offset: 65_536,
        max_input: None,
        addressed_blocks: true,
        checksum: Some(Checksum::M0),
    };

    /// M2 format limits.
    pub const M2: Self = Self {
        min_match: 1,
        max_search_length: 512,
        max_match: 65_535,
        max_offset: 65_535,
        max_input: None,
        addressed_blocks: true,
        checksum: Some(Checksum::M2),
    };

    /// M3 format limits.
    pub const M3: Self = Self {
        min_match: 1,
        max_search_length: 512,
        max_match: 65_535,
        max_offset: 65_535,
        max_input: Some(65_535),
        addressed_blocks: false,
        checksum: None,
    };
}

/// Outcome of a compression call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressStatus {
    /// The block was compressed and appended to the stream.
    Done,
    /// The progress callback asked to stop; nothing was appended.
    Cancelled,
}

/// A decompressed block together with its load address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressedBlock {
    /// Load address of the first byte.
    pub start: u16,
    /// Block contents.
    pub data: Vec<u8>,
}

impl AddressedBlock {
    /// Address one past the last byte.
    pub fn end(&self) -> usize {
        self.start as usize + self.data.len()
    }
}

/// A block compressor producing one stream.
///
/// Blocks passed to successive [`compress_block`](Self::compress_block) calls
/// are appended to the same stream; the call with `is_last` set closes it.
pub trait Compressor {
    /// Profile written by this compressor.
    fn profile(&self) -> Profile;

    /// Current parameters.
    fn parameters(&self) -> CompressionParameters;

    /// Replace the parameters. Values are clamped.
    fn set_parameters(&mut self, params: CompressionParameters);

    /// Compress one block.
    ///
    /// `start_address` requests an addressed block (`None` means raw data).
    fn compress_block(
        &mut self,
        input: &[u8],
        start_address: Option<u16>,
        is_last: bool,
        progress: &mut dyn Progress,
    ) -> Result<CompressStatus>;

    /// Take the finished stream. Fails unless the last block was written.
    fn finish(&mut self) -> Result<Vec<u8>>;

    /// Compress `input` as one raw stream.
    ///
    /// Returns `None` if the progress callback cancelled.
    fn compress_with_progress(
        &mut self,
        input: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<Option<Vec<u8>>> {
        match self.compress_block(input, None, true, progress)? {
            CompressStatus::Done => self.finish().map(Some),
            CompressStatus::Cancelled => Ok(None),
        }
    }

    /// Compress `input` as one raw stream without progress reporting.
    fn compress_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        self.compress_with_progress(input, &mut NoProgress)?
            .ok_or_else(|| EpError::internal("compression cancelled without a progress sink"))
    }
}

/// A stream decompressor.
pub trait Decompressor {
    /// Profile read by this decompressor.
    fn profile(&self) -> Profile;

    /// Decompress a raw stream (blocks without addresses).
    fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    /// Decompress an addressed stream into contiguous address ranges.
    fn decompress_blocks(&mut self, input: &[u8]) -> Result<Vec<AddressedBlock>>;
}
