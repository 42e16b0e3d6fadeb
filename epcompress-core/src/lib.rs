//! # epcompress core
//!
//! Core components shared by the epcompress stream formats.
//!
//! This crate provides the building blocks every profile is assembled from:
//!
//! - [`bitstream`]: Bit I/O with byte-aligned literal bytes, and encoder tokens
//! - [`checksum`]: The one-byte stream checksum
//! - [`search`]: Suffix-array match search table
//! - [`slot`]: Slot-coded (prefix + fixed width) encode and decode tables
//! - [`huffman`]: Length-limited canonical Huffman codes
//! - [`optimize`]: Iteration hashing and best-candidate tracking
//! - [`split`]: Block split and merge planning
//! - [`window`]: Decoder output targets (64 KiB address space, raw buffer)
//! - [`config`], [`progress`], [`traits`], [`error`]: Parameters, progress
//!   reporting, the compressor/decompressor traits and error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: Front ends                                          │
//! │     epcompress facade, CLI, SFX wrapper                 │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: Profiles                                            │
//! │     M0 (Huffman), M2 (slot codes), M3 (gamma, in place) │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Modelling                                           │
//! │     MatchTable, SlotEncodeTable, HuffmanBuilder, split  │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Streams (this crate)                                │
//! │     BitReader/BitWriter, Checksum, AddressSpace         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use epcompress_core::bitstream::{BitReader, BitWriter};
//! use epcompress_core::checksum::Checksum;
//!
//! let mut writer = BitWriter::msb_first();
//! writer.write_aligned_byte(0);
//! writer.write_bits(0b101, 3);
//! writer.write_aligned_byte(0x42);
//! let mut data = writer.finish();
//! Checksum::M2.seal(&mut data);
//! assert!(Checksum::M2.verify(&data).is_ok());
//!
//! let mut reader = BitReader::msb_first(&data, 1);
//! assert_eq!(reader.read_bits(3).unwrap(), 0b101);
//! assert_eq!(reader.read_aligned_byte().unwrap(), 0x42);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod checksum;
pub mod config;
pub mod error;
pub mod huffman;
pub mod optimize;
pub mod progress;
pub mod search;
pub mod slot;
pub mod split;
pub mod traits;
pub mod window;

// Re-exports for convenience
pub use bitstream::{BitOrder, BitReader, BitWriter, Token};
pub use checksum::Checksum;
pub use config::CompressionParameters;
pub use error::{EpError, Result};
pub use huffman::{HuffmanBuilder, HuffmanDecoder};
pub use optimize::{IterationTracker, iteration_hash};
pub use progress::{NoProgress, Progress, ProgressTracker};
pub use search::{Match, MatchTable, SearchLimits};
pub use slot::{SlotCode, SlotDecodeTable, SlotEncodeTable};
pub use split::{BlockSpan, PairMerger, SizedBlock};
pub use traits::{
    AddressedBlock, CompressStatus, Compressor, Decompressor, FormatDescriptor, Profile,
};
pub use window::{AddressSpace, LinearOutput, OutputWindow};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bitstream::{BitReader, BitWriter, Token};
    pub use crate::config::CompressionParameters;
    pub use crate::error::{EpError, Result};
    pub use crate::progress::{NoProgress, Progress};
    pub use crate::traits::{
        AddressedBlock, CompressStatus, Compressor, Decompressor, Profile,
    };
}
