//! # epcompress M2
//!
//! Profile M2: LZ77 with slot-coded match lengths and offsets and
//! byte-aligned literal bytes, designed for a fast Z80 decompressor.
//!
//! ## Stream layout
//!
//! ```text
//! [checksum] block... (bit stream, MSB first, zero padded)
//!
//! block   = [address:16] count-1:16 last:1 compressed:1 body
//! body    = byte...                              (stored: count bytes)
//!         | tables symbol...                     (compressed: count symbols)
//! tables  = offs3prefix-2:2 width:4 x (8 + 4 + 8 + 2^offs3prefix)
//! symbol  = 0 byte                               (literal)
//!         | 111111111 len-17:8 byte...           (literal run, 17..272)
//!         | 1^(s+1) 0 extra offset_slot extra    (match)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use epcompress_m2::{compress, decompress};
//!
//! let data = b"Enterprise 128 Enterprise 128 Enterprise 128";
//! let packed = compress(data).unwrap();
//! assert_eq!(decompress(&packed).unwrap(), data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod decoder;
mod encoder;
mod parse;
pub mod tables;

pub use decoder::M2Decompressor;
pub use encoder::M2Compressor;

use epcompress_core::config::CompressionParameters;
use epcompress_core::error::Result;
use epcompress_core::traits::{Compressor, Decompressor};

/// Compress `data` as a raw M2 stream with default parameters.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with_parameters(data, CompressionParameters::default())
}

/// Compress `data` as a raw M2 stream.
pub fn compress_with_parameters(data: &[u8], params: CompressionParameters) -> Result<Vec<u8>> {
    M2Compressor::with_parameters(params)?.compress_all(data)
}

/// Decompress a raw M2 stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    M2Decompressor::new().decompress(data)
}
