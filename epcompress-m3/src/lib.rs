//! # epcompress M3
//!
//! Profile M3: LZ77 with Elias-gamma coded lengths and offsets, laid out
//! so that a Z80 decompressor can unpack a program in place, reading the
//! compressed data from the end of memory while writing below it.
//!
//! ## Stream layout
//!
//! ```text
//! C:16le body... A:16le            (body = C bytes, uncompressed size = C + A)
//! n:16le data... 0:16              (stored, A = 0)
//!
//! The body is the token stream below, packed with bits entering the
//! register from the top and one-padded, then reversed as a whole. The
//! data is processed back to front.
//!
//! tokens  = run (flag token)...    (the first run has no flag)
//! token   = 0 run | 1 match        (a match directly after a run has no flag)
//! run     = gamma(len) byte...
//! match   = gamma(len-1) 3:width-1 (d+1)     (len 2, d <= 510)
//!         | gamma(len-1) 4:width d           (len > 2)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use epcompress_m3::{compress, decompress};
//!
//! let data = b"Enterprise 128 Enterprise 128 Enterprise 128";
//! let packed = compress(data).unwrap();
//! assert_eq!(decompress(&packed).unwrap(), data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod codes;
mod decoder;
mod encoder;
mod parse;

pub use decoder::M3Decompressor;
pub use encoder::{M3Compressor, PROGRAM_ADDRESS};

use epcompress_core::config::CompressionParameters;
use epcompress_core::error::Result;
use epcompress_core::traits::{Compressor, Decompressor};

/// Compress `data` as an M3 stream with default parameters.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with_parameters(data, CompressionParameters::default())
}

/// Compress `data` as an M3 stream.
pub fn compress_with_parameters(data: &[u8], params: CompressionParameters) -> Result<Vec<u8>> {
    M3Compressor::with_parameters(params).compress_all(data)
}

/// Decompress an M3 stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    M3Decompressor::new().decompress(data)
}
