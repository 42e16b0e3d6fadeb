//! # epcompress M0
//!
//! Profile M0: LZ77 with two canonical Huffman coded alphabets, matches
//! that add a constant delta to the copied bytes, and a cache of the four
//! most recently used long distances.
//!
//! ## Stream layout
//!
//! ```text
//! [checksum] block... (bit stream, MSB first, zero padded)
//!
//! block   = [address:16] 65536-count:16 last:1 compressed:1 body
//! body    = byte:8...                            (stored: count bytes)
//!         | table table symbol...                (compressed)
//! table   = 0                                    (fixed width: 9 / 5 bits)
//!         | 1 (gamma(n+1) gamma(delta)^n)^16     (code lengths 1..16)
//! symbol  = literal
//!         | distance_class [extra] length_class [extra]
//!         | delta_match delta:7 length_class [extra]
//!         | recent_slot length_class [extra]
//! ```
//!
//! ## Example
//!
//! ```rust
//! use epcompress_m0::{compress, decompress};
//!
//! let data = b"ABCDEFGH ABCDEFGH abcdefgh ABCDEFGH";
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

pub use decoder::M0Decompressor;
pub use encoder::M0Compressor;

use epcompress_core::config::CompressionParameters;
use epcompress_core::error::Result;
use epcompress_core::traits::{Compressor, Decompressor};

/// Compress `data` as a raw M0 stream with default parameters.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with_parameters(data, CompressionParameters::default())
}

/// Compress `data` as a raw M0 stream.
pub fn compress_with_parameters(data: &[u8], params: CompressionParameters) -> Result<Vec<u8>> {
    M0Compressor::with_parameters(params).compress_all(data)
}

/// Decompress a raw M0 stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    M0Decompressor::new().decompress(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_small() {
        for data in [&b"a"[..], b"ab", b"zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz", b"hello hello hello"] {
            let packed = compress(data).unwrap();
            assert_eq!(decompress(&packed).unwrap(), data);
        }
    }

    #[test]
    fn test_ascending_table_shrinks() {
        // Delta matches cover tables of incrementing values.
        let data: Vec<u8> = (0..2048u32).map(|i| (i * 2) as u8).collect();
        let packed = compress(&data).unwrap();
        assert!(packed.len() < 64);
        assert_eq!(decompress(&packed).unwrap(), data);
    }
}
