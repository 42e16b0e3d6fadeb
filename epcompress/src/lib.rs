//! # epcompress
//!
//! Optimizing LZ77 compressors and decompressors for Enterprise 128
//! programs and data. This crate ties the individual profiles together:
//!
//! - **M0**: canonical Huffman codes, delta matches and a recent-offset cache
//! - **M2**: slot-coded lengths and offsets with byte-aligned literals
//! - **M3**: gamma codes in a single block that unpacks in place
//!
//! ## Example
//!
//! ```rust
//! use epcompress::{CompressionParameters, Profile, compress, decompress_auto};
//!
//! let data = b"IS IT A BIRD? IS IT A PLANE? IS IT AN ENTERPRISE?".repeat(4);
//! let params = CompressionParameters {
//!     optimize_iterations: 4,
//!     ..Default::default()
//! };
//! let packed = compress(Profile::M2, &data, params).unwrap();
//! let (profile, unpacked) = decompress_auto(&packed).unwrap();
//! assert_eq!(profile, Profile::M2);
//! assert_eq!(unpacked, data);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod detect;
#[cfg(feature = "parallel")]
pub mod parallel;

pub use detect::{candidates, detect, is_plausible};
pub use epcompress_core::{
    AddressedBlock, CompressStatus, CompressionParameters, Compressor, Decompressor, EpError,
    NoProgress, Progress, Profile, Result,
};
pub use epcompress_m0::{M0Compressor, M0Decompressor};
pub use epcompress_m2::{M2Compressor, M2Decompressor};
pub use epcompress_m3::{M3Compressor, M3Decompressor};

use epcompress_core::checksum::Checksum;
use log::debug;

/// Create a compressor for `profile`.
pub fn create_compressor(
    profile: Profile,
    params: CompressionParameters,
) -> Result<Box<dyn Compressor + Send>> {
    Ok(match profile {
        Profile::M0 => Box::new(M0Compressor::with_parameters(params)),
        Profile::M2 => Box::new(M2Compressor::with_parameters(params)?),
        Profile::M3 => Box::new(M3Compressor::with_parameters(params)),
    })
}

/// Create a decompressor for `profile`.
pub fn create_decompressor(profile: Profile) -> Box<dyn Decompressor + Send> {
    match profile {
        Profile::M0 => Box::new(M0Decompressor::new()),
        Profile::M2 => Box::new(M2Decompressor::new()),
        Profile::M3 => Box::new(M3Decompressor::new()),
    }
}

/// Compress `input` as one raw stream.
pub fn compress(profile: Profile, input: &[u8], params: CompressionParameters) -> Result<Vec<u8>> {
    create_compressor(profile, params)?.compress_all(input)
}

/// Compress `input` as a single block, optionally loaded at `start_address`.
///
/// Returns `None` if `progress` cancelled.
pub fn compress_block(
    profile: Profile,
    input: &[u8],
    start_address: Option<u16>,
    params: CompressionParameters,
    progress: &mut dyn Progress,
) -> Result<Option<Vec<u8>>> {
    let mut compressor = create_compressor(profile, params)?;
    match compressor.compress_block(input, start_address, true, progress)? {
        CompressStatus::Done => compressor.finish().map(Some),
        CompressStatus::Cancelled => Ok(None),
    }
}

/// Decompress a raw stream of a known profile.
pub fn decompress(profile: Profile, stream: &[u8]) -> Result<Vec<u8>> {
    create_decompressor(profile).decompress(stream)
}

/// Decompress a raw stream, trying M2, then M0, then M3.
///
/// Returns the first profile that decodes the stream without error.
pub fn decompress_auto(stream: &[u8]) -> Result<(Profile, Vec<u8>)> {
    try_profiles(stream, |decompressor| decompressor.decompress(stream))
}

/// Decompress an addressed stream, trying M2, then M0, then M3.
pub fn decompress_blocks_auto(stream: &[u8]) -> Result<(Profile, Vec<AddressedBlock>)> {
    try_profiles(stream, |decompressor| decompressor.decompress_blocks(stream))
}

fn try_profiles<T>(
    stream: &[u8],
    mut run: impl FnMut(&mut dyn Decompressor) -> Result<T>,
) -> Result<(Profile, T)> {
    let mut first_error = None;
    for profile in candidates(stream) {
        match run(create_decompressor(profile).as_mut()) {
            Ok(data) => return Ok((profile, data)),
            Err(e) if !e.is_data_error() => return Err(e),
            Err(e) => {
                debug!("not a valid {profile} stream: {e}");
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| EpError::corrupted(0, "unrecognized compressed data")))
}

/// Check the integrity byte of a stream without decoding it.
///
/// Returns the profile whose checksum holds (M2 is tried first). M3 streams
/// carry no checksum; for them only the container size fields are checked.
pub fn verify(stream: &[u8]) -> Result<Profile> {
    let mut first_error = None;
    for (profile, checksum) in [(Profile::M2, Checksum::M2), (Profile::M0, Checksum::M0)] {
        match checksum.verify(stream) {
            Ok(()) => return Ok(profile),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    if is_plausible(Profile::M3, stream) {
        return Ok(Profile::M3);
    }
    Err(first_error.unwrap_or_else(|| EpError::unexpected_end(0)))
}
