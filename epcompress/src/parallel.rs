//! Compressing independent buffers on the rayon thread pool.
//!
//! Each buffer gets its own compressor instance; results come back in input
//! order.

use crate::{Profile, compress, decompress_auto};
use epcompress_core::config::CompressionParameters;
use epcompress_core::error::Result;
use rayon::prelude::*;

/// Compress every buffer of `inputs` as a raw stream.
pub fn compress_many<T>(inputs: &[T], profile: Profile, params: CompressionParameters) -> Vec<Result<Vec<u8>>>
where
    T: AsRef<[u8]> + Sync,
{
    inputs
        .par_iter()
        .map(|input| compress(profile, input.as_ref(), params))
        .collect()
}

/// Decompress every stream of `streams`, detecting each profile.
pub fn decompress_many<T>(streams: &[T]) -> Vec<Result<(Profile, Vec<u8>)>>
where
    T: AsRef<[u8]> + Sync,
{
    streams
        .par_iter()
        .map(|stream| decompress_auto(stream.as_ref()))
        .collect()
}
