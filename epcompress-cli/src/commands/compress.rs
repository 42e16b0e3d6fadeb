//! Compress command implementation.

use super::CompressSettings;
use crate::utils::{
    BarProgress, COMPRESSED_EXTENSION, InputData, create_progress_bar, display_name, output_path, read_input,
    resolve_parameters, savings, with_added_extension,
};
use epcompress::{CompressionParameters, EpError, Profile, Progress, compress_block, create_decompressor};
use epcompress_sfx::ExosFileType;
use indicatif::MultiProgress;
use log::{debug, info};
use rayon::prelude::*;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// Load address implied by an input file, if any.
pub fn start_address(input: &InputData) -> Option<u16> {
    input
        .header
        .filter(|header| header.file_type == ExosFileType::Program)
        .map(|header| header.file_type.load_address())
}

/// Compress one input and check the result by decompressing it.
pub fn compress_input(
    input: &InputData,
    profile: Profile,
    params: CompressionParameters,
    progress: &mut dyn Progress,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let start = start_address(input);
    let stream = compress_block(profile, &input.data, start, params, progress)?
        .ok_or_else(|| EpError::internal("compression was cancelled"))?;

    let mut decompressor = create_decompressor(profile);
    let unpacked = match start {
        Some(_) => decompressor
            .decompress_blocks(&stream)?
            .into_iter()
            .flat_map(|block| block.data)
            .collect(),
        None => decompressor.decompress(&stream)?,
    };
    if unpacked != input.data {
        return Err(EpError::internal("compressed data failed verification").into());
    }
    debug!("verified {} bytes", unpacked.len());
    Ok(stream)
}

struct Outcome {
    input: PathBuf,
    output: PathBuf,
    original: usize,
    compressed: usize,
}

fn compress_file(
    input: &Path,
    output: &Path,
    settings: &CompressSettings,
    params: CompressionParameters,
    multi: &MultiProgress,
    show_progress: bool,
) -> Result<Outcome, Box<dyn Error>> {
    let data = read_input(input, settings.raw)?;
    if let Some(header) = data.header {
        info!("{}: EXOS {} header stripped", input.display(), header.file_type);
    }
    let pb = create_progress_bar(multi, &display_name(input), show_progress);
    let stream = compress_input(&data, settings.profile, params, &mut BarProgress(pb.clone()));
    pb.finish_and_clear();
    let stream = stream?;
    fs::write(output, &stream)?;
    Ok(Outcome {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        original: data.data.len(),
        compressed: stream.len(),
    })
}

pub fn cmd_compress(
    files: &[PathBuf],
    output: Option<&Path>,
    settings: &CompressSettings,
    show_progress: bool,
) -> Result<(), Box<dyn Error>> {
    let params = resolve_parameters(settings)?;
    let jobs = files
        .iter()
        .map(|file| {
            let target = output_path(file, output, files.len(), |p| {
                with_added_extension(p, COMPRESSED_EXTENSION)
            })?;
            Ok((file.clone(), target))
        })
        .collect::<Result<Vec<_>, Box<dyn Error>>>()?;

    let multi = MultiProgress::new();
    let results: Vec<(PathBuf, Result<Outcome, String>)> = jobs
        .par_iter()
        .map(|(input, target)| {
            let result = compress_file(input, target, settings, params, &multi, show_progress)
                .map_err(|e| e.to_string());
            (input.clone(), result)
        })
        .collect();

    let mut failed = 0;
    for (input, result) in results {
        match result {
            Ok(outcome) => println!(
                "{} -> {}: {} -> {} bytes ({:.1}% saved, {})",
                outcome.input.display(),
                outcome.output.display(),
                outcome.original,
                outcome.compressed,
                savings(outcome.original, outcome.compressed),
                settings.profile
            ),
            Err(e) => {
                eprintln!("{}: {}", input.display(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(format!("{failed} of {} files failed", files.len()).into());
    }
    Ok(())
}
