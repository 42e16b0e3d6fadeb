//! Sfx command implementation.

use super::CompressSettings;
use crate::utils::{
    BarProgress, InputData, create_progress_bar, display_name, read_input, resolve_parameters, with_added_extension,
};
use epcompress::{CompressionParameters, EpError, Progress, compress_block};
use epcompress_sfx::{ExosFileType, ModuleSet, SfxOptions, unwrap, wrap};
use indicatif::MultiProgress;
use log::info;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings of the sfx command.
#[derive(Debug, Clone)]
pub struct SfxSettings {
    pub compress: CompressSettings,
    /// Directory holding the decompressor modules.
    pub modules: PathBuf,
    /// File type used when the input has no EXOS header.
    pub file_type: ExosFileType,
    pub border_effects: bool,
    pub cleanup: bool,
}

impl SfxSettings {
    fn options(&self) -> SfxOptions {
        SfxOptions {
            border_effects: self.border_effects,
            cleanup: self.cleanup,
            checksum_check: self.cleanup,
        }
    }
}

/// Compress `input` and wrap it into a self-extracting file of `file_type`.
pub fn build_sfx(
    input: &InputData,
    file_type: ExosFileType,
    settings: &SfxSettings,
    params: CompressionParameters,
    modules: &ModuleSet,
    progress: &mut dyn Progress,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let profile = settings.compress.profile;
    let start = match file_type {
        ExosFileType::Program => Some(file_type.load_address()),
        ExosFileType::Extension => None,
    };
    let stream = compress_block(profile, &input.data, start, params, progress)?
        .ok_or_else(|| EpError::internal("compression was cancelled"))?;
    let sfx = wrap(&stream, Some(profile), file_type, settings.options(), modules)?;

    let unpacked = unwrap(&sfx, file_type, Some(profile))?;
    if !unpacked.data().starts_with(&input.data) {
        return Err(EpError::internal("self-extracting file failed verification").into());
    }
    Ok(sfx)
}

pub fn cmd_sfx(
    input: &Path,
    output: Option<&Path>,
    settings: &SfxSettings,
    show_progress: bool,
) -> Result<(), Box<dyn Error>> {
    let params = resolve_parameters(&settings.compress)?;
    let modules = ModuleSet::load_dir(&settings.modules)?;
    if modules.is_empty() {
        return Err(format!("no decompressor modules in {}", settings.modules.display()).into());
    }
    let data = read_input(input, settings.compress.raw)?;
    let file_type = data.header.map_or(settings.file_type, |header| header.file_type);
    info!("{}: building {} {} SFX", input.display(), settings.compress.profile, file_type);

    let multi = MultiProgress::new();
    let pb = create_progress_bar(&multi, &display_name(input), show_progress);
    let sfx = build_sfx(&data, file_type, settings, params, &modules, &mut BarProgress(pb.clone()));
    pb.finish_and_clear();
    let sfx = sfx?;

    let target = output.map_or_else(|| with_added_extension(input, "sfx"), Path::to_path_buf);
    fs::write(&target, &sfx)?;
    println!(
        "{} -> {}: {} -> {} bytes ({} {})",
        input.display(),
        target.display(),
        data.data.len(),
        sfx.len(),
        settings.compress.profile,
        file_type
    );
    Ok(())
}
