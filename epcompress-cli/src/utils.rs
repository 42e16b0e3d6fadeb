//! Utility functions for the CLI.

use crate::commands::CompressSettings;
use epcompress::{CompressionParameters, Progress};
use epcompress_sfx::{ExosHeader, strip_header};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// Level used when none is given.
pub const DEFAULT_LEVEL: u8 = CompressionParameters::MAX_LEVEL;

/// Extension appended to compressed files.
pub const COMPRESSED_EXTENSION: &str = "epc";

/// Compression parameters for the command line.
///
/// A parameter file replaces the defaults; `--level` is applied on top of
/// either.
pub fn resolve_parameters(settings: &CompressSettings) -> Result<CompressionParameters, Box<dyn Error>> {
    let mut params = match &settings.params_file {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => CompressionParameters {
            min_length: 2,
            max_offset: 65_535,
            block_size: 65_536,
            ..CompressionParameters::with_level(DEFAULT_LEVEL)
        },
    };
    if let Some(level) = settings.level {
        params.set_level(level);
    }
    Ok(params.limited())
}

/// Input data after optional EXOS header removal.
pub struct InputData {
    /// Header found at the start of the file.
    pub header: Option<ExosHeader>,
    /// Data after the header.
    pub data: Vec<u8>,
}

/// Read a file, stripping its EXOS header unless `raw` is set.
pub fn read_input(path: &Path, raw: bool) -> Result<InputData, Box<dyn Error>> {
    let contents = fs::read(path)?;
    if contents.is_empty() {
        return Err(format!("{}: empty input file", path.display()).into());
    }
    if raw {
        return Ok(InputData {
            header: None,
            data: contents,
        });
    }
    let (header, data) = strip_header(&contents);
    Ok(InputData {
        header,
        data: data.to_vec(),
    })
}

/// `path` with `.ext` appended to the file name.
pub fn with_added_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Default output name for extracting `path`.
pub fn extracted_name(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case(COMPRESSED_EXTENSION) => path.with_extension(""),
        _ => with_added_extension(path, "out"),
    }
}

/// Pick the output path for one of `count` inputs.
pub fn output_path(
    input: &Path,
    output: Option<&Path>,
    count: usize,
    default: impl FnOnce(&Path) -> PathBuf,
) -> Result<PathBuf, Box<dyn Error>> {
    match output {
        Some(_) if count > 1 => Err("--output needs a single input file".into()),
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(default(input)),
    }
}

/// Create a percentage progress bar with standard styling.
pub fn create_progress_bar(multi: &MultiProgress, name: &str, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }
    let pb = multi.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template("{prefix:>24} [{bar:40.cyan/blue}] {pos:>3}% {msg}") {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb.set_prefix(name.to_string());
    pb
}

/// Forwards compressor progress to a progress bar.
pub struct BarProgress(pub ProgressBar);

impl Progress for BarProgress {
    fn report(&mut self, percent: u8) -> bool {
        self.0.set_position(percent.into());
        true
    }

    fn message(&mut self, message: &str) {
        self.0.set_message(message.to_string());
    }
}

/// Space saved in percent.
pub fn savings(original: usize, compressed: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - compressed as f64 / original as f64) * 100.0
}

/// Display name of a path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcompress::Profile;

    fn settings() -> CompressSettings {
        CompressSettings {
            profile: Profile::M3,
            level: None,
            params_file: None,
            raw: false,
        }
    }

    #[test]
    fn test_default_parameters() {
        let params = resolve_parameters(&settings()).unwrap();
        assert_eq!(params.min_length, 2);
        assert_eq!(params.max_offset, 65_535);
        assert_eq!(params.block_size, 65_536);
        assert_eq!(params.split_optimization_depth, 9);
    }

    #[test]
    fn test_level_and_parameter_file() {
        let path = std::env::temp_dir().join(format!("epcompress_cli_params_{}.json", std::process::id()));
        fs::write(&path, r#"{"optimize_iterations": 8, "min_length": 3}"#).unwrap();
        let params = resolve_parameters(&CompressSettings {
            level: Some(2),
            params_file: Some(path.clone()),
            ..settings()
        })
        .unwrap();
        let _ = fs::remove_file(&path);

        // The level resets the iteration count.
        assert_eq!(params.optimize_iterations, 40);
        assert_eq!(params.split_optimization_depth, 2);
        assert_eq!(params.min_length, 3);
        assert_eq!(params.max_offset, CompressionParameters::default().max_offset);
    }

    #[test]
    fn test_output_names() {
        assert_eq!(
            with_added_extension(Path::new("dir/game.com"), COMPRESSED_EXTENSION),
            PathBuf::from("dir/game.com.epc")
        );
        assert_eq!(extracted_name(Path::new("game.com.epc")), PathBuf::from("game.com"));
        assert_eq!(extracted_name(Path::new("game.bin")), PathBuf::from("game.bin.out"));
        assert!(output_path(Path::new("a"), Some(Path::new("b")), 2, |p| p.to_path_buf()).is_err());
        assert_eq!(
            output_path(Path::new("a"), None, 2, |p| with_added_extension(p, "x")).unwrap(),
            PathBuf::from("a.x")
        );
    }

    #[test]
    fn test_savings() {
        assert_eq!(savings(0, 10), 0.0);
        assert!((savings(200, 50) - 75.0).abs() < 1e-9);
    }
}
