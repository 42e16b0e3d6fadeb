//! Info command implementation.

use epcompress::detect::integrity_check;
use epcompress::{Profile, candidates, create_decompressor};
use epcompress_sfx::{ExosHeader, find_loader_end, strip_header, unwrap};
use log::debug;
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct HeaderInfo {
    file_type: String,
    length: u16,
}

#[derive(Debug, Serialize)]
struct BlockInfo {
    start: u16,
    end: usize,
}

#[derive(Debug, Serialize)]
struct FileInfo {
    path: PathBuf,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<HeaderInfo>,
    sfx: bool,
    /// Profiles whose integrity check accepts the data.
    candidates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    integrity: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unpacked_size: Option<usize>,
    blocks: Vec<BlockInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileInfo {
    fn new(path: &Path, size: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            size,
            header: None,
            sfx: false,
            candidates: Vec::new(),
            profile: None,
            integrity: None,
            unpacked_size: None,
            blocks: Vec::new(),
            error: None,
        }
    }

    fn set_profile(&mut self, profile: Profile) {
        self.profile = Some(profile.to_string());
        self.integrity = Some(integrity_check(profile));
    }
}

/// Decode `stream` with the first candidate that accepts it, both as a raw
/// and as an addressed stream.
fn inspect_stream(stream: &[u8], info: &mut FileInfo) {
    let found = candidates(stream);
    info.candidates = found.iter().map(ToString::to_string).collect();
    let mut first_error = None;
    for profile in found {
        let mut decompressor = create_decompressor(profile);
        let raw = decompressor.decompress(stream);
        let blocks = decompressor.decompress_blocks(stream);
        match (raw, blocks) {
            (Err(e), Err(_)) => {
                debug!("{profile}: rejected ({e})");
                first_error.get_or_insert_with(|| e.to_string());
            }
            (raw, blocks) => {
                info.set_profile(profile);
                let blocks = blocks.unwrap_or_default();
                info.unpacked_size = Some(match raw {
                    Ok(data) => data.len(),
                    Err(_) => blocks.iter().map(|block| block.data.len()).sum(),
                });
                info.blocks = blocks
                    .iter()
                    .map(|block| BlockInfo {
                        start: block.start,
                        end: block.end(),
                    })
                    .collect();
                return;
            }
        }
    }
    info.error = Some(first_error.unwrap_or_else(|| "unrecognized compressed data".to_string()));
}

fn inspect(path: &Path, raw: bool) -> Result<FileInfo, Box<dyn Error>> {
    let contents = fs::read(path)?;
    let mut info = FileInfo::new(path, contents.len());
    let header = if raw { None } else { ExosHeader::parse(&contents) };
    let Some(header) = header else {
        inspect_stream(&contents, &mut info);
        return Ok(info);
    };

    info.header = Some(HeaderInfo {
        file_type: header.file_type.to_string(),
        length: header.length,
    });
    let (_, code) = strip_header(&contents);
    match unwrap(&contents, header.file_type, None) {
        Ok(unpacked) => {
            info.sfx = true;
            info.candidates.push(unpacked.profile.to_string());
            info.set_profile(unpacked.profile);
            info.unpacked_size = Some(unpacked.data().len());
        }
        Err(e) => {
            debug!("{}: not self-extracting ({e})", path.display());
            if find_loader_end(code).is_some() {
                info.error = Some(e.to_string());
            } else {
                inspect_stream(code, &mut info);
            }
        }
    }
    Ok(info)
}

fn print_info(info: &FileInfo) {
    println!("{}:", info.path.display());
    println!("  size:       {} bytes", info.size);
    if let Some(header) = &info.header {
        println!("  header:     EXOS {}, {} bytes", header.file_type, header.length);
    }
    if info.sfx {
        println!("  sfx:        yes");
    }
    if !info.candidates.is_empty() {
        println!("  candidates: {}", info.candidates.join(", "));
    }
    if let (Some(profile), Some(integrity)) = (&info.profile, info.integrity) {
        println!("  profile:    {profile} (verified by {integrity})");
    }
    if let Some(size) = info.unpacked_size {
        println!("  unpacked:   {size} bytes");
    }
    for block in &info.blocks {
        println!("  block:      {:#06x}..{:#06x}", block.start, block.end);
    }
    if let Some(error) = &info.error {
        println!("  error:      {error}");
    }
}

pub fn cmd_info(files: &[PathBuf], raw: bool, json: bool) -> Result<(), Box<dyn Error>> {
    let infos = files
        .iter()
        .map(|file| inspect(file, raw))
        .collect::<Result<Vec<_>, _>>()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        for (i, info) in infos.iter().enumerate() {
            if i > 0 {
                println!();
            }
            print_info(info);
        }
    }
    Ok(())
}
