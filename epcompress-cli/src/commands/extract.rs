//! Extract command implementation.

use super::DecodeSettings;
use crate::utils::{extracted_name, output_path};
use epcompress::{
    AddressedBlock, EpError, Profile, create_decompressor, decompress_auto, decompress_blocks_auto,
};
use epcompress_sfx::{ExosFileType, ExosHeader, unwrap};
use log::{debug, info};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// A decoded input file.
#[derive(Debug)]
pub struct Decoded {
    pub profile: Profile,
    /// Self-extracting file type, if the input was one.
    pub sfx: Option<ExosFileType>,
    /// Extracted contents (a plain EXOS file for self-extracting input).
    pub data: Vec<u8>,
}

fn concat(blocks: Vec<AddressedBlock>) -> Vec<u8> {
    blocks.into_iter().flat_map(|block| block.data).collect()
}

/// Decode a raw stream, falling back to an addressed one.
fn decode_stream(stream: &[u8], profile: Option<Profile>) -> Result<(Profile, Vec<u8>), EpError> {
    let raw = match profile {
        Some(profile) => create_decompressor(profile).decompress(stream).map(|data| (profile, data)),
        None => decompress_auto(stream),
    };
    match raw {
        Ok(result) => Ok(result),
        Err(e) => {
            debug!("not a raw stream ({e}), trying addressed blocks");
            let (profile, blocks) = match profile {
                Some(profile) => (profile, create_decompressor(profile).decompress_blocks(stream)?),
                None => decompress_blocks_auto(stream)?,
            };
            Ok((profile, concat(blocks)))
        }
    }
}

/// Decode the contents of a compressed or self-extracting file.
///
/// Files starting with an EXOS header are unpacked as self-extracting
/// programs unless `settings.raw` is set.
pub fn decode_file(contents: &[u8], settings: &DecodeSettings) -> Result<Decoded, EpError> {
    if contents.is_empty() {
        return Err(EpError::invalid_input("empty input file"));
    }
    if !settings.raw {
        if let Some(header) = ExosHeader::parse(contents) {
            let unpacked = unwrap(contents, header.file_type, settings.profile)?;
            return Ok(Decoded {
                profile: unpacked.profile,
                sfx: Some(unpacked.file_type),
                data: unpacked.image,
            });
        }
    }
    let (profile, data) = decode_stream(contents, settings.profile)?;
    Ok(Decoded {
        profile,
        sfx: None,
        data,
    })
}

pub fn cmd_extract(files: &[PathBuf], output: Option<&Path>, settings: &DecodeSettings) -> Result<(), Box<dyn Error>> {
    for file in files {
        let target = output_path(file, output, files.len(), extracted_name)?;
        let contents = fs::read(file)?;
        let decoded = decode_file(&contents, settings).map_err(|e| format!("{}: {}", file.display(), e))?;
        if decoded.data.is_empty() {
            return Err(format!("{}: no data", file.display()).into());
        }
        fs::write(&target, &decoded.data)?;
        match decoded.sfx {
            Some(file_type) => info!("{}: {} SFX {}", file.display(), decoded.profile, file_type),
            None => info!("{}: {} stream", file.display(), decoded.profile),
        }
        println!(
            "{} -> {}: {} -> {} bytes ({})",
            file.display(),
            target.display(),
            contents.len(),
            decoded.data.len(),
            decoded.profile
        );
    }
    Ok(())
}
