//! Building and taking apart self-extracting files.

use crate::exos::{ExosFileType, ExosHeader, HEADER_LEN, strip_header};
use crate::module::{ModuleKey, ModuleSet, SfxOptions};
use epcompress::{create_decompressor, decompress_auto, decompress_blocks_auto};
use epcompress_core::error::{EpError, Result};
use epcompress_core::traits::{AddressedBlock, Profile};
use log::{debug, info};

/// `LD C,80H; JR -6`, followed by the four patched loader fields.
pub const LOADER_SIGNATURE: [u8; 4] = [0x0E, 0x80, 0x18, 0xFA];

/// Loader size of extension modules.
pub const EXTENSION_LOADER_LEN: usize = 42;

/// First code offset searched for the loader signature.
const SIGNATURE_SEARCH_START: usize = 64;

const PROGRAM_CODE_LIMIT: usize = 0xBF00;
const PROGRAM_END_LIMIT: usize = 0x10000;
const EXTENSION_CODE_LIMIT: usize = 0x3FF6;
const EXTENSION_END_LIMIT: usize = 0xFF84;

/// Smallest and largest decompressor code around a payload.
const PROGRAM_MIN_OVERHEAD: usize = 208;
const EXTENSION_MIN_OVERHEAD: usize = 160;
const MAX_OVERHEAD: usize = 1024;

/// Result of unpacking a self-extracting file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped {
    /// Profile of the embedded stream.
    pub profile: Profile,
    /// File type of the rebuilt file.
    pub file_type: ExosFileType,
    /// Plain EXOS file: header followed by the decompressed data.
    pub image: Vec<u8>,
}

impl Unwrapped {
    /// Data after the EXOS header.
    pub fn data(&self) -> &[u8] {
        &self.image[HEADER_LEN..]
    }
}

fn decode_program(stream: &[u8], profile: Option<Profile>) -> Result<(Profile, Vec<AddressedBlock>)> {
    match profile {
        Some(profile) => Ok((profile, create_decompressor(profile).decompress_blocks(stream)?)),
        None => decompress_blocks_auto(stream),
    }
}

fn decode_extension(stream: &[u8], profile: Option<Profile>) -> Result<(Profile, Vec<u8>)> {
    match profile {
        Some(profile) => Ok((profile, create_decompressor(profile).decompress(stream)?)),
        None => decompress_auto(stream),
    }
}

/// Wrap a compressed stream into a self-extracting EXOS file.
///
/// Programs must be addressed streams loading at or above 0x0100;
/// extensions are raw streams unpacked at 0xC00A. The stream is decoded
/// once to find the end address of the unpacked data. `profile` may be
/// `None` to detect it.
pub fn wrap(
    stream: &[u8],
    profile: Option<Profile>,
    file_type: ExosFileType,
    options: SfxOptions,
    modules: &ModuleSet,
) -> Result<Vec<u8>> {
    let (profile, end) = match file_type {
        ExosFileType::Program => {
            let (profile, blocks) = decode_program(stream, profile)?;
            (profile, blocks.iter().map(AddressedBlock::end).max().unwrap_or(0))
        }
        ExosFileType::Extension => {
            let (profile, data) = decode_extension(stream, profile)?;
            (profile, ExosFileType::Extension.load_address() as usize + data.len())
        }
    };

    let key = ModuleKey::new(profile, file_type, options);
    let module = modules
        .get(&key)
        .ok_or_else(|| EpError::invalid_input(format!("missing SFX module {}", key.file_name())))?;
    let (loader_len, code) = match file_type {
        ExosFileType::Program => {
            if module.len() < 2 {
                return Err(EpError::invalid_input("SFX module has no loader size"));
            }
            let loader_len = u16::from_le_bytes([module[0], module[1]]) as usize;
            (loader_len, &module[2..])
        }
        ExosFileType::Extension => (EXTENSION_LOADER_LEN, module),
    };
    if loader_len < 4 || loader_len > code.len() {
        return Err(EpError::invalid_input(format!(
            "SFX module {} has an invalid loader size {loader_len}",
            key.file_name()
        )));
    }

    let (code_limit, end_limit) = match file_type {
        ExosFileType::Program => (PROGRAM_CODE_LIMIT, PROGRAM_END_LIMIT),
        ExosFileType::Extension => (EXTENSION_CODE_LIMIT, EXTENSION_END_LIMIT),
    };
    let total = code.len() + stream.len();
    if total > code_limit {
        return Err(EpError::sfx_limit(format!(
            "{total} bytes of code and compressed data, at most {code_limit} allowed"
        )));
    }
    if end > end_limit {
        return Err(EpError::sfx_limit(format!(
            "uncompressed data ends at {end:#06x}, past {end_limit:#06x}"
        )));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + total);
    out.extend_from_slice(&ExosHeader::new(file_type, total as u16).to_bytes());
    out.extend_from_slice(&code[..loader_len]);
    let fields = out.len() - 4;
    if file_type == ExosFileType::Program {
        out[fields..fields + 2].copy_from_slice(&(end as u16).to_le_bytes());
    }
    out[fields + 2..fields + 4].copy_from_slice(&(stream.len() as u16).to_le_bytes());
    out.extend_from_slice(stream);
    out.extend_from_slice(&code[loader_len..]);
    info!(
        "SFX {file_type} ({}): {} bytes, data ends at {end:#06x}",
        key.file_name(),
        out.len()
    );
    Ok(out)
}

/// Unpack a self-extracting file into a plain EXOS file.
///
/// A leading EXOS header of type `file_type` is skipped; the data after it
/// is limited to the declared length.
pub fn unwrap(data: &[u8], file_type: ExosFileType, profile: Option<Profile>) -> Result<Unwrapped> {
    let code = match strip_header(data) {
        (Some(header), code) if header.file_type == file_type => code,
        _ => data,
    };
    match file_type {
        ExosFileType::Program => unwrap_program(code, profile),
        ExosFileType::Extension => unwrap_extension(code, profile),
    }
}

/// Unpack a self-extracting file whose type is given by its EXOS header.
pub fn unwrap_file(data: &[u8], profile: Option<Profile>) -> Result<Unwrapped> {
    let header = ExosHeader::parse(data).ok_or_else(|| EpError::not_sfx("missing EXOS header"))?;
    unwrap(data, header.file_type, profile)
}

/// Find the end of a program loader.
pub fn find_loader_end(code: &[u8]) -> Option<usize> {
    code.windows(LOADER_SIGNATURE.len() + 4)
        .enumerate()
        .skip(SIGNATURE_SEARCH_START)
        .find(|(_, window)| window.starts_with(&LOADER_SIGNATURE))
        .map(|(i, window)| i + window.len())
}

fn payload_range(code: &[u8], loader_end: usize, min_overhead: usize) -> Result<(usize, usize)> {
    let length = u16::from_le_bytes([code[loader_end - 2], code[loader_end - 1]]) as usize;
    let n = code.len();
    if n < length + min_overhead || n > length + MAX_OVERHEAD || loader_end + length > n {
        return Err(EpError::not_sfx(format!(
            "{n} bytes of code cannot hold {length} bytes of compressed data"
        )));
    }
    Ok((loader_end, loader_end + length))
}

fn unwrap_program(code: &[u8], profile: Option<Profile>) -> Result<Unwrapped> {
    let loader_end = find_loader_end(code).ok_or_else(|| EpError::not_sfx("loader signature not found"))?;
    if code.len() <= loader_end {
        return Err(EpError::not_sfx("no data after the loader"));
    }
    let (start, stop) = payload_range(code, loader_end, PROGRAM_MIN_OVERHEAD)?;
    // An end field of zero is the top of the address space.
    let end = match u16::from_le_bytes([code[loader_end - 4], code[loader_end - 3]]) {
        0 => PROGRAM_END_LIMIT,
        end => end as usize,
    };
    let base = ExosFileType::Program.load_address() as usize;
    if end <= base {
        return Err(EpError::not_sfx(format!("invalid end address {end:#06x}")));
    }

    let (profile, blocks) = decode_program(&code[start..stop], profile)?;
    let mut image = vec![0u8; HEADER_LEN + end - base];
    image[..HEADER_LEN].copy_from_slice(&ExosHeader::new(ExosFileType::Program, (end - base) as u16).to_bytes());
    for block in &blocks {
        if (block.start as usize) < base || block.end() > end {
            return Err(EpError::not_sfx(format!(
                "block {:#06x}..{:#06x} outside the program area",
                block.start,
                block.end()
            )));
        }
        let at = HEADER_LEN + block.start as usize - base;
        image[at..at + block.data.len()].copy_from_slice(&block.data);
    }
    debug!("unpacked {profile} SFX program: {} bytes", end - base);
    Ok(Unwrapped {
        profile,
        file_type: ExosFileType::Program,
        image,
    })
}

fn unwrap_extension(code: &[u8], profile: Option<Profile>) -> Result<Unwrapped> {
    if code.len() <= EXTENSION_LOADER_LEN {
        return Err(EpError::not_sfx("no data after the loader"));
    }
    let (start, stop) = payload_range(code, EXTENSION_LOADER_LEN, EXTENSION_MIN_OVERHEAD)?;
    let (profile, data) = decode_extension(&code[start..stop], profile)?;
    if data.is_empty() || data.len() > EXTENSION_CODE_LIMIT {
        return Err(EpError::not_sfx(format!("invalid extension size {}", data.len())));
    }
    let mut image = ExosHeader::new(ExosFileType::Extension, data.len() as u16)
        .to_bytes()
        .to_vec();
    image.extend_from_slice(&data);
    debug!("unpacked {profile} SFX extension: {} bytes", data.len());
    Ok(Unwrapped {
        profile,
        file_type: ExosFileType::Extension,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_loader_end() {
        let mut code = vec![0u8; 100];
        code.extend_from_slice(&LOADER_SIGNATURE);
        code.extend_from_slice(&[1, 2, 3, 4, 0xC9]);
        assert_eq!(find_loader_end(&code), Some(108));

        // Signatures before the search start are ignored.
        let mut early = vec![0u8; 10];
        early.extend_from_slice(&LOADER_SIGNATURE);
        early.extend_from_slice(&[0u8; 100]);
        assert_eq!(find_loader_end(&early), None);
    }

    #[test]
    fn test_payload_bounds() {
        let mut code = vec![0u8; 42 + 10 + 150];
        code[40] = 10;
        assert_eq!(payload_range(&code, 42, EXTENSION_MIN_OVERHEAD).unwrap(), (42, 52));
        code[40] = 200;
        assert!(matches!(
            payload_range(&code, 42, EXTENSION_MIN_OVERHEAD),
            Err(EpError::NotSfx { .. })
        ));
    }

    #[test]
    fn test_unwrap_file_needs_header() {
        assert!(matches!(unwrap_file(&[0u8; 40], None), Err(EpError::NotSfx { .. })));
    }
}
