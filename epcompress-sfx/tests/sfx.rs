//! Wrapping and unwrapping self-extracting files with stand-in modules.

use epcompress::{CompressionParameters, NoProgress, Profile, compress, compress_block, create_compressor};
use epcompress_core::error::EpError;
use epcompress_sfx::{
    EXTENSION_LOADER_LEN, ExosFileType, ExosHeader, HEADER_LEN, LOADER_SIGNATURE, ModuleKey, ModuleSet,
    SfxOptions, unwrap, unwrap_file, wrap,
};

const FILLER: usize = 100;
const REST: usize = 150;

fn quick() -> CompressionParameters {
    CompressionParameters {
        optimize_iterations: 4,
        ..Default::default()
    }
}

/// Program module: loader size, filler, signature, four field bytes, rest.
fn program_module() -> Vec<u8> {
    let loader = FILLER + LOADER_SIGNATURE.len() + 4;
    let mut image = (loader as u16).to_le_bytes().to_vec();
    image.extend(std::iter::repeat_n(0x00, FILLER));
    image.extend_from_slice(&LOADER_SIGNATURE);
    image.extend_from_slice(&[0xFF; 4]);
    image.extend(std::iter::repeat_n(0xC9, REST));
    image
}

fn extension_module() -> Vec<u8> {
    let mut image = vec![0x00; EXTENSION_LOADER_LEN];
    image.extend(std::iter::repeat_n(0xC9, REST));
    image
}

fn modules() -> ModuleSet {
    let mut set = ModuleSet::new();
    for profile in Profile::DETECTION_ORDER {
        set.insert(
            ModuleKey::new(profile, ExosFileType::Program, SfxOptions::default()),
            program_module(),
        );
        set.insert(
            ModuleKey::new(profile, ExosFileType::Extension, SfxOptions::default()),
            extension_module(),
        );
    }
    set
}

fn program() -> Vec<u8> {
    let mut data = b"\xF3\x31\x00\x01\xCD\x10\x00".to_vec();
    data.extend(b"ENTERPRISE ".repeat(40));
    data
}

#[test]
fn test_program_roundtrip() {
    let data = program();
    let stream = compress_block(Profile::M3, &data, Some(0x0100), quick(), &mut NoProgress)
        .unwrap()
        .unwrap();
    let sfx = wrap(&stream, Some(Profile::M3), ExosFileType::Program, SfxOptions::default(), &modules()).unwrap();

    let code_len = program_module().len() - 2;
    assert_eq!(
        ExosHeader::parse(&sfx),
        Some(ExosHeader::new(ExosFileType::Program, (code_len + stream.len()) as u16))
    );
    let fields = HEADER_LEN + FILLER + LOADER_SIGNATURE.len();
    let end = 0x0100 + data.len();
    assert_eq!(sfx[fields..fields + 2], (end as u16).to_le_bytes());
    assert_eq!(sfx[fields + 2..fields + 4], (stream.len() as u16).to_le_bytes());
    assert_eq!(&sfx[fields + 4..fields + 4 + stream.len()], &stream[..]);
    assert!(sfx.ends_with(&[0xC9; REST]));

    let unpacked = unwrap_file(&sfx, None).unwrap();
    assert_eq!(unpacked.profile, Profile::M3);
    assert_eq!(unpacked.file_type, ExosFileType::Program);
    assert_eq!(unpacked.data(), &data[..]);
    assert_eq!(
        ExosHeader::parse(&unpacked.image).map(|h| h.length as usize),
        Some(data.len())
    );
}

#[test]
fn test_program_blocks_with_gap() {
    let mut compressor = create_compressor(Profile::M2, quick()).unwrap();
    compressor
        .compress_block(b"first part of the program", Some(0x0100), false, &mut NoProgress)
        .unwrap();
    compressor
        .compress_block(b"second part", Some(0x0200), true, &mut NoProgress)
        .unwrap();
    let stream = compressor.finish().unwrap();
    let sfx = wrap(&stream, None, ExosFileType::Program, SfxOptions::default(), &modules()).unwrap();

    let unpacked = unwrap(&sfx, ExosFileType::Program, Some(Profile::M2)).unwrap();
    let data = unpacked.data();
    assert_eq!(data.len(), 0x100 + 11);
    assert_eq!(&data[..25], b"first part of the program");
    assert!(data[25..0x100].iter().all(|&b| b == 0));
    assert_eq!(&data[0x100..], b"second part");
}

#[test]
fn test_extension_roundtrip() {
    let data = b"extension code extension code extension code".repeat(8);
    let stream = compress(Profile::M0, &data, quick()).unwrap();
    let sfx = wrap(&stream, None, ExosFileType::Extension, SfxOptions::default(), &modules()).unwrap();

    assert_eq!(sfx[1], 6);
    let fields = HEADER_LEN + EXTENSION_LOADER_LEN - 2;
    assert_eq!(sfx[fields..fields + 2], (stream.len() as u16).to_le_bytes());

    let unpacked = unwrap_file(&sfx, None).unwrap();
    assert_eq!(unpacked.profile, Profile::M0);
    assert_eq!(unpacked.file_type, ExosFileType::Extension);
    assert_eq!(unpacked.data(), &data[..]);
}

#[test]
fn test_extension_end_limit() {
    // Unpacked at 0xC00A, this would end at 0xFF85.
    let data = vec![0u8; 0xFF85 - 0xC00A];
    let stream = compress(Profile::M3, &data, quick()).unwrap();
    let result = wrap(&stream, Some(Profile::M3), ExosFileType::Extension, SfxOptions::default(), &modules());
    assert!(matches!(result, Err(EpError::SfxLimit { .. })));

    let fits = compress(Profile::M3, &data[1..], quick()).unwrap();
    assert!(wrap(&fits, Some(Profile::M3), ExosFileType::Extension, SfxOptions::default(), &modules()).is_ok());
}

#[test]
fn test_program_code_limit() {
    let mut set = ModuleSet::new();
    let mut module = program_module();
    module.extend(std::iter::repeat_n(0u8, 0xBF00));
    set.insert(
        ModuleKey::new(Profile::M3, ExosFileType::Program, SfxOptions::default()),
        module,
    );
    let stream = compress_block(Profile::M3, b"tiny", Some(0x0100), quick(), &mut NoProgress)
        .unwrap()
        .unwrap();
    let result = wrap(&stream, Some(Profile::M3), ExosFileType::Program, SfxOptions::default(), &set);
    assert!(matches!(result, Err(EpError::SfxLimit { .. })));
}

#[test]
fn test_module_selection() {
    let stream = compress_block(Profile::M3, &program(), Some(0x0100), quick(), &mut NoProgress)
        .unwrap()
        .unwrap();
    let no_border = SfxOptions {
        border_effects: false,
        ..Default::default()
    };
    assert!(matches!(
        wrap(&stream, Some(Profile::M3), ExosFileType::Program, no_border, &modules()),
        Err(EpError::InvalidInput { .. })
    ));

    // M3 decompressors have no checksum variant.
    let with_check = SfxOptions {
        checksum_check: true,
        ..Default::default()
    };
    assert!(wrap(&stream, Some(Profile::M3), ExosFileType::Program, with_check, &modules()).is_ok());
}

#[test]
fn test_block_below_program_area() {
    let stream = compress_block(Profile::M2, b"low memory block", Some(0x0080), quick(), &mut NoProgress)
        .unwrap()
        .unwrap();
    let sfx = wrap(&stream, Some(Profile::M2), ExosFileType::Program, SfxOptions::default(), &modules()).unwrap();
    assert!(matches!(unwrap_file(&sfx, None), Err(EpError::NotSfx { .. })));
}

#[test]
fn test_not_an_sfx_file() {
    let mut data = ExosHeader::new(ExosFileType::Program, 300).to_bytes().to_vec();
    data.extend(std::iter::repeat_n(0x3E, 300));
    assert!(matches!(unwrap_file(&data, None), Err(EpError::NotSfx { .. })));
    assert!(matches!(
        unwrap(&data[HEADER_LEN..40], ExosFileType::Extension, None),
        Err(EpError::NotSfx { .. })
    ));
}
