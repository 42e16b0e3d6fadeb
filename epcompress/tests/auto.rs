//! Profile detection and factory tests across all profiles.

use epcompress::{
    AddressedBlock, CompressionParameters, EpError, Profile, candidates, compress, compress_block,
    create_compressor, decompress, decompress_auto, decompress_blocks_auto, verify,
};

fn quick() -> CompressionParameters {
    CompressionParameters {
        optimize_iterations: 4,
        ..Default::default()
    }
}

fn sample() -> Vec<u8> {
    let mut data = b"10 PRINT \"HELLO\"\n20 GOTO 10\n".repeat(20);
    data.extend((0..=255u8).rev());
    data
}

#[test]
fn test_decompress_auto_detects_every_profile() {
    let data = sample();
    for profile in Profile::DETECTION_ORDER {
        let packed = compress(profile, &data, quick()).unwrap();
        assert!(candidates(&packed).contains(&profile), "{profile}");
        let (detected, unpacked) = decompress_auto(&packed).unwrap();
        assert_eq!(detected, profile);
        assert_eq!(unpacked, data);
        assert_eq!(decompress(profile, &packed).unwrap(), data);
    }
}

#[test]
fn test_addressed_program() {
    let program = sample();
    for profile in Profile::DETECTION_ORDER {
        let packed = compress_block(profile, &program, Some(0x0100), quick(), &mut epcompress::NoProgress)
            .unwrap()
            .unwrap();
        let (detected, blocks) = decompress_blocks_auto(&packed).unwrap();
        assert_eq!(detected, profile);
        assert_eq!(
            blocks,
            vec![AddressedBlock {
                start: 0x0100,
                data: program.clone()
            }]
        );
    }
}

#[test]
fn test_multi_block_stream() {
    let mut compressor = create_compressor(Profile::M2, quick()).unwrap();
    let mut progress = epcompress::NoProgress;
    compressor
        .compress_block(b"first block first block", Some(0x4000), false, &mut progress)
        .unwrap();
    compressor
        .compress_block(b"second block", Some(0x8000), true, &mut progress)
        .unwrap();
    let packed = compressor.finish().unwrap();
    let (_, blocks) = decompress_blocks_auto(&packed).unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].start, 0x4000);
    assert_eq!(blocks[1].data, b"second block");
}

#[test]
fn test_cancelled_compression() {
    let mut cancel = |_percent: u8| false;
    let result = compress_block(Profile::M0, &sample(), None, quick(), &mut cancel).unwrap();
    assert!(result.is_none());
}

#[test]
fn test_garbage_is_rejected() {
    let garbage = [0x12u8, 0x34, 0x57];
    assert!(candidates(&garbage).is_empty());
    assert!(decompress_auto(&garbage).unwrap_err().is_data_error());
    assert!(matches!(decompress_auto(&[]), Err(EpError::CorruptedData { .. })));
}

#[test]
fn test_verify_checks_integrity_only() {
    let data = sample();
    let m0 = compress(Profile::M0, &data, quick()).unwrap();
    assert!(matches!(verify(&m0), Ok(Profile::M0) | Ok(Profile::M2)));

    let m3 = compress(Profile::M3, &data, quick()).unwrap();
    assert!(verify(&m3).is_ok());
}

#[test]
fn test_invalid_profile_id() {
    assert!(matches!(Profile::from_id(6), Err(EpError::InvalidProfile { id: 6 })));
}
