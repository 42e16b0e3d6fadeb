//! Integration tests for match search and code tables.

use epcompress_core::bitstream::{BitReader, BitWriter};
use epcompress_core::huffman::{HuffmanBuilder, HuffmanDecoder, canonical_codes};
use epcompress_core::search::{MatchTable, SearchLimits};
use epcompress_core::slot::{DEFAULT_UNENCODED_COST, SlotDecodeTable, SlotEncodeTable};
use epcompress_core::traits::FormatDescriptor;

fn pseudo_random(size: usize, alphabet: u32, mut seed: u32) -> Vec<u8> {
    (0..size)
        .map(|_| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            ((seed >> 16) % alphabet) as u8
        })
        .collect()
}

#[test]
fn test_every_match_reproduces_the_data() {
    let mut data = pseudo_random(3000, 4, 99);
    data.extend_from_slice(&[0x55; 700]);
    data.extend_from_within(100..900);

    for format in [FormatDescriptor::M0, FormatDescriptor::M2] {
        let table = MatchTable::build(&data, SearchLimits::for_format(&format)).unwrap();
        assert_eq!(table.len(), data.len());
        for pos in 0..data.len() {
            let mut prev_len = usize::MAX;
            for m in table.matches(pos) {
                let (len, distance) = (m.len as usize, m.distance as usize);
                assert!(len < prev_len, "candidates must be sorted longest first");
                prev_len = len;
                assert!(len >= format.min_match && len <= format.max_match);
                assert!(distance >= 1 && distance <= pos && distance <= format.max_offset);
                assert!(pos + len <= data.len());
                for k in 0..len {
                    assert_eq!(data[pos + k], data[pos + k - distance]);
                }
            }
        }
    }
}

#[test]
fn test_slot_tables_are_idempotent() {
    let samples: Vec<usize> = pseudo_random(5000, 251, 3)
        .iter()
        .zip(pseudo_random(5000, 7, 11))
        .map(|(&a, b)| (a as usize) << b)
        .collect();

    for fast in [true, false] {
        let mut widths = Vec::new();
        for _ in 0..2 {
            let mut table = SlotEncodeTable::prefix_range(65_535, 2, &[4, 8, 16, 32]).unwrap();
            for &s in &samples {
                table.add_symbol(s, DEFAULT_UNENCODED_COST);
            }
            table.update_tables(fast).unwrap();
            widths.push((0..table.slot_count()).map(|i| table.slot_width(i)).collect::<Vec<_>>());
        }
        assert_eq!(widths[0], widths[1]);
    }
}

#[test]
fn test_slot_codes_through_the_bitstream() {
    let mut table = SlotEncodeTable::fixed(4096, 2, 4).unwrap();
    let values = [0usize, 1, 5, 17, 300, 1023, 4000, 17, 5];
    for &v in &values {
        table.add_symbol(v, DEFAULT_UNENCODED_COST);
    }
    table.update_tables(false).unwrap();

    let mut writer = BitWriter::msb_first();
    let widths: Vec<u8> = (0..table.slot_count()).map(|i| table.slot_width(i) as u8).collect();
    for &w in &widths {
        writer.write_bits(w as u32, 4);
    }
    for &v in &values {
        let code = table.encode(v).unwrap();
        writer.write_bits(code.slot as u32, 2);
        writer.write_token(&code.extra_token());
    }
    let data = writer.finish();

    let mut reader = BitReader::msb_first(&data, 0);
    let decode = SlotDecodeTable::read(&mut reader, widths.len()).unwrap();
    for &v in &values {
        let slot = reader.read_bits(2).unwrap() as usize;
        assert_eq!(decode.decode(slot, &mut reader).unwrap() as usize, v);
    }
}

#[test]
fn test_canonical_codes_are_prefix_free() {
    let mut builder = HuffmanBuilder::new(324, 16);
    for (i, b) in pseudo_random(20_000, 324, 5).iter().enumerate() {
        // Skewed distribution with a long tail.
        builder.add((*b as usize * (i % 3 + 1)) % 324);
    }
    let lengths = builder.build_lengths();
    let codes = canonical_codes(&lengths);
    let used: Vec<usize> = (0..lengths.len()).filter(|&s| lengths[s] > 0).collect();
    for &a in &used {
        for &b in &used {
            if a == b || lengths[a] > lengths[b] {
                continue;
            }
            let shift = lengths[b] - lengths[a];
            assert_ne!(codes[b] >> shift, codes[a], "code {a} is a prefix of {b}");
        }
    }
    // Equal-length codes are consecutive in symbol order.
    for len in 1..=16u8 {
        let of_len: Vec<u32> = used.iter().filter(|&&s| lengths[s] == len).map(|&s| codes[s]).collect();
        for pair in of_len.windows(2) {
            assert_eq!(pair[1], pair[0] + 1);
        }
    }
    assert!(HuffmanDecoder::from_lengths(&lengths).is_ok());
}
