//! Benchmarks for match search and table construction
//!
//! Measures suffix-array match table construction across data patterns and
//! the cost of rebuilding slot tables from collected statistics.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use epcompress_core::search::{MatchTable, SearchLimits};
use epcompress_core::slot::{DEFAULT_UNENCODED_COST, SlotEncodeTable};
use epcompress_core::traits::FormatDescriptor;
use std::hint::black_box;

/// Generate test data patterns for benchmarking
mod test_data {
    /// Random data - varied byte values
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x123456789ABCDEF0;
        for _ in 0..size {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }

    /// Zero data - one long run
    pub fn zeros(size: usize) -> Vec<u8> {
        vec![0; size]
    }

    /// Text-like data
    pub fn text_like(size: usize) -> Vec<u8> {
        let text = b"The quick brown fox jumps over the lazy dog. ";
        text.iter().copied().cycle().take(size).collect()
    }

    /// Z80-like machine code: short repeated instruction sequences
    pub fn code_like(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut addr: u16 = 0x4000;
        while data.len() < size {
            data.extend_from_slice(&[0x21, addr as u8, (addr >> 8) as u8, 0xCD, 0x10, 0x00, 0x3E]);
            data.push((addr >> 3) as u8);
            addr = addr.wrapping_add(0x23);
        }
        data.truncate(size);
        data
    }
}

fn bench_match_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_table");
    let limits = SearchLimits::for_format(&FormatDescriptor::M2);
    let patterns: [(&str, fn(usize) -> Vec<u8>); 4] = [
        ("random", test_data::random),
        ("zeros", test_data::zeros),
        ("text", test_data::text_like),
        ("code", test_data::code_like),
    ];
    for size in [4 * 1024, 32 * 1024] {
        for (name, generate) in patterns {
            let data = generate(size);
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::new(name, size), &data, |b, data| {
                b.iter(|| MatchTable::build(black_box(data), limits).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_slot_tables(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_tables");
    for (label, fast) in [("fast", true), ("exact", false)] {
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut table = SlotEncodeTable::prefix_range(65_535, 2, &[4, 8, 16, 32]).unwrap();
                let mut seed = 7u32;
                for _ in 0..20_000 {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    let n = ((seed >> 16) as usize % 4096) >> ((seed >> 8) as usize % 8);
                    table.add_symbol(n, DEFAULT_UNENCODED_COST);
                }
                black_box(table.update_tables(fast).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_match_table, bench_slot_tables);
criterion_main!(benches);
