//! Benchmarks for M3 compression and decompression
//!
//! M3 has no table iterations, so compression runs with the default
//! parameters.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use epcompress_m3::{compress, decompress};
use std::hint::black_box;

mod test_data {
    /// Random data - incompressible
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x0123_4567_89AB_CDEF;
        for _ in 0..size {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }

    /// Text-like data
    pub fn text_like(size: usize) -> Vec<u8> {
        let text = b"10 PRINT \"ENTERPRISE\"\n20 GOTO 10\n30 REM IS-BASIC listing\n";
        text.iter().copied().cycle().take(size).collect()
    }

    /// Screen memory: long runs with occasional attribute bytes
    pub fn screen_like(size: usize) -> Vec<u8> {
        (0..size)
            .map(|i| if i % 80 < 60 { 0x00 } else { (i / 80) as u8 })
            .collect()
    }
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("m3_compress");
    group.sample_size(10);
    let patterns: [(&str, fn(usize) -> Vec<u8>); 3] = [
        ("random", test_data::random),
        ("text", test_data::text_like),
        ("screen", test_data::screen_like),
    ];
    for size in [4 * 1024, 16 * 1024] {
        for (name, generate) in patterns {
            let data = generate(size);
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::new(name, size), &data, |b, data| {
                b.iter(|| compress(black_box(data)).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("m3_decompress");
    for (name, data) in [
        ("text", test_data::text_like(32 * 1024)),
        ("screen", test_data::screen_like(32 * 1024)),
    ] {
        let packed = compress(&data).unwrap();
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| decompress(black_box(&packed)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress);
criterion_main!(benches);
