//! Performance benchmarks for the LZMA codec.
//!
//! This benchmark suite evaluates:
//! - Decode throughput (MB/s) across data patterns
//! - Encode throughput for the greedy match finder
//! - LZMA2 chunked decode overhead

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sjuz_lzma::{LzmaProps, compress_raw, decode_lzma2, decompress_raw, encode_lzma2};
use std::hint::black_box;
use std::io::Cursor;

/// Test data patterns.
mod test_data {
    /// Uniform data (best case for the match finder).
    pub fn uniform(size: usize) -> Vec<u8> {
        vec![0xAA; size]
    }

    /// Reproducible pseudo-random data (worst case).
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x123456789ABCDEF0;
        for _ in 0..size {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }

    /// Text-like data.
    pub fn text_like(size: usize) -> Vec<u8> {
        let text: &[u8] = b"The quick brown fox jumps over the lazy dog. \
                            Pack my box with five dozen liquor jugs. ";
        text.iter().copied().cycle().take(size).collect()
    }
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("lzma_decode");
    let size = 256 * 1024;

    for (name, data) in [
        ("uniform", test_data::uniform(size)),
        ("random", test_data::random(size)),
        ("text", test_data::text_like(size)),
    ] {
        let packed = compress_raw(&data, 1 << 16);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("pattern", name), &packed, |b, packed| {
            b.iter(|| {
                decompress_raw(
                    Cursor::new(black_box(packed)),
                    LzmaProps::default(),
                    size as u64,
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("lzma_encode");
    let size = 256 * 1024;
    let data = test_data::text_like(size);

    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("text", |b| {
        b.iter(|| compress_raw(black_box(&data), 1 << 16));
    });

    group.finish();
}

fn bench_lzma2(c: &mut Criterion) {
    let size = 256 * 1024;
    let data = test_data::text_like(size);
    let encoded = encode_lzma2(&data);

    let mut group = c.benchmark_group("lzma2_decode");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("text", |b| {
        b.iter(|| decode_lzma2(black_box(&encoded)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode, bench_lzma2);
criterion_main!(benches);
