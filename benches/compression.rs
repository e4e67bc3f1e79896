/// Benchmarks for archive (de)compression.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spnet_stats::compression;
use spnet_stats::models::Compression;

fn criterion_benchmark(c: &mut Criterion) {
    let compression_algs = [(Compression::Gzip, "gzip"), (Compression::Zlib, "zlib")];
    for (compression, name) in compression_algs {
        for size_k in [64, 256, 1024] {
            let size = size_k * 1024;
            let data: Vec<u8> = (0_u32..size)
                .map(|i| u8::try_from(i % 256).unwrap())
                .collect::<Vec<u8>>();
            let compressed = compression::compress(compression, data.as_ref()).unwrap();
            let compress_name = format!("compress({}, {})", name, size);
            c.bench_function(&compress_name, |b| {
                b.iter(|| {
                    compression::compress(compression, black_box(&data)).unwrap();
                })
            });
            let decompress_name = format!("decompress({}, {})", name, size);
            c.bench_function(&decompress_name, |b| {
                b.iter(|| {
                    compression::decompress(compression, black_box(&compressed)).unwrap();
                })
            });
        }
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
