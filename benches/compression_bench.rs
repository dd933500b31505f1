use barc::compress::{get_codec, Algorithm};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_compression(c: &mut Criterion) {
    let data = vec![0u8; 1024 * 1024];

    let deflate = get_codec(Algorithm::Deflate);
    c.bench_function("deflate_compress_1mb", |b| b.iter(|| deflate.compress(black_box(&data), 6)));

    let bzip2 = get_codec(Algorithm::Bzip2);
    c.bench_function("bzip2_compress_1mb", |b| b.iter(|| bzip2.compress(black_box(&data), 6)));

    let lzma = get_codec(Algorithm::Lzma);
    c.bench_function("lzma_compress_1mb", |b| b.iter(|| lzma.compress(black_box(&data), 6)));
}

criterion_group!(benches, bench_compression);
criterion_main!(benches);
