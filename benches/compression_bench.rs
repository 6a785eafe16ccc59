use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::Path;

fn bench_levels(c: &mut Criterion) {
    let text = b"a moderately compressible benchmark corpus line. ".repeat(20_000);
    c.bench_function("deflate_level1_1mb", |b| {
        b.iter(|| baar::codec::try_compress(black_box(&text), 1))
    });
    c.bench_function("deflate_level2_1mb", |b| {
        b.iter(|| baar::codec::try_compress(black_box(&text), 2))
    });
    c.bench_function("deflate_level4_search_1mb", |b| {
        b.iter(|| baar::codec::try_compress(black_box(&text), 4))
    });
}

fn bench_auto_level(c: &mut Criterion) {
    let text = b"a moderately compressible benchmark corpus line. ".repeat(20_000);
    c.bench_function("auto_level_probe_1mb", |b| {
        b.iter(|| baar::codec::auto_level(black_box(Path::new("corpus.txt")), black_box(&text)))
    });
}

criterion_group!(benches, bench_levels, bench_auto_level);
criterion_main!(benches);
