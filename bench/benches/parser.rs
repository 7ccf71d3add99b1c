use bench::sample;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use ward::{lexer, parser, parse_sources, source::SourceFile, TokenMap};

fn criterion_benchmark(c: &mut Criterion) {
    let input = sample(200);
    let source = SourceFile::new("sample.ward", input.as_bytes());
    let tm = TokenMap::with_capacity(1024);
    let tokens = lexer::tokenize(&tm, &source).unwrap();

    c.bench_function("parser", |b| {
        b.iter(|| {
            let file = parser::parse(&tm, &source, black_box(&tokens)).unwrap();
            black_box(file);
        })
    });

    let units: Vec<(String, String)> = (0..16)
        .map(|n| (format!("unit{n}.ward"), sample(16)))
        .collect();
    c.bench_function("parse_sources", |b| {
        b.iter(|| {
            let tm = TokenMap::with_capacity(1024);
            let files = parse_sources(&tm, black_box(&units)).unwrap();
            black_box(files);
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
