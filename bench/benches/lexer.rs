use bench::sample;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use ward::{lexer, source::SourceFile, TokenMap};

fn criterion_benchmark(c: &mut Criterion) {
    let input = sample(200);
    let source = SourceFile::new("sample.ward", input.as_bytes());

    c.bench_function("lexer", |b| {
        b.iter(|| {
            let tm = TokenMap::with_capacity(1024);
            let tokens = lexer::tokenize(&tm, black_box(&source)).unwrap();
            black_box(tokens.len());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
