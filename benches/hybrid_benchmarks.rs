// benches/hybrid_benchmarks.rs
//
// Micro-benchmarks for the tokenizer and BM25 scoring path.
// Run with: cargo bench --bench hybrid_benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use ims_crawler::retrieval::{tokenize, BM25Index};

fn sample_corpus(size: usize) -> Vec<String> {
    (0..size)
        .map(|i| format!("authentication failure on login page attempt number {i} for user 로그인 실패"))
        .collect()
}

fn bench_tokenize_ascii(c: &mut Criterion) {
    let text = "authentication error on login page for user account";
    c.bench_function("tokenize/ascii", |b| {
        b.iter(|| black_box(tokenize(black_box(text))));
    });
}

fn bench_tokenize_cjk(c: &mut Criterion) {
    let text = "로그인 실패 원인 분석 및 인증 오류 처리";
    c.bench_function("tokenize/cjk", |b| {
        b.iter(|| black_box(tokenize(black_box(text))));
    });
}

fn bench_bm25_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bm25/build");
    for size in [100, 500, 1000].iter() {
        let corpus = sample_corpus(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(BM25Index::build(black_box(&corpus))));
        });
    }
    group.finish();
}

fn bench_bm25_scores(c: &mut Criterion) {
    let corpus = sample_corpus(500);
    let index = BM25Index::build(&corpus);
    c.bench_function("bm25/scores_500_docs", |b| {
        b.iter(|| black_box(index.scores(black_box("authentication login failure"))));
    });
}

criterion_group! {
    name = hybrid_benchmarks;
    config = Criterion::default().sample_size(20);
    targets = bench_tokenize_ascii, bench_tokenize_cjk, bench_bm25_build, bench_bm25_scores
}

criterion_main!(hybrid_benchmarks);
