//! Benchmarks for TTL jitter computation (avalanche defense).

use cache_guard::TtlPolicy;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_final_ttl_no_jitter(c: &mut Criterion) {
    c.bench_function("final_ttl_no_jitter", |b| {
        b.iter(|| black_box(TtlPolicy::final_ttl(300, false, 0.0)));
    });
}

fn bench_final_ttl_with_jitter(c: &mut Criterion) {
    c.bench_function("final_ttl_with_jitter", |b| {
        b.iter(|| black_box(TtlPolicy::final_ttl(300, true, 0.5)));
    });
}

criterion_group!(benches, bench_final_ttl_no_jitter, bench_final_ttl_with_jitter);
criterion_main!(benches);
