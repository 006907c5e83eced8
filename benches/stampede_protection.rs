//! Benchmarks for cache breakdown (stampede) protection.

use cache_guard::{CacheOptions, EngineBuilder, MockStore, ReadRequest};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn setup() -> (Arc<cache_guard::ProtectionEngine>, Runtime) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("failed to create runtime"));
    let engine = rt.block_on(async {
        EngineBuilder::new()
            .with_kv_store(Arc::new(MockStore::new()))
            .build()
            .await
            .unwrap_or_else(|_| panic!("failed to build engine"))
    });
    (engine, rt)
}

fn bench_stampede_protection(c: &mut Criterion) {
    let (engine, rt) = setup();

    c.bench_function("stampede_100_concurrent", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:{}", rand::random::<u32>());
                let mut handles = Vec::with_capacity(100);

                for _ in 0..100 {
                    let engine = engine.clone();
                    let key = key.clone();
                    handles.push(tokio::spawn(async move {
                        let load_fn = Arc::new(|| {
                            Box::pin(async {
                                tokio::time::sleep(Duration::from_millis(10)).await;
                                Ok(Some(b"computed".to_vec()))
                            }) as cache_guard::LoadFuture
                        });
                        let request = ReadRequest::new("bench", key, load_fn).with_options(
                            CacheOptions::default()
                                .with_membership_filter(false)
                                .with_local_lock(true),
                        );
                        engine.get(request).await
                    }));
                }

                for handle in handles {
                    let _ = black_box(handle.await.unwrap_or_else(|_| panic!("task failed")));
                }
            });
        });
    });
}

criterion_group!(benches, bench_stampede_protection);
criterion_main!(benches);
