use bffgen_aggregation::aggregation::{FetchRequest, ParallelAggregator};
use bffgen_aggregation::batching::{batch_fn, RequestBatcher};
use bffgen_aggregation::cache::CacheManager;
use bffgen_aggregation::config::{BatcherConfig, CacheConfig};
use bffgen_aggregation::resilience::{CircuitBreaker, CircuitBreakerConfig};
use bffgen_aggregation::transform::{Record, ResponseTransformer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn benchmark_breaker_execute(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("bench", CircuitBreakerConfig::default());

    c.bench_function("breaker_execute_closed", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(breaker.execute(|| async { Ok::<_, ()>(1) }).await) })
    });
}

fn benchmark_batcher_full_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_secs(1), 16));
    let loader = batch_fn(|ids: Vec<String>| async move {
        Ok(ids.into_iter().map(|id| (id.clone(), id)).collect())
    });

    c.bench_function("batcher_flush_16", |b| {
        b.to_async(&rt).iter(|| {
            let batcher = batcher.clone();
            let loader = Arc::clone(&loader);
            async move {
                let calls = (0..16).map(|i| {
                    let batcher = batcher.clone();
                    let loader = Arc::clone(&loader);
                    async move { batcher.batch("bench", loader, &i.to_string()).await }
                });
                black_box(futures::future::join_all(calls).await)
            }
        })
    });
}

fn benchmark_cache_local_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = CacheManager::local_only(&CacheConfig::default());

    c.bench_function("cache_local_set_get", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = cache.set("movie:7", &json!({ "id": 7 }), Duration::from_secs(60)).await;
            black_box(cache.get::<serde_json::Value>("movie:7").await)
        })
    });
}

fn benchmark_fetch_parallel(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let aggregator = ParallelAggregator::default();

    c.bench_function("fetch_parallel_8", |b| {
        b.to_async(&rt).iter(|| async {
            let requests = (0..8)
                .map(|i| FetchRequest::new(format!("svc{i}"), move || async move { Ok(i) }))
                .collect();
            black_box(aggregator.fetch_parallel(requests).await)
        })
    });
}

fn benchmark_transform_pipeline(c: &mut Criterion) {
    let t = ResponseTransformer::new();
    let record: Record = serde_json::from_value(json!({
        "id": 1,
        "name": "Ada",
        "password": "x",
        "profile": { "city": "London", "geo": { "lat": 51.5, "lon": -0.1 } }
    }))
    .unwrap();

    c.bench_function("transform_sanitize_flatten", |b| {
        b.iter(|| black_box(t.flatten(&t.sanitize(&record), "")))
    });
}

criterion_group!(
    benches,
    benchmark_breaker_execute,
    benchmark_batcher_full_batch,
    benchmark_cache_local_round_trip,
    benchmark_fetch_parallel,
    benchmark_transform_pipeline
);
criterion_main!(benches);
