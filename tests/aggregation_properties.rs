//! Behavioral guarantees of the aggregation core, one test per property.

mod common;

use bffgen_aggregation::aggregation::{FetchRequest, ParallelAggregator};
use bffgen_aggregation::batching::RequestBatcher;
use bffgen_aggregation::cache::CacheManager;
use bffgen_aggregation::config::{BatcherConfig, CacheConfig};
use bffgen_aggregation::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use bffgen_aggregation::transform::{Record, ResponseTransformer};
use bffgen_aggregation::AggregationError;
use common::{init_tracing, unreachable_cache_config, user_loader};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn concurrent_distinct_ids_share_one_batch_call() {
    init_tracing();
    let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_millis(50), 10));
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = user_loader(Arc::clone(&calls));

    let tasks: Vec<_> = (1..=5)
        .map(|id| {
            let batcher = batcher.clone();
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { batcher.batch("users", loader, &id.to_string()).await })
        })
        .collect();

    for (index, task) in tasks.into_iter().enumerate() {
        let user = task.await.unwrap().unwrap();
        assert_eq!(user.id, (index + 1).to_string());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_batch_flushes_before_window() {
    let batcher = RequestBatcher::new(BatcherConfig::new(Duration::from_millis(500), 2));
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = user_loader(Arc::clone(&calls));

    let started = Instant::now();
    let (a, b) = tokio::join!(
        batcher.batch("users", Arc::clone(&loader), "1"),
        batcher.batch("users", Arc::clone(&loader), "2"),
    );

    assert!(a.is_ok() && b.is_ok());
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn breaker_rejects_after_threshold_without_invoking() {
    let breaker = CircuitBreaker::new(
        "reviews",
        CircuitBreakerConfig::default().with_failure_threshold(3),
    );
    let invocations = AtomicUsize::new(0);

    for _ in 0..3 {
        let result = breaker
            .execute(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("503")
            })
            .await;
        assert!(!result.unwrap_err().is_circuit_open());
    }

    let rejected = breaker
        .execute(|| async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;

    assert!(rejected.unwrap_err().is_circuit_open());
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn breaker_recovers_through_half_open() {
    let breaker = CircuitBreaker::new(
        "catalog",
        CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 2,
            reset_timeout: Duration::from_millis(100),
        },
    );

    for _ in 0..2 {
        let _ = breaker.execute(|| async { Err::<(), _>("down") }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(110)).await;

    breaker.execute(|| async { Ok::<_, ()>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.execute(|| async { Ok::<_, ()>(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn parallel_results_follow_input_order() {
    let aggregator = ParallelAggregator::default();

    let results = aggregator
        .fetch_parallel(vec![
            FetchRequest::new("A", || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(AggregationError::downstream("A failed"))
            }),
            FetchRequest::new("B", || async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok("B")
            }),
            FetchRequest::new("C", || async { Ok("C") }),
        ])
        .await;

    assert_eq!(results.len(), 3);
    let order: Vec<_> = results.iter().map(|r| r.service.as_str()).collect();
    assert_eq!(order, ["A", "B", "C"]);
    assert_eq!(
        results.iter().map(|r| r.success).collect::<Vec<_>>(),
        [false, true, true]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_alone() {
    let aggregator = ParallelAggregator::with_timeout(Duration::from_millis(100));

    let results = aggregator
        .fetch_parallel(vec![
            FetchRequest::new("slow", || async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(1)
            }),
            FetchRequest::new("fast", || async { Ok(2) }),
            FetchRequest::new("fast-too", || async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(3)
            }),
        ])
        .await;

    assert!(!results[0].success);
    assert!(results[0].is_timeout());
    assert!(results[1].success && results[2].success);
    assert!(results[0].duration >= Duration::from_millis(100));
}

#[tokio::test]
async fn unreachable_durable_tier_matches_local_only() {
    let degraded = CacheManager::new(&unreachable_cache_config()).await;
    let local = CacheManager::new(&CacheConfig::default()).await;
    assert!(!degraded.is_durable());
    assert_eq!(degraded.provider_name(), local.provider_name());

    for cache in [&degraded, &local] {
        cache
            .set("session", &json!({ "user": 7 }), Duration::from_secs(30))
            .await
            .unwrap();
    }

    for cache in [&degraded, &local] {
        let value: serde_json::Value = cache.get("session").await.unwrap();
        assert_eq!(value, json!({ "user": 7 }));
        assert!(cache.exists("session").await);
        assert!(cache.ttl("session").await.unwrap() <= Duration::from_secs(30));

        cache.delete("session").await;
        assert!(!cache.exists("session").await);
        assert!(cache
            .get::<serde_json::Value>("session")
            .await
            .unwrap_err()
            .is_cache_miss());
        assert!(cache.ttl("session").await.unwrap_err().is_cache_miss());
    }
}

#[tokio::test(start_paused = true)]
async fn cached_entry_expires_after_ttl() {
    let cache = CacheManager::local_only(&CacheConfig::default());
    cache
        .set("feed", &vec![1, 2, 3], Duration::from_millis(50))
        .await
        .unwrap();

    assert_eq!(cache.get::<Vec<i32>>("feed").await.unwrap(), vec![1, 2, 3]);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        cache.get::<Vec<i32>>("feed").await,
        Err(AggregationError::CacheMiss { key: "feed".into() })
    );
}

#[test]
fn transformer_is_pure_and_order_independent() {
    let t = ResponseTransformer::new();
    let a: Record = serde_json::from_value(json!({ "id": 1, "name": "Ada", "role": "admin" }))
        .unwrap();
    let b: Record =
        serde_json::from_value(json!({ "name": "Grace", "team": "core" })).unwrap();

    assert_eq!(t.merge(&[&a, &b]), t.merge(&[&a, &b]));
    assert_eq!(t.merge(&[&a, &b])["name"], json!("Grace"));

    let picked_then_omitted = t.omit(&t.pick(&a, &["id", "name"]), &["role"]);
    let omitted_then_picked = t.pick(&t.omit(&a, &["role"]), &["id", "name"]);
    assert_eq!(picked_then_omitted, omitted_then_picked);
}
