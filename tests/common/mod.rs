//! Shared fixtures for integration tests

#![allow(dead_code)]

use bffgen_aggregation::batching::{batch_fn, BatchFn};
use bffgen_aggregation::config::CacheConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bffgen_aggregation=debug")
        .with_test_writer()
        .try_init();
}

/// Batch function resolving every id to a `User`, counting invocations
pub fn user_loader(calls: Arc<AtomicUsize>) -> BatchFn<User> {
    batch_fn(move |ids: Vec<String>| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .into_iter()
                .map(|id| {
                    let user = User {
                        name: format!("user-{id}"),
                        id: id.clone(),
                    };
                    (id, user)
                })
                .collect())
        }
    })
}

/// Config pointing at a port nothing listens on
pub fn unreachable_cache_config() -> CacheConfig {
    CacheConfig {
        redis_url: Some("redis://127.0.0.1:1".to_string()),
        connect_timeout_ms: 200,
        ..CacheConfig::default()
    }
}
