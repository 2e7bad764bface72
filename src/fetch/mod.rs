//! Cache-Aware Fetch Wrapper
//!
//! Sits in front of every external call:
//!
//! 1. Derive the key from operation + parameters
//! 2. Serve a live cached value when one exists
//! 3. Otherwise run the operation under a timeout and retry policy
//! 4. Cache successes with the type's TTL
//! 5. Turn failures into an empty value tagged [`FetchOrigin::Failed`]
//!
//! Concurrent fetches of one key are single-flighted: the second caller waits
//! for the first and then reads its cached result. A panicking operation is
//! caught here and reported like any other failure.

pub mod timeout;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, CacheType, CacheWrite};
use crate::config::FetchConfig;
use crate::constants::network;
use crate::types::error::panic_message;
use crate::types::{ErrorCategory, LensError, Result};

pub use timeout::with_timeout;

// =============================================================================
// Request / Result
// =============================================================================

/// A single cacheable external call
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub operation: String,
    pub params: Value,
    pub cache_type: CacheType,
    pub ttl: Option<Duration>,
    pub query: Option<String>,
    pub metadata: Option<Value>,
}

impl FetchRequest {
    pub fn new(operation: impl Into<String>, params: Value, cache_type: CacheType) -> Self {
        Self {
            operation: operation.into(),
            params,
            cache_type,
            ttl: None,
            query: None,
            metadata: None,
        }
    }

    pub fn for_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn key(&self) -> String {
        CacheStore::make_key(&self.operation, &self.params)
    }
}

/// Where a fetched value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOrigin {
    Cache,
    Fresh,
    /// Every attempt failed; the value is empty
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub origin: FetchOrigin,
    /// External calls issued for this fetch (0 on a cache hit)
    pub attempts: u32,
}

impl<T> Fetched<T> {
    pub fn from_cache(&self) -> bool {
        self.origin == FetchOrigin::Cache
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.origin {
            FetchOrigin::Failed(message) => Some(message),
            _ => None,
        }
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Timeout and retry settings applied to every miss
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Upper bound for one fetch, retries included
    pub timeout: Duration,
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl FetchPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_secs(network::RETRY_MAX_DELAY_SECS),
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

// =============================================================================
// Fetcher
// =============================================================================

pub struct CachedFetcher {
    cache: Arc<CacheStore>,
    policy: FetchPolicy,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl CachedFetcher {
    pub fn new(cache: Arc<CacheStore>, policy: FetchPolicy) -> Self {
        Self {
            cache,
            policy,
            inflight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Serve `request` from cache or run `op`; never fails
    pub async fn fetch<T, F, Fut>(&self, request: FetchRequest, op: F) -> Fetched<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = request.key();
        let slot = InflightSlot::claim(&self.inflight, &key);
        let _held = slot.lock.lock().await;
        self.fetch_locked(&key, &request, op).await
    }

    async fn fetch_locked<T, F, Fut>(&self, key: &str, request: &FetchRequest, mut op: F) -> Fetched<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.cache.get::<T>(key, Some(request.cache_type)) {
            debug!(operation = %request.operation, "Served from cache");
            return Fetched {
                value,
                origin: FetchOrigin::Cache,
                attempts: 0,
            };
        }

        let attempts = AtomicU32::new(0);
        let operation = request.operation.as_str();

        let call = (|| {
            attempts.fetch_add(1, Ordering::Relaxed);
            op()
        })
        .retry(self.policy.backoff())
        .when(|e: &LensError| e.is_recoverable())
        .notify(|e: &LensError, delay: Duration| {
            warn!(operation, error = %e, ?delay, "Retrying external call");
        });

        let result = match AssertUnwindSafe(with_timeout(self.policy.timeout, call, operation))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(LensError::source(
                operation,
                ErrorCategory::Unknown,
                format!("panicked: {}", panic_message(panic.as_ref())),
            )),
        };
        let attempts = attempts.load(Ordering::Relaxed);

        match result {
            Ok(value) => {
                let write = CacheWrite {
                    ttl: request.ttl,
                    query: request.query.clone(),
                    metadata: request.metadata.clone(),
                };
                self.cache.set(key, &value, request.cache_type, write);
                info!(operation, attempts, "Fetched fresh data");
                Fetched {
                    value,
                    origin: FetchOrigin::Fresh,
                    attempts,
                }
            }
            Err(e) => {
                warn!(operation, attempts, error = %e, "External call failed");
                Fetched {
                    value: T::default(),
                    origin: FetchOrigin::Failed(e.to_string()),
                    attempts,
                }
            }
        }
    }
}

/// Per-key lock handle; releases the map entry on drop, cancellation included
struct InflightSlot<'a> {
    map: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
    lock: Arc<Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn claim(map: &'a DashMap<String, Arc<Mutex<()>>>, key: &'a str) -> Self {
        let lock = map.entry(key.to_string()).or_default().clone();
        Self { map, key, lock }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // The map's own handle plus ours means nobody else is waiting
        self.map
            .remove_if(self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCategory;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn fast_policy() -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn fetcher() -> CachedFetcher {
        CachedFetcher::new(Arc::new(CacheStore::in_memory().unwrap()), fast_policy())
    }

    fn request(query: &str) -> FetchRequest {
        FetchRequest::new("web_search", json!({"query": query}), CacheType::WebSearch)
            .for_query(query)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let fetcher = fetcher();
        let calls = AtomicUsize::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["a".to_string(), "b".to_string()])
        };

        let first: Fetched<Vec<String>> = fetcher.fetch(request("crm"), op).await;
        assert_eq!(first.origin, FetchOrigin::Fresh);
        assert_eq!(first.attempts, 1);

        let second: Fetched<Vec<String>> = fetcher.fetch(request("crm"), op).await;
        assert!(second.from_cache());
        assert_eq!(second.value, first.value);
        assert_eq!(second.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let entry = fetcher.cache().entry(&request("crm").key()).unwrap();
        assert_eq!(entry.query.as_deref(), Some("crm"));
    }

    #[tokio::test]
    async fn test_prepopulated_entry_serves_until_expiry() {
        let clock = Arc::new(crate::cache::ManualClock::new(1_700_000_000_000));
        let cache = Arc::new(
            CacheStore::in_memory()
                .unwrap()
                .with_clock(clock.clone()),
        );
        let fetcher = CachedFetcher::new(cache.clone(), fast_policy());
        let week = Duration::from_secs(168 * 3600);

        assert!(cache.set(
            &request("x").key(),
            &vec!["cached".to_string()],
            CacheType::WebSearch,
            CacheWrite::for_query("x").with_ttl(week),
        ));

        let calls = AtomicUsize::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["fresh".to_string()])
        };

        clock.advance(week - Duration::from_secs(1));
        let hit: Fetched<Vec<String>> = fetcher.fetch(request("x"), op).await;
        assert_eq!(hit.value, ["cached"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_secs(2));
        let miss: Fetched<Vec<String>> = fetcher.fetch(request("x"), op).await;
        assert_eq!(miss.value, ["fresh"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_call() {
        let fetcher = fetcher();
        let calls = AtomicUsize::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!({"organic": ["x"]}))
        };

        let (a, b): (Fetched<Value>, Fetched<Value>) = tokio::join!(
            fetcher.fetch(request("same"), op),
            fetcher.fetch(request("same"), op)
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.value, b.value);
        let origins = [a.origin, b.origin];
        assert!(origins.contains(&FetchOrigin::Fresh));
        assert!(origins.contains(&FetchOrigin::Cache));
        assert!(fetcher.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_recoverable_errors_are_retried() {
        let fetcher = fetcher();
        let calls = AtomicUsize::new(0);
        let op = || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LensError::source("web_search", ErrorCategory::Transient, "503"))
            } else {
                Ok(7u32)
            }
        };

        let fetched = fetcher.fetch(request("retry"), op).await;
        assert_eq!(fetched.origin, FetchOrigin::Fresh);
        assert_eq!(fetched.value, 7);
        assert_eq!(fetched.attempts, 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_returns_empty_and_is_not_cached() {
        let fetcher = fetcher();
        let calls = AtomicUsize::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<Vec<String>, _>(LensError::source_unavailable(
                "web_search",
                "SERPER_API_KEY not set",
            ))
        };

        let fetched = fetcher.fetch(request("fail"), op).await;
        assert!(fetched.value.is_empty());
        assert_eq!(fetched.attempts, 1);
        assert!(fetched.failure().unwrap().contains("SERPER_API_KEY"));

        let again = fetcher.fetch(request("fail"), op).await;
        assert!(again.failure().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let fetcher = CachedFetcher::new(
            Arc::new(CacheStore::in_memory().unwrap()),
            FetchPolicy {
                timeout: Duration::from_millis(20),
                max_retries: 0,
                ..fast_policy()
            },
        );

        let fetched: Fetched<Value> = fetcher
            .fetch(request("slow"), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!(1))
            })
            .await;

        assert_eq!(fetched.value, Value::Null);
        assert!(fetched.failure().unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn test_panicking_operation_becomes_failure() {
        let fetcher = fetcher();
        let fetched: Fetched<Vec<String>> = fetcher
            .fetch(request("boom"), || async {
                let empty: Vec<String> = Vec::new();
                Ok(vec![empty[0].clone()])
            })
            .await;

        assert!(fetched.value.is_empty());
        assert_eq!(fetched.attempts, 1);
        assert!(fetched.failure().unwrap().contains("panicked"));
        assert!(fetcher.cache().entry(&request("boom").key()).is_none());
        assert!(fetcher.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_releases_its_slot() {
        let fetcher = fetcher();
        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            fetcher.fetch(request("abandoned"), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!(1))
            }),
        )
        .await;

        assert!(cancelled.is_err());
        assert!(fetcher.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_broken_cache_still_fetches() {
        let fetcher = fetcher();
        fetcher
            .cache()
            .database()
            .connection()
            .unwrap()
            .execute_batch("DROP TABLE cache_entries")
            .unwrap();

        let calls = AtomicUsize::new(0);
        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("fresh".to_string())
        };

        let first = fetcher.fetch(request("q"), op).await;
        let second = fetcher.fetch(request("q"), op).await;
        assert_eq!(first.origin, FetchOrigin::Fresh);
        assert_eq!(second.origin, FetchOrigin::Fresh);
        assert_eq!(second.value, "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
