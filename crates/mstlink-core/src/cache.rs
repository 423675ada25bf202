//! Short-TTL response cache shared across concurrently processed identifiers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::{Mst, SourceOutcome, SourceResult};
use crate::SourceId;

#[derive(Debug, Clone)]
struct CacheEntry {
    result: SourceResult,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<(SourceId, Mst), CacheEntry>,
    default_ttl: Duration,
}

impl CacheInner {
    fn new(default_ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            default_ttl,
        }
    }

    fn get(&self, source: SourceId, mst: &Mst) -> Option<SourceResult> {
        self.map.get(&(source, mst.clone())).and_then(|entry| {
            if Instant::now() <= entry.expires_at {
                Some(entry.result.clone())
            } else {
                None
            }
        })
    }

    fn put(&mut self, mst: Mst, result: SourceResult, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        let expires_at = Instant::now() + ttl;
        self.map
            .insert((result.source, mst), CacheEntry { result, expires_at });
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.expires_at > now);
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Thread-safe cache keyed by (source, normalized identifier).
///
/// Only `Success` and `NotFound` outcomes are stored; transient failures and
/// circuit rejections are never cached, so a temporary outage is not frozen
/// as if it were a real answer. Process-wide lifetime, cleared only by
/// [`ResponseCache::clear`] or restart.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl ResponseCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner::new(default_ttl))),
        }
    }

    /// Cache with the default 5 minute TTL.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300))
    }

    /// Disabled cache: every lookup misses, every insert is dropped.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn get(&self, source: SourceId, mst: &Mst) -> Option<SourceResult> {
        let store = self.inner.read().await;
        store.get(source, mst)
    }

    /// Insert a result under its source. Non-cacheable outcomes and inserts
    /// into a disabled cache are no-ops.
    pub async fn put(&self, mst: Mst, result: SourceResult, ttl_override: Option<Duration>) {
        if !matches!(
            result.outcome,
            SourceOutcome::Success | SourceOutcome::NotFound
        ) {
            return;
        }

        let mut store = self.inner.write().await;
        if store.default_ttl == Duration::ZERO {
            return;
        }
        store.put(mst, result, ttl_override);
    }

    pub async fn clear_expired(&self) {
        let mut store = self.inner.write().await;
        store.clear_expired();
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.clear();
    }

    /// Number of entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.len()
    }

    pub async fn is_disabled(&self) -> bool {
        let store = self.inner.read().await;
        store.default_ttl == Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldMap;

    fn mst(raw: &str) -> Mst {
        Mst::parse(raw).expect("valid identifier")
    }

    fn success(source: SourceId) -> SourceResult {
        let mut fields = FieldMap::new();
        fields.insert(String::from("company_name"), String::from("Acme Co"));
        SourceResult::success(source, fields, Duration::from_millis(10), 1)
    }

    #[tokio::test]
    async fn stores_and_returns_success_results() {
        let cache = ResponseCache::new(Duration::from_secs(1));
        let id = mst("0110198560");

        assert!(cache.get(SourceId::Registry, &id).await.is_none());
        cache
            .put(id.clone(), success(SourceId::Registry), None)
            .await;

        let hit = cache
            .get(SourceId::Registry, &id)
            .await
            .expect("entry present");
        assert_eq!(hit.outcome, SourceOutcome::Success);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_source() {
        let cache = ResponseCache::new(Duration::from_secs(1));
        let id = mst("0110198560");

        cache
            .put(id.clone(), success(SourceId::Registry), None)
            .await;
        assert!(cache.get(SourceId::Insurance, &id).await.is_none());
    }

    #[tokio::test]
    async fn never_stores_transient_failures_or_circuit_rejections() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let id = mst("0110198560");

        cache
            .put(
                id.clone(),
                SourceResult::transient_failure(
                    SourceId::Registry,
                    "timeout",
                    Duration::from_millis(5),
                    4,
                ),
                None,
            )
            .await;
        cache
            .put(id.clone(), SourceResult::circuit_open(SourceId::Insurance), None)
            .await;

        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn caches_not_found_as_a_real_answer() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let id = mst("0110198560");

        cache
            .put(
                id.clone(),
                SourceResult::not_found(SourceId::Insurance, Duration::from_millis(5), 1),
                None,
            )
            .await;

        let hit = cache
            .get(SourceId::Insurance, &id)
            .await
            .expect("entry present");
        assert_eq!(hit.outcome, SourceOutcome::NotFound);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::from_millis(50));
        let id = mst("0110198560");

        cache
            .put(id.clone(), success(SourceId::Registry), None)
            .await;
        assert!(cache.get(SourceId::Registry, &id).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(SourceId::Registry, &id).await.is_none());

        cache.clear_expired().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn ttl_override_beats_default() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let id = mst("0110198560");

        cache
            .put(
                id.clone(),
                success(SourceId::Registry),
                Some(Duration::from_millis(50)),
            )
            .await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(SourceId::Registry, &id).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_drops_inserts() {
        let cache = ResponseCache::disabled();
        let id = mst("0110198560");

        assert!(cache.is_disabled().await);
        cache
            .put(id.clone(), success(SourceId::Registry), None)
            .await;
        assert!(cache.get(SourceId::Registry, &id).await.is_none());
    }
}
