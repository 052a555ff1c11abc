//! Fast tier: bounded in-memory cache with a TTL per entry.
//!
//! Backed by moka's async-friendly cache. Each entry carries its own TTL
//! (set at insert time through a custom [`Expiry`] policy); entries without
//! an explicit TTL get [`CacheConfig::ttl`].
//!
//! Inserts keep the first value written for a key until it expires, so
//! racing write-throughs and backfills cannot swap a payload under a
//! reader.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use super::CacheTier;
use crate::types::CacheEntry;
use crate::{Fingerprint, Result};

/// Configuration for the fast tier.
///
/// ```rust
/// # use muninn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(50_000)
///     .ttl(Duration::from_secs(24 * 3600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// Default time-to-live for entries. Default: 7 days.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the default time-to-live for entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    ttl: Duration,
}

/// Expire each slot after its own TTL, counted from insertion.
struct PerEntryTtl;

impl Expiry<Fingerprint, Arc<Slot>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &Arc<Slot>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory fast tier.
pub struct FastCache {
    cache: Cache<Fingerprint, Arc<Slot>>,
    default_ttl: Duration,
}

impl FastCache {
    /// Create a fast tier with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            cache,
            default_ttl: config.ttl,
        }
    }

    /// Default TTL applied when `put` is called without one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Drop an entry.
    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.cache.invalidate(fingerprint).await;
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for FastCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheTier for FastCache {
    fn name(&self) -> &str {
        "fast"
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        Ok(self
            .cache
            .get(fingerprint)
            .await
            .map(|slot| slot.entry.clone()))
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        entry: &CacheEntry,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let slot = Arc::new(Slot {
            entry: entry.clone(),
            ttl: ttl.unwrap_or(self.default_ttl),
        });
        self.cache
            .entry_by_ref(fingerprint)
            .or_insert_with(async { slot })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationOutput;
    use serde_json::json;

    fn entry(fp: &Fingerprint, payload: serde_json::Value) -> CacheEntry {
        CacheEntry::new(
            fp.clone(),
            payload,
            &GenerationOutput::new(json!(null), "test-model"),
            Duration::from_millis(5),
        )
    }

    fn fp(n: u8) -> Fingerprint {
        Fingerprint::parse(&format!("{:064x}", n)).unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = FastCache::default();
        let key = fp(1);
        assert!(cache.get(&key).await.unwrap().is_none());

        cache.put(&key, &entry(&key, json!({"a": 1})), None).await.unwrap();
        let got = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(got.payload, json!({"a": 1}));
    }

    #[tokio::test]
    async fn second_put_keeps_first_payload() {
        let cache = FastCache::default();
        let key = fp(2);
        cache.put(&key, &entry(&key, json!("first")), None).await.unwrap();
        cache.put(&key, &entry(&key, json!("second")), None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().unwrap().payload, json!("first"));
    }

    #[tokio::test]
    async fn per_entry_ttl() {
        let cache = FastCache::default();
        let short = fp(3);
        let long = fp(4);
        cache
            .put(&short, &entry(&short, json!(1)), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        cache.put(&long, &entry(&long, json!(2)), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.get(&short).await.unwrap().is_none());
        assert!(cache.get(&long).await.unwrap().is_some());
    }
}
