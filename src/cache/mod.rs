//! Two-tier result cache.
//!
//! Both tiers implement [`CacheTier`]:
//!
//! - [`FastCache`]: low-latency, in-process, bounded, with a TTL per
//!   entry. The TTL is the only staleness control: results are never
//!   invalidated when source data changes.
//!
//! - [`MemoryDurableStore`] / [`FileDurableStore`]: the system of record.
//!   No TTL; every read that hits bumps `hit_count` transactionally.
//!
//! Store failures surface as [`MuninnError::StoreUnavailable`]. The
//! orchestrator treats a failed read as a miss and a failed write as a
//! warning, so a flaky tier degrades latency but never fails a request.
//!
//! Entries are insert-once per fingerprint: a second `put` for a key that
//! is already present leaves the stored payload untouched.

pub mod durable;
pub mod fast;

pub use durable::{FileDurableStore, MemoryDurableStore};
pub use fast::{CacheConfig, FastCache};

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::types::CacheEntry;
use crate::{Fingerprint, MuninnError, Result, telemetry};

/// One lookup tier.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Tier name for logging and metrics.
    fn name(&self) -> &str;

    /// Look up an entry. `Ok(None)` is a miss.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    /// Store an entry. `ttl` is honoured by tiers that expire entries and
    /// ignored by the rest; `None` means the tier default.
    async fn put(
        &self,
        fingerprint: &Fingerprint,
        entry: &CacheEntry,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Count a hit served from another tier.
    ///
    /// Default: no-op, for tiers that keep no usage counters.
    async fn record_hit(&self, _fingerprint: &Fingerprint) -> Result<()> {
        Ok(())
    }
}

/// Read from a tier, treating store failures as misses.
///
/// Emits hit/miss/error metrics labelled with the tier name.
pub(crate) async fn read_through(
    tier: &dyn CacheTier,
    fingerprint: &Fingerprint,
) -> Option<CacheEntry> {
    match tier.get(fingerprint).await {
        Ok(Some(entry)) => {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => tier.name().to_owned())
                .increment(1);
            debug!(tier = tier.name(), %fingerprint, "cache hit");
            Some(entry)
        }
        Ok(None) => {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "tier" => tier.name().to_owned())
                .increment(1);
            None
        }
        Err(e) => {
            store_failed(tier.name(), "get", &e);
            None
        }
    }
}

/// Second read of a tier after the request already missed it.
///
/// Counts hits but not misses, so each request records at most one miss
/// per tier.
pub(crate) async fn reread(tier: &dyn CacheTier, fingerprint: &Fingerprint) -> Option<CacheEntry> {
    match tier.get(fingerprint).await {
        Ok(Some(entry)) => {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => tier.name().to_owned())
                .increment(1);
            debug!(tier = tier.name(), %fingerprint, "cache hit on re-read");
            Some(entry)
        }
        Ok(None) => None,
        Err(e) => {
            store_failed(tier.name(), "get", &e);
            None
        }
    }
}

/// Write to a tier, logging and swallowing store failures.
pub(crate) async fn write_best_effort(
    tier: &dyn CacheTier,
    fingerprint: &Fingerprint,
    entry: &CacheEntry,
    ttl: Option<Duration>,
) -> bool {
    match tier.put(fingerprint, entry, ttl).await {
        Ok(()) => true,
        Err(e) => {
            store_failed(tier.name(), "put", &e);
            false
        }
    }
}

pub(crate) fn store_failed(store: &str, operation: &'static str, err: &MuninnError) {
    metrics::counter!(telemetry::STORE_ERRORS_TOTAL,
        "store" => store.to_owned(),
        "operation" => operation,
    )
    .increment(1);
    warn!(store, operation, error = %err, "store operation failed, continuing");
}
