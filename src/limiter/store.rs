//! Rate-limit counter storage.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;

use crate::Result;

/// Shared store of per-window request counters.
///
/// `increment` must be atomic across every process sharing the store
/// (Redis `INCRBY` + `PEXPIRE`, or an upsert in SQL).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Store name for logging and metrics.
    fn name(&self) -> &str;

    /// Add `weight` to the counter at `key` and return the new value.
    ///
    /// A counter created by this call lives for `ttl`.
    async fn increment(&self, key: &str, weight: u64, ttl: Duration) -> Result<u64>;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    ttl: Duration,
}

/// Counters expire `ttl` after creation; increments keep the deadline.
struct WindowTtl;

impl Expiry<String, Counter> for WindowTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Counter,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        _value: &Counter,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        duration_until_expiry
    }
}

/// In-process counter store backed by moka.
///
/// Bounded so a flood of distinct identities cannot grow memory without
/// limit; evicting a live counter under that pressure resets it, which errs
/// toward allowing requests.
pub struct MemoryCounterStore {
    counters: Cache<String, Counter>,
}

impl MemoryCounterStore {
    /// Default capacity: 100,000 live counters.
    pub fn new() -> Self {
        Self::with_max_entries(100_000)
    }

    pub fn with_max_entries(max: u64) -> Self {
        Self {
            counters: Cache::builder()
                .max_capacity(max)
                .expire_after(WindowTtl)
                .build(),
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn increment(&self, key: &str, weight: u64, ttl: Duration) -> Result<u64> {
        let entry = self
            .counters
            .entry_by_ref(key)
            .and_upsert_with(|existing| {
                let count = existing.map(|e| e.into_value().count).unwrap_or(0);
                Counter {
                    count: count.saturating_add(weight),
                    ttl,
                }
            });
        Ok(entry.into_value().count)
    }
}
