//! Builder for configuring orchestrator instances

use std::sync::Arc;
use std::time::Duration;

use super::orchestrator::{Inner, Orchestrator, OrchestratorConfig};
use crate::cache::{CacheConfig, CacheTier, FastCache, FileDurableStore, MemoryDurableStore};
use crate::config::Config;
use crate::dedup::{ClaimStore, DedupConfig, DeduplicationCoordinator, MemoryClaimStore};
use crate::limiter::{CounterStore, MemoryCounterStore, RateLimitConfig, RateLimiter};
use crate::types::{OutputValidator, StructuralValidator};
use crate::{Fingerprinter, Generator, MuninnError, Result};

/// Main entry point for creating orchestrator instances.
pub struct Muninn;

impl Muninn {
    /// Create a new builder for configuring the orchestrator.
    pub fn builder() -> MuninnBuilder {
        MuninnBuilder::new()
    }
}

/// Builder for configuring orchestrator instances.
///
/// Only the generator is required. Stores default to in-process
/// implementations, which deduplicate and rate-limit within one process;
/// pass shared stores to extend that across instances.
pub struct MuninnBuilder {
    generator: Option<Arc<dyn Generator>>,
    fast: Option<Arc<dyn CacheTier>>,
    fast_config: CacheConfig,
    fast_ttl: Option<Duration>,
    durable: Option<Arc<dyn CacheTier>>,
    claims: Option<Arc<dyn ClaimStore>>,
    counters: Option<Arc<dyn CounterStore>>,
    fingerprinter: Fingerprinter,
    rate_limits: RateLimitConfig,
    dedup: DedupConfig,
    validator: Option<Arc<dyn OutputValidator>>,
    generation_timeout: Duration,
}

impl MuninnBuilder {
    pub fn new() -> Self {
        Self {
            generator: None,
            fast: None,
            fast_config: CacheConfig::default(),
            fast_ttl: None,
            durable: None,
            claims: None,
            counters: None,
            fingerprinter: Fingerprinter::new(),
            rate_limits: RateLimitConfig::default(),
            dedup: DedupConfig::default(),
            validator: None,
            generation_timeout: OrchestratorConfig::default().generation_timeout,
        }
    }

    /// Apply a loaded [`Config`].
    ///
    /// Opens the file-backed durable store when `[durable] path` is set.
    /// Stores and the generator set elsewhere on the builder are kept.
    pub fn config(mut self, config: &Config) -> Result<Self> {
        config.validate()?;
        self.fingerprinter = config.fingerprinter();
        self.fast_config = config.cache_config();
        self.dedup = config.dedup_config();
        self.rate_limits = config.rate_limit_config();
        self.generation_timeout = config.generation_timeout();
        self.validator = Some(Arc::new(config.validator()));
        if let Some(path) = &config.durable.path {
            self.durable = Some(Arc::new(FileDurableStore::open(path)?));
        }
        Ok(self)
    }

    /// Set the generator invoked on a cache miss (required).
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the in-process fast tier.
    pub fn fast_cache(mut self, tier: Arc<dyn CacheTier>) -> Self {
        self.fast = Some(tier);
        self
    }

    /// Size and TTL of the default fast tier.
    pub fn fast_cache_config(mut self, config: CacheConfig) -> Self {
        self.fast_config = config;
        self
    }

    /// TTL requested on every fast-tier write (default: the tier's own).
    pub fn fast_ttl(mut self, ttl: Duration) -> Self {
        self.fast_ttl = Some(ttl);
        self
    }

    /// Set the durable tier (default: in memory).
    pub fn durable_store(mut self, store: Arc<dyn CacheTier>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Set the claim store used for deduplication.
    pub fn claim_store(mut self, store: Arc<dyn ClaimStore>) -> Self {
        self.claims = Some(store);
        self
    }

    /// Set the counter store used for rate limiting.
    pub fn counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(store);
        self
    }

    /// Set how requests are canonicalized.
    pub fn fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn rate_limits(mut self, config: RateLimitConfig) -> Self {
        self.rate_limits = config;
        self
    }

    pub fn dedup(mut self, config: DedupConfig) -> Self {
        self.dedup = config;
        self
    }

    /// Set the output validator (default: [`StructuralValidator`] with no
    /// required collections).
    pub fn validator(mut self, validator: Arc<dyn OutputValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the generator timeout (default: 60s).
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<Orchestrator> {
        let generator = self
            .generator
            .ok_or_else(|| MuninnError::Configuration("no generator configured".into()))?;
        self.rate_limits.validate()?;
        self.dedup.validate()?;
        if self.generation_timeout.is_zero() {
            return Err(MuninnError::Configuration(
                "generation timeout must be non-zero".into(),
            ));
        }

        let fast = self
            .fast
            .unwrap_or_else(|| Arc::new(FastCache::new(&self.fast_config)));
        let durable = self
            .durable
            .unwrap_or_else(|| Arc::new(MemoryDurableStore::new()));
        let claims = self
            .claims
            .unwrap_or_else(|| Arc::new(MemoryClaimStore::new()));
        let counters = self
            .counters
            .unwrap_or_else(|| Arc::new(MemoryCounterStore::new()));
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(StructuralValidator::new()));

        tracing::debug!(
            generator = generator.name(),
            fast = fast.name(),
            durable = durable.name(),
            claims = claims.name(),
            counters = counters.name(),
            "building orchestrator"
        );

        let dedup =
            DeduplicationCoordinator::new(claims, Arc::clone(&fast), Arc::clone(&durable), self.dedup);
        Ok(Orchestrator::new(Inner {
            limiter: RateLimiter::new(self.rate_limits, counters),
            fingerprinter: self.fingerprinter,
            fast,
            durable,
            dedup,
            generator,
            validator,
            config: OrchestratorConfig {
                fast_ttl: self.fast_ttl,
                generation_timeout: self.generation_timeout,
            },
        }))
    }
}

impl Default for MuninnBuilder {
    fn default() -> Self {
        Self::new()
    }
}
