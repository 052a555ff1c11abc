//! In-flight request deduplication.
//!
//! Concurrent requests for the same fingerprint collapse into a single
//! generation. The first request to miss both cache tiers takes a
//! short-lived claim on the fingerprint; everyone else polls the cache
//! tiers until the claim owner has written its result through.
//!
//! Per fingerprint: `Unclaimed → Claimed → Unclaimed` (on release or TTL
//! expiry). The wait is bounded by [`DedupConfig::max_wait`], which is kept
//! shorter than [`DedupConfig::claim_ttl`] so a waiter gives up before it
//! could mistake a slow owner for an abandoned one. A waiter that gives up
//! generates on its own, accepting the duplicate cost over failing the
//! caller. There is no lease heartbeat: an owner that outlives its claim
//! TTL can race a newcomer.

mod store;

pub use store::{ClaimStore, InFlightClaim, MemoryClaimStore};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::CacheTier;
use crate::types::{CacheEntry, Source};
use crate::{Fingerprint, MuninnError, Result, telemetry};

/// Timing of the claim protocol.
///
/// ```rust
/// # use muninn::DedupConfig;
/// # use std::time::Duration;
/// let config = DedupConfig::new()
///     .claim_ttl(Duration::from_secs(8))
///     .max_wait(Duration::from_secs(7));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Lifetime of a claim. Default: 10s.
    pub claim_ttl: Duration,
    /// Interval between cache polls while waiting. Default: 100ms.
    pub poll_interval: Duration,
    /// Longest a waiter polls before generating itself. Default: 9s.
    pub max_wait: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            claim_ttl: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(9),
        }
    }
}

impl DedupConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the claim lifetime.
    pub fn claim_ttl(mut self, ttl: Duration) -> Self {
        self.claim_ttl = ttl;
        self
    }

    /// Set the poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum wait.
    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Reject timings that break the protocol.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(MuninnError::Configuration(
                "dedup poll interval must be non-zero".into(),
            ));
        }
        if self.max_wait >= self.claim_ttl {
            return Err(MuninnError::Configuration(format!(
                "dedup max wait ({:?}) must be shorter than the claim TTL ({:?})",
                self.max_wait, self.claim_ttl
            )));
        }
        Ok(())
    }
}

/// Result of [`DeduplicationCoordinator::try_claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller now owns generation for the fingerprint.
    Claimed(InFlightClaim),
    /// Someone else holds a live claim.
    AlreadyClaimed,
}

/// Result of [`DeduplicationCoordinator::await_result`].
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The claim owner's result showed up in a cache tier.
    Ready {
        entry: CacheEntry,
        tier: Source,
        waited: Duration,
    },
    /// The claim disappeared without a result (the owner failed).
    Abandoned { waited: Duration },
    /// `max_wait` elapsed first.
    TimedOut { waited: Duration },
}

/// Coordinates claims and waits for one pair of cache tiers.
pub struct DeduplicationCoordinator {
    claims: Arc<dyn ClaimStore>,
    fast: Arc<dyn CacheTier>,
    durable: Arc<dyn CacheTier>,
    config: DedupConfig,
}

impl DeduplicationCoordinator {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        fast: Arc<dyn CacheTier>,
        durable: Arc<dyn CacheTier>,
        config: DedupConfig,
    ) -> Self {
        Self {
            claims,
            fast,
            durable,
            config,
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Atomically claim generation for `fingerprint`.
    pub async fn try_claim(&self, fingerprint: &Fingerprint) -> Result<ClaimOutcome> {
        let claim = InFlightClaim::new(fingerprint.clone(), self.config.claim_ttl);
        if self.claims.set_if_absent(&claim).await? {
            debug!(%fingerprint, expires_at = %claim.expires_at, "claim acquired");
            Ok(ClaimOutcome::Claimed(claim))
        } else {
            Ok(ClaimOutcome::AlreadyClaimed)
        }
    }

    /// Wrap an acquired claim in a guard that releases it on drop.
    pub fn guard(&self, claim: InFlightClaim) -> ClaimGuard {
        ClaimGuard {
            claims: Arc::clone(&self.claims),
            fingerprint: Some(claim.fingerprint),
        }
    }

    /// Delete the claim for `fingerprint` unconditionally.
    ///
    /// Failures are logged; the claim then lapses at its TTL.
    pub async fn release(&self, fingerprint: &Fingerprint) {
        release_claim(self.claims.as_ref(), fingerprint).await;
    }

    /// Wait for another request's result using the configured timings.
    pub async fn await_default(&self, fingerprint: &Fingerprint) -> WaitOutcome {
        self.await_result(fingerprint, self.config.poll_interval, self.config.max_wait)
            .await
    }

    /// Poll both cache tiers every `poll_interval` until the result for
    /// `fingerprint` appears, its claim vanishes, or `max_wait` elapses.
    ///
    /// Store failures during polling count as misses.
    pub async fn await_result(
        &self,
        fingerprint: &Fingerprint,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> WaitOutcome {
        let started = Instant::now();
        let deadline = started + max_wait;
        let poll_interval = poll_interval.max(Duration::from_millis(1));

        loop {
            if let Some((entry, tier)) = self.poll(fingerprint).await {
                return self.finish(WaitOutcome::Ready {
                    entry,
                    tier,
                    waited: started.elapsed(),
                });
            }

            match self.claims.get(fingerprint).await {
                Ok(None) => {
                    // The owner may have written and released between the
                    // two reads above.
                    if let Some((entry, tier)) = self.poll(fingerprint).await {
                        return self.finish(WaitOutcome::Ready {
                            entry,
                            tier,
                            waited: started.elapsed(),
                        });
                    }
                    return self.finish(WaitOutcome::Abandoned {
                        waited: started.elapsed(),
                    });
                }
                Ok(Some(_)) => {}
                Err(e) => debug!(%fingerprint, error = %e, "claim lookup failed while waiting"),
            }

            let now = Instant::now();
            if now >= deadline {
                return self.finish(WaitOutcome::TimedOut {
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    async fn poll(&self, fingerprint: &Fingerprint) -> Option<(CacheEntry, Source)> {
        for (tier, source) in [(&self.fast, Source::Fast), (&self.durable, Source::Durable)] {
            match tier.get(fingerprint).await {
                Ok(Some(entry)) => return Some((entry, source)),
                Ok(None) => {}
                Err(e) => debug!(tier = tier.name(), error = %e, "poll read failed"),
            }
        }
        None
    }

    fn finish(&self, outcome: WaitOutcome) -> WaitOutcome {
        let label = match &outcome {
            WaitOutcome::Ready { .. } => "ready",
            WaitOutcome::Abandoned { .. } => "abandoned",
            WaitOutcome::TimedOut { .. } => "timed_out",
        };
        metrics::counter!(telemetry::DEDUP_WAITS_TOTAL, "outcome" => label).increment(1);
        outcome
    }
}

async fn release_claim(claims: &dyn ClaimStore, fingerprint: &Fingerprint) {
    match claims.remove(fingerprint).await {
        Ok(()) => debug!(%fingerprint, "claim released"),
        Err(e) => {
            crate::cache::store_failed(claims.name(), "release", &e);
        }
    }
}

/// Owns a claim for the duration of one generation.
///
/// Call [`release`](Self::release) when done. If the guard is dropped
/// without that (the owning task panicked or was aborted), the claim is
/// released from a spawned task instead of lingering until its TTL.
pub struct ClaimGuard {
    claims: Arc<dyn ClaimStore>,
    fingerprint: Option<Fingerprint>,
}

impl ClaimGuard {
    /// Release the claim.
    pub async fn release(mut self) {
        if let Some(fingerprint) = self.fingerprint.take() {
            release_claim(self.claims.as_ref(), &fingerprint).await;
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let Some(fingerprint) = self.fingerprint.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let claims = Arc::clone(&self.claims);
                handle.spawn(async move {
                    release_claim(claims.as_ref(), &fingerprint).await;
                });
            }
            Err(_) => warn!(%fingerprint, "claim dropped outside a runtime, left to expire"),
        }
    }
}
