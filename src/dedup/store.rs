//! Claim storage.
//!
//! A [`ClaimStore`] is the shared-store primitive behind deduplication: an
//! atomic "set if not present" with a TTL. A Redis `SET NX PX` or a
//! conditional insert into a SQL table both satisfy the contract; the
//! in-process [`MemoryClaimStore`] does it with moka's atomic entry API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use moka::Expiry;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::{Fingerprint, Result};

/// An active generation attempt for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightClaim {
    pub fingerprint: Fingerprint,
    pub claimed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl InFlightClaim {
    /// A claim starting now and lasting `ttl`.
    pub fn new(fingerprint: Fingerprint, ttl: Duration) -> Self {
        let claimed_at = Utc::now();
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        Self {
            fingerprint,
            claimed_at,
            expires_at: claimed_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whether the claim still holds at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Shared store of in-flight claims.
///
/// Implementations must make [`set_if_absent`](Self::set_if_absent) atomic
/// across every process sharing the store: of any number of concurrent
/// calls for one fingerprint, at most one may return `true` while its claim
/// is live.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Store name for logging and metrics.
    fn name(&self) -> &str;

    /// Insert `claim` unless a live claim exists for its fingerprint.
    ///
    /// Expired claims count as absent. Returns whether the claim was stored.
    async fn set_if_absent(&self, claim: &InFlightClaim) -> Result<bool>;

    /// Delete the claim for `fingerprint`, whoever holds it.
    async fn remove(&self, fingerprint: &Fingerprint) -> Result<()>;

    /// The live claim for `fingerprint`, if any.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<InFlightClaim>>;
}

/// Longest expiry handed to moka; claims beyond it are evicted early.
const MAX_CLAIM_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Claims expire at their own `expires_at`.
struct ClaimExpiry;

impl ClaimExpiry {
    fn remaining(claim: &InFlightClaim) -> Duration {
        (claim.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(MAX_CLAIM_LIFETIME)
    }
}

impl Expiry<Fingerprint, InFlightClaim> for ClaimExpiry {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &InFlightClaim,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(Self::remaining(value))
    }
}

/// In-process claim store backed by moka.
pub struct MemoryClaimStore {
    claims: Cache<Fingerprint, InFlightClaim>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self {
            claims: Cache::builder().expire_after(ClaimExpiry).build(),
        }
    }

    /// Number of live claims.
    pub fn live_count(&self) -> usize {
        let now = Utc::now();
        self.claims
            .iter()
            .filter(|(_, claim)| claim.is_live_at(now))
            .count()
    }
}

impl Default for MemoryClaimStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set_if_absent(&self, claim: &InFlightClaim) -> Result<bool> {
        let entry = self
            .claims
            .entry_by_ref(&claim.fingerprint)
            .or_insert_with(async { claim.clone() })
            .await;
        Ok(entry.is_fresh())
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.claims.invalidate(fingerprint).await;
        Ok(())
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<InFlightClaim>> {
        let now = Utc::now();
        Ok(self
            .claims
            .get(fingerprint)
            .await
            .filter(|claim| claim.is_live_at(now)))
    }
}
