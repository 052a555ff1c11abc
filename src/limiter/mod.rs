//! Identity-scoped fixed-window rate limiting.
//!
//! Each caller gets a counter per `(tier, identity, window)`. Windows are
//! aligned to the Unix epoch (`window_start = now - now % window`), so every
//! instance sharing a [`CounterStore`] agrees on where windows begin
//! without coordinating.
//!
//! Every check increments the counter, rejected or not. The request that
//! pushes a counter past its limit is rejected, and so is every later one
//! in that window; the overshoot is harmless because the counter resets
//! with the window.
//!
//! When the counter store fails, [`StoreFailurePolicy`] decides: fail open
//! (allow, keep serving) or fail closed (reject, keep the guarantee).

mod store;

pub use store::{CounterStore, MemoryCounterStore};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{Caller, Tier};
use crate::{MuninnError, Result, telemetry};

/// Limit for one caller tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimit {
    /// Requests allowed per window.
    pub limit: u64,
    /// Window length.
    pub window: Duration,
}

impl TierLimit {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    /// `limit` requests per hour.
    pub fn per_hour(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(3600))
    }
}

/// What to do when the counter store is unreachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    /// Allow the request (availability over limiting).
    #[default]
    Open,
    /// Reject the request (limiting over availability).
    Closed,
}

/// Rate limiter configuration.
///
/// ```rust
/// # use muninn::{RateLimitConfig, StoreFailurePolicy, TierLimit};
/// let config = RateLimitConfig::new()
///     .anonymous(TierLimit::per_hour(5))
///     .authenticated(TierLimit::per_hour(500))
///     .on_store_failure(StoreFailurePolicy::Closed);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Limit for anonymous callers. Default: 10 per hour.
    pub anonymous: TierLimit,
    /// Limit for authenticated callers. Default: 100 per hour.
    pub authenticated: TierLimit,
    /// Behaviour on counter store failure. Default: fail open.
    pub on_store_failure: StoreFailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            anonymous: TierLimit::per_hour(10),
            authenticated: TierLimit::per_hour(100),
            on_store_failure: StoreFailurePolicy::Open,
        }
    }
}

impl RateLimitConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the anonymous tier limit.
    pub fn anonymous(mut self, limit: TierLimit) -> Self {
        self.anonymous = limit;
        self
    }

    /// Set the authenticated tier limit.
    pub fn authenticated(mut self, limit: TierLimit) -> Self {
        self.authenticated = limit;
        self
    }

    /// Set the store failure policy.
    pub fn on_store_failure(mut self, policy: StoreFailurePolicy) -> Self {
        self.on_store_failure = policy;
        self
    }

    /// Limit for a tier.
    pub fn limit_for(&self, tier: Tier) -> TierLimit {
        match tier {
            Tier::Anonymous => self.anonymous,
            Tier::Authenticated => self.authenticated,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for tier in [Tier::Anonymous, Tier::Authenticated] {
            if self.limit_for(tier).window.as_millis() == 0 {
                return Err(MuninnError::Configuration(format!(
                    "rate limit window for {} callers must be at least 1ms",
                    tier.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Limit state reported alongside every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    /// End of the current window.
    pub reset_at: DateTime<Utc>,
}

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed(RateLimitInfo),
    Rejected {
        info: RateLimitInfo,
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed(_))
    }

    pub fn info(&self) -> &RateLimitInfo {
        match self {
            RateDecision::Allowed(info) | RateDecision::Rejected { info, .. } => info,
        }
    }

    /// Convert into a `Result`, mapping rejection to [`MuninnError::RateLimited`].
    pub fn into_result(self) -> Result<RateLimitInfo> {
        match self {
            RateDecision::Allowed(info) => Ok(info),
            RateDecision::Rejected { info, retry_after } => {
                Err(MuninnError::RateLimited { info, retry_after })
            }
        }
    }
}

/// Fixed-window limiter over a shared [`CounterStore`].
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request of `weight` units against the caller's current window.
    pub async fn check(&self, caller: &Caller, weight: u32) -> RateDecision {
        self.check_at(caller, weight, Utc::now()).await
    }

    async fn check_at(&self, caller: &Caller, weight: u32, now: DateTime<Utc>) -> RateDecision {
        let tier = caller.tier();
        let TierLimit { limit, window } = self.config.limit_for(tier);
        let window_ms = (window.as_millis() as i64).max(1);
        let now_ms = now.timestamp_millis();
        let start_ms = now_ms - now_ms.rem_euclid(window_ms);
        let reset_at = DateTime::<Utc>::from_timestamp_millis(start_ms + window_ms)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let retry_after = (reset_at - now).to_std().unwrap_or(Duration::ZERO);

        let key = format!("{}:{}:{}", tier.as_str(), caller.identity, start_ms);
        let count = match self.store.increment(&key, u64::from(weight), window).await {
            Ok(count) => count,
            Err(e) => {
                crate::cache::store_failed(self.store.name(), "increment", &e);
                let info = RateLimitInfo {
                    limit,
                    remaining: limit,
                    reset_at,
                };
                return match self.config.on_store_failure {
                    StoreFailurePolicy::Open => RateDecision::Allowed(info),
                    StoreFailurePolicy::Closed => {
                        self.rejected(tier, RateLimitInfo { remaining: 0, ..info }, retry_after)
                    }
                };
            }
        };

        let info = RateLimitInfo {
            limit,
            remaining: limit.saturating_sub(count),
            reset_at,
        };
        if count > limit {
            warn!(
                tier = tier.as_str(),
                identity = %caller.identity,
                count,
                limit,
                retry_after_ms = retry_after.as_millis() as u64,
                "rate limit exceeded"
            );
            self.rejected(tier, info, retry_after)
        } else {
            RateDecision::Allowed(info)
        }
    }

    fn rejected(&self, tier: Tier, info: RateLimitInfo, retry_after: Duration) -> RateDecision {
        metrics::counter!(telemetry::RATE_LIMITED_TOTAL, "tier" => tier.as_str()).increment(1);
        RateDecision::Rejected { info, retry_after }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn limiter(limit: u64, window: Duration) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig::new().anonymous(TierLimit::new(limit, window)),
            Arc::new(MemoryCounterStore::new()),
        )
    }

    #[tokio::test]
    async fn window_is_epoch_aligned() {
        let limiter = limiter(3, Duration::from_secs(3600));
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 17, 42).unwrap();
        let decision = limiter.check_at(&Caller::anonymous("1.2.3.4"), 1, now).await;
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap();
        assert_eq!(decision.info().reset_at, expected);
        assert_eq!(decision.info().remaining, 2);
    }

    #[tokio::test]
    async fn next_window_starts_fresh() {
        let limiter = limiter(1, Duration::from_secs(60));
        let caller = Caller::anonymous("ip");
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 5).unwrap();
        assert!(limiter.check_at(&caller, 1, t0).await.is_allowed());
        assert!(!limiter.check_at(&caller, 1, t0).await.is_allowed());

        let t1 = t0 + TimeDelta::seconds(60);
        assert!(limiter.check_at(&caller, 1, t1).await.is_allowed());
    }

    #[tokio::test]
    async fn weight_counts_against_limit() {
        let limiter = limiter(5, Duration::from_secs(60));
        let caller = Caller::anonymous("ip");
        assert!(limiter.check(&caller, 5).await.is_allowed());
        assert!(!limiter.check(&caller, 1).await.is_allowed());
    }

    #[test]
    fn zero_window_is_rejected() {
        let config = RateLimitConfig::new().authenticated(TierLimit::new(1, Duration::ZERO));
        assert!(config.validate().is_err());
    }
}
