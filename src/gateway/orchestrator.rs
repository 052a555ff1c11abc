//! The request pipeline.
//!
//! ```text
//! RateLimitCheck → FingerprintComputed → FastCacheLookup → DurableLookup
//!   → ClaimAttempt → Generating → Validating → WriteThrough → Done
//! ```
//!
//! Any state can exit to `Failed(kind)`. Store failures never do: reads
//! degrade to the next tier and writes are logged and skipped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheTier, read_through, reread, store_failed, write_best_effort};
use crate::dedup::{ClaimGuard, ClaimOutcome, DeduplicationCoordinator, WaitOutcome};
use crate::fingerprint::CanonicalRequest;
use crate::limiter::RateLimiter;
use crate::types::{CacheEntry, Caller, OutputValidator, Response, Served, Source, Validation};
use crate::{Fingerprint, Fingerprinter, Generator, MuninnError, Result, telemetry};

/// Pipeline timings that are not owned by a component.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// TTL passed to the fast tier on write-through and backfill.
    /// `None` leaves it to the tier's default.
    pub fast_ttl: Option<Duration>,
    /// Upper bound on a single generator call. Default: 60s.
    pub generation_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fast_ttl: None,
            generation_timeout: Duration::from_secs(60),
        }
    }
}

pub(crate) struct Inner {
    pub(crate) limiter: RateLimiter,
    pub(crate) fingerprinter: Fingerprinter,
    pub(crate) fast: Arc<dyn CacheTier>,
    pub(crate) durable: Arc<dyn CacheTier>,
    pub(crate) dedup: DeduplicationCoordinator,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) validator: Arc<dyn OutputValidator>,
    pub(crate) config: OrchestratorConfig,
}

/// Serves requests from cache where possible and generates at most once
/// per fingerprint otherwise.
///
/// Cheap to clone; clones share every store.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub(crate) fn new(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Serve one request and wrap the outcome in the wire envelope.
    pub async fn handle(&self, caller: &Caller, request: &Value) -> Response {
        self.serve(caller, request).await.into()
    }

    /// Serve one request.
    pub async fn serve(&self, caller: &Caller, request: &Value) -> Result<Served> {
        let result = self.run(caller, request).await;
        let (source, status) = match &result {
            Ok(served) => (served.source.as_str(), "ok"),
            Err(e) => ("", e.kind().as_str()),
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL, "source" => source, "status" => status)
            .increment(1);
        result
    }

    /// The fingerprinter this orchestrator keys its caches with.
    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.inner.fingerprinter
    }

    async fn run(&self, caller: &Caller, request: &Value) -> Result<Served> {
        let rate = self.inner.limiter.check(caller, 1).await.into_result()?;
        let canonical = self.inner.fingerprinter.canonicalize(request)?;
        let mut served = self.resolve(canonical).await?;
        served.rate_limit = Some(rate);
        Ok(served)
    }

    async fn resolve(&self, canonical: CanonicalRequest) -> Result<Served> {
        let inner = &self.inner;
        let fingerprint = &canonical.fingerprint;

        if let Some(entry) = read_through(inner.fast.as_ref(), fingerprint).await {
            self.record_hit_later(fingerprint);
            return Ok(Served::cached(entry, Source::Fast));
        }

        if let Some(entry) = read_through(inner.durable.as_ref(), fingerprint).await {
            self.backfill(&entry).await;
            return Ok(Served::cached(entry, Source::Durable));
        }

        let mut waited = None;
        let guard = match inner.dedup.try_claim(fingerprint).await {
            Ok(ClaimOutcome::Claimed(claim)) => Some(inner.dedup.guard(claim)),
            Ok(ClaimOutcome::AlreadyClaimed) => match inner.dedup.await_default(fingerprint).await {
                WaitOutcome::Ready {
                    entry,
                    tier,
                    waited,
                } => {
                    if tier == Source::Durable {
                        self.backfill(&entry).await;
                    }
                    debug!(%fingerprint, waited_ms = waited.as_millis() as u64, "served from claim owner");
                    let mut served = Served::cached(entry, Source::DedupWait);
                    served.waited_ms = Some(waited.as_millis() as u64);
                    return Ok(served);
                }
                WaitOutcome::Abandoned { waited: w } | WaitOutcome::TimedOut { waited: w } => {
                    info!(%fingerprint, waited_ms = w.as_millis() as u64, "no result from claim owner, generating");
                    waited = Some(w);
                    self.reclaim(fingerprint).await
                }
            },
            Err(e) => {
                store_failed("claims", "try_claim", &e);
                None
            }
        };

        // Another owner may have written through and released between our
        // miss and our claim.
        let mut served = match guard {
            Some(guard) => match self.reread_tiers(fingerprint).await {
                Some(served) => {
                    guard.release().await;
                    served
                }
                None => self.generate(canonical, Some(guard)).await?,
            },
            None => self.generate(canonical, None).await?,
        };
        served.waited_ms = waited.map(|w| w.as_millis() as u64);
        Ok(served)
    }

    /// Fast then durable, for a request that already missed both.
    async fn reread_tiers(&self, fingerprint: &Fingerprint) -> Option<Served> {
        let inner = &self.inner;
        if let Some(entry) = reread(inner.fast.as_ref(), fingerprint).await {
            self.record_hit_later(fingerprint);
            return Some(Served::cached(entry, Source::Fast));
        }
        let entry = reread(inner.durable.as_ref(), fingerprint).await?;
        self.backfill(&entry).await;
        debug!(%fingerprint, "result landed before generation, skipping it");
        Some(Served::cached(entry, Source::Durable))
    }

    /// Second claim attempt after a wait that produced nothing.
    ///
    /// If the claim is still held, generate anyway: a duplicate generation
    /// costs less than failing the caller.
    async fn reclaim(&self, fingerprint: &Fingerprint) -> Option<ClaimGuard> {
        match self.inner.dedup.try_claim(fingerprint).await {
            Ok(ClaimOutcome::Claimed(claim)) => Some(self.inner.dedup.guard(claim)),
            Ok(ClaimOutcome::AlreadyClaimed) => {
                warn!(%fingerprint, "claim still held after wait, generating without it");
                None
            }
            Err(e) => {
                store_failed("claims", "try_claim", &e);
                None
            }
        }
    }

    /// Run generation on its own task.
    ///
    /// The task owns the claim and finishes (including write-through and
    /// release) even if the caller that triggered it goes away, because
    /// other requests may be waiting on the result.
    async fn generate(
        &self,
        canonical: CanonicalRequest,
        guard: Option<ClaimGuard>,
    ) -> Result<Served> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let outcome = inner.produce(canonical).await;
            if let Some(guard) = guard {
                guard.release().await;
            }
            outcome
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(MuninnError::GenerationFailed(format!(
                "generation task did not complete: {e}"
            ))),
        }
    }

    async fn backfill(&self, entry: &CacheEntry) {
        let inner = &self.inner;
        if write_best_effort(
            inner.fast.as_ref(),
            &entry.fingerprint,
            entry,
            inner.config.fast_ttl,
        )
        .await
        {
            debug!(fingerprint = %entry.fingerprint, "backfilled fast tier");
        }
    }

    fn record_hit_later(&self, fingerprint: &Fingerprint) {
        let durable = Arc::clone(&self.inner.durable);
        let fingerprint = fingerprint.clone();
        tokio::spawn(async move {
            if let Err(e) = durable.record_hit(&fingerprint).await {
                store_failed(durable.name(), "record_hit", &e);
            }
        });
    }
}

impl Inner {
    /// Generating → Validating → WriteThrough.
    async fn produce(&self, canonical: CanonicalRequest) -> Result<Served> {
        let CanonicalRequest {
            fingerprint, value, ..
        } = canonical;
        let timeout = self.config.generation_timeout;

        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.generator.generate(&value)).await;
        let latency = started.elapsed();
        metrics::histogram!(telemetry::GENERATION_DURATION_SECONDS).record(latency.as_secs_f64());

        let mut output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let err = match e {
                    e @ (MuninnError::GenerationFailed(_) | MuninnError::GenerationIncomplete(_)) => e,
                    other => MuninnError::GenerationFailed(other.to_string()),
                };
                return Err(self.generation_error(&fingerprint, err));
            }
            Err(_) => {
                let err = MuninnError::GenerationFailed(format!(
                    "generator timed out after {timeout:?}"
                ));
                return Err(self.generation_error(&fingerprint, err));
            }
        };

        let payload = match self.validator.validate(output.payload.take()) {
            Validation::Valid(payload) => payload,
            Validation::Invalid(reason) => {
                let err = MuninnError::GenerationIncomplete(reason);
                return Err(self.generation_error(&fingerprint, err));
            }
        };
        metrics::counter!(telemetry::GENERATIONS_TOTAL, "status" => "ok").increment(1);

        let entry = CacheEntry::new(fingerprint.clone(), payload, &output, latency);
        // Durable first: it is the system of record.
        write_best_effort(self.durable.as_ref(), &fingerprint, &entry, None).await;
        write_best_effort(self.fast.as_ref(), &fingerprint, &entry, self.config.fast_ttl).await;

        info!(
            %fingerprint,
            generator = self.generator.name(),
            model = %entry.generator_id,
            latency_ms = entry.generation_latency_ms,
            tokens = entry.resource_cost.tokens_used,
            "generated fresh result"
        );
        Ok(Served::fresh(entry))
    }

    fn generation_error(&self, fingerprint: &Fingerprint, err: MuninnError) -> MuninnError {
        let status = match &err {
            MuninnError::GenerationIncomplete(_) => "incomplete",
            _ => "failed",
        };
        metrics::counter!(telemetry::GENERATIONS_TOTAL, "status" => status).increment(1);
        warn!(%fingerprint, generator = self.generator.name(), error = %err, "generation did not produce a cacheable result");
        err
    }
}
