//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `source`: where the answer came from: "fast", "durable", "dedup-wait", "fresh"
//! - `status`: outcome: "ok" or an error kind
//! - `tier`: cache tier or rate-limit tier name

/// Total requests handled by the orchestrator.
///
/// Labels: `source` (empty on failure), `status` ("ok" | error kind).
pub const REQUESTS_TOTAL: &str = "muninn_requests_total";

/// Total cache hits.
///
/// Labels: `tier`.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total cache misses.
///
/// Labels: `tier`.
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total generator invocations.
///
/// Labels: `status` ("ok" | "failed" | "incomplete").
pub const GENERATIONS_TOTAL: &str = "muninn_generations_total";

/// Generator call duration in seconds.
pub const GENERATION_DURATION_SECONDS: &str = "muninn_generation_duration_seconds";

/// Total waits on another request's in-flight claim.
///
/// Labels: `outcome` ("ready" | "timed_out" | "abandoned").
pub const DEDUP_WAITS_TOTAL: &str = "muninn_dedup_waits_total";

/// Total requests rejected by the rate limiter.
///
/// Labels: `tier` ("anonymous" | "authenticated").
pub const RATE_LIMITED_TOTAL: &str = "muninn_rate_limited_total";

/// Total store failures absorbed by the orchestrator.
///
/// Labels: `store`, `operation`.
pub const STORE_ERRORS_TOTAL: &str = "muninn_store_errors_total";
