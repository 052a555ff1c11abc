//! Orchestrator results and the wire envelope built from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, MuninnError};
use crate::limiter::RateLimitInfo;
use crate::types::{CacheEntry, ResourceCost};
use crate::{Fingerprint, Result};

/// Where a served payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Fast (ephemeral) tier hit.
    Fast,
    /// Durable tier hit, backfilled into the fast tier.
    Durable,
    /// Another request generated it while this one waited on its claim.
    DedupWait,
    /// Generated for this request.
    Fresh,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Fast => "fast",
            Source::Durable => "durable",
            Source::DedupWait => "dedup-wait",
            Source::Fresh => "fresh",
        }
    }
}

/// A successfully served request.
#[derive(Debug, Clone, PartialEq)]
pub struct Served {
    pub payload: Value,
    pub fingerprint: Fingerprint,
    pub source: Source,
    pub generation_latency_ms: Option<u64>,
    pub resource_cost: Option<ResourceCost>,
    /// Time spent waiting on another request's claim.
    pub waited_ms: Option<u64>,
    pub rate_limit: Option<RateLimitInfo>,
}

impl Served {
    pub(crate) fn cached(entry: CacheEntry, source: Source) -> Self {
        Self {
            payload: entry.payload,
            fingerprint: entry.fingerprint,
            source,
            generation_latency_ms: None,
            resource_cost: None,
            waited_ms: None,
            rate_limit: None,
        }
    }

    pub(crate) fn fresh(entry: CacheEntry) -> Self {
        Self {
            generation_latency_ms: Some(entry.generation_latency_ms),
            resource_cost: Some(entry.resource_cost),
            ..Self::cached(entry, Source::Fresh)
        }
    }

    /// Whether the payload came from a cache rather than a generation for this request.
    pub fn cached_hit(&self) -> bool {
        self.source != Source::Fresh
    }
}

/// Error details in the wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

/// Metadata in the wire envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_cost: Option<ResourceCost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waited_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
}

/// Wire envelope returned for every request: `{ data, error, metadata }`.
///
/// Exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub data: Option<Value>,
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

impl From<Served> for Response {
    fn from(served: Served) -> Self {
        Self {
            metadata: ResponseMetadata {
                cached: served.cached_hit(),
                source: Some(served.source),
                fingerprint: Some(served.fingerprint),
                generation_latency_ms: served.generation_latency_ms,
                resource_cost: served.resource_cost,
                waited_ms: served.waited_ms,
                rate_limit: served.rate_limit,
            },
            data: Some(served.payload),
            error: None,
        }
    }
}

impl From<MuninnError> for Response {
    fn from(err: MuninnError) -> Self {
        let rate_limit = match &err {
            MuninnError::RateLimited { info, .. } => Some(info.clone()),
            _ => None,
        };
        Self {
            data: None,
            error: Some(ErrorBody {
                kind: err.kind(),
                message: err.public_message(),
                retryable: err.is_retryable(),
            }),
            metadata: ResponseMetadata {
                rate_limit,
                ..ResponseMetadata::default()
            },
        }
    }
}

impl From<Result<Served>> for Response {
    fn from(result: Result<Served>) -> Self {
        match result {
            Ok(served) => served.into(),
            Err(err) => err.into(),
        }
    }
}
