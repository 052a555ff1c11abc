//! Cached generation results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Fingerprint;
use crate::types::GenerationOutput;

/// What a generation cost the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCost {
    pub tokens_used: u64,
    pub cost_estimate: f64,
}

/// One generation result, as stored in either cache tier.
///
/// `payload` never changes after the entry is written; only `hit_count`
/// and `last_accessed_at` move on reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub payload: Value,
    /// Backend/model that produced the payload.
    pub generator_id: String,
    pub generation_latency_ms: u64,
    pub resource_cost: ResourceCost,
    #[serde(default)]
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build a fresh entry from a validated payload and the generator's metadata.
    pub fn new(
        fingerprint: Fingerprint,
        payload: Value,
        output: &GenerationOutput,
        latency: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            fingerprint,
            payload,
            generator_id: output.model_id.clone(),
            generation_latency_ms: latency.as_millis() as u64,
            resource_cost: ResourceCost {
                tokens_used: output.tokens_used,
                cost_estimate: output.cost_estimate,
            },
            hit_count: 0,
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Count one read of this entry.
    pub fn record_hit(&mut self, at: DateTime<Utc>) {
        self.hit_count = self.hit_count.saturating_add(1);
        if at > self.last_accessed_at {
            self.last_accessed_at = at;
        }
    }
}
