//! Types for the generator boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a [`Generator`](crate::Generator) hands back.
///
/// `payload` is optional on purpose: backends that answer with nothing (or
/// `null`) are caught by the validation step and reported as
/// `GenerationIncomplete` instead of being cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    #[serde(default)]
    pub payload: Option<Value>,
    /// Identifies the backend/model that produced the payload.
    pub model_id: String,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub cost_estimate: f64,
}

impl GenerationOutput {
    /// Output with the given payload.
    pub fn new(payload: Value, model_id: impl Into<String>) -> Self {
        Self {
            payload: Some(payload),
            model_id: model_id.into(),
            tokens_used: 0,
            cost_estimate: 0.0,
        }
    }

    /// Output without any payload.
    pub fn empty(model_id: impl Into<String>) -> Self {
        Self {
            payload: None,
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    /// Set tokens used.
    pub fn tokens_used(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    /// Set the cost estimate.
    pub fn cost_estimate(mut self, cost: f64) -> Self {
        self.cost_estimate = cost;
        self
    }
}
