//! The generator boundary.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::types::GenerationOutput;

/// The slow, costly backend muninn sits in front of.
///
/// Treated as opaque: it receives the canonical request and either
/// produces output or fails. Timeouts are enforced by the orchestrator,
/// and the orchestrator never retries a failed generation.
///
/// Errors returned as `GenerationIncomplete` are surfaced as such; every
/// other error is reported to the caller as `GenerationFailed`.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generator name for logging/debugging.
    fn name(&self) -> &str;

    /// Produce output for a canonical request.
    async fn generate(&self, request: &Value) -> Result<GenerationOutput>;
}
