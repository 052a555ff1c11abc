//! Muninn - tiered cache-and-generate orchestration
//!
//! Muninn sits in front of an expensive, non-deterministic generator (an
//! LLM, a rendering pipeline) and makes sure each distinct request is paid
//! for once. Requests are rate-limited per caller, reduced to a
//! content-addressed [`Fingerprint`], and served from a fast in-process
//! tier, then a durable tier, and only then generated. Concurrent misses
//! for one fingerprint share a single generation through a short-lived
//! claim.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use muninn::{Caller, GenerationOutput, Generator, Muninn};
//! use serde_json::{Value, json};
//!
//! struct Planner;
//!
//! #[async_trait]
//! impl Generator for Planner {
//!     fn name(&self) -> &str {
//!         "planner"
//!     }
//!
//!     async fn generate(&self, request: &Value) -> muninn::Result<GenerationOutput> {
//!         Ok(GenerationOutput::new(json!({ "plan": request["goal"] }), "planner-v1"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let orchestrator = Muninn::builder()
//!         .generator(Arc::new(Planner))
//!         .build()?;
//!
//!     let request = json!({ "goal": "learn rust", "params": { "tags": ["a", "b"] } });
//!     let served = orchestrator.serve(&Caller::authenticated("user-1"), &request).await?;
//!     println!("{} from {}", served.payload, served.source.as_str());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod limiter;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use config::Config;
pub use error::{ErrorKind, MuninnError, Result};
pub use fingerprint::{CanonicalRequest, Fingerprint, Fingerprinter};
pub use gateway::{Muninn, MuninnBuilder, Orchestrator, OrchestratorConfig};
pub use traits::Generator;

pub use cache::{CacheConfig, CacheTier, FastCache, FileDurableStore, MemoryDurableStore};
pub use dedup::{
    ClaimGuard, ClaimOutcome, ClaimStore, DedupConfig, DeduplicationCoordinator, InFlightClaim,
    MemoryClaimStore, WaitOutcome,
};
pub use limiter::{
    CounterStore, MemoryCounterStore, RateDecision, RateLimitConfig, RateLimitInfo, RateLimiter,
    StoreFailurePolicy, TierLimit,
};

// Re-export all types
pub use types::{
    CacheEntry, Caller, ErrorBody, GenerationOutput, OutputValidator, ResourceCost, Response,
    ResponseMetadata, Served, Source, StructuralValidator, Tier, Validation,
};
