//! File configuration.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path (e.g. the CLI `--config` flag)
//! 2. `~/.muninn/config.toml` (user)
//! 3. `/etc/muninn/config.toml` (system)
//!
//! Every key is optional; an empty file yields the defaults.
//!
//! ```toml
//! [fingerprint]
//! salt = "v2"
//! order_insensitive = ["params.tags"]
//!
//! [fast_cache]
//! max_entries = 10000
//! ttl_secs = 604800
//!
//! [durable]
//! path = "/var/lib/muninn/entries"
//!
//! [dedup]
//! claim_ttl_ms = 10000
//! poll_interval_ms = 100
//! max_wait_ms = 9000
//!
//! [rate_limit]
//! window_secs = 3600
//! anonymous_limit = 10
//! authenticated_limit = 100
//! on_store_failure = "open"
//!
//! [generation]
//! timeout_secs = 60
//! required_collections = ["sections"]
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::dedup::DedupConfig;
use crate::limiter::{RateLimitConfig, StoreFailurePolicy, TierLimit};
use crate::types::StructuralValidator;
use crate::{Fingerprinter, MuninnError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub fingerprint: FingerprintSection,
    #[serde(default)]
    pub fast_cache: FastCacheSection,
    #[serde(default)]
    pub durable: DurableSection,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

/// Request canonicalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FingerprintSection {
    /// Mixed into every fingerprint; change it to orphan all cached entries.
    #[serde(default)]
    pub salt: Option<String>,
    /// Dotted paths of arrays whose order does not matter.
    #[serde(default)]
    pub order_insensitive: Vec<String>,
}

/// In-process cache tier.
#[derive(Debug, Clone, Deserialize)]
pub struct FastCacheSection {
    /// Maximum entries (default: 10,000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Entry lifetime in seconds (default: 7 days).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for FastCacheSection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

/// Durable tier. Without a path, entries live in memory only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DurableSection {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Claim protocol timings.
#[derive(Debug, Clone, Deserialize)]
pub struct DedupSection {
    /// Claim lifetime in milliseconds (default: 10,000).
    #[serde(default = "default_claim_ttl_ms")]
    pub claim_ttl_ms: u64,
    /// Poll interval in milliseconds (default: 100).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum wait in milliseconds (default: 9,000).
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            claim_ttl_ms: default_claim_ttl_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

fn default_claim_ttl_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_wait_ms() -> u64 {
    9_000
}

/// Per-identity limits. Both tiers share one window length.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    /// Window length in seconds (default: 3600).
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Requests per window for anonymous callers (default: 10).
    #[serde(default = "default_anonymous_limit")]
    pub anonymous_limit: u64,
    /// Requests per window for authenticated callers (default: 100).
    #[serde(default = "default_authenticated_limit")]
    pub authenticated_limit: u64,
    /// "open" (default) or "closed".
    #[serde(default)]
    pub on_store_failure: StoreFailurePolicy,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            anonymous_limit: default_anonymous_limit(),
            authenticated_limit: default_authenticated_limit(),
            on_store_failure: StoreFailurePolicy::default(),
        }
    }
}

fn default_window_secs() -> u64 {
    3600
}

fn default_anonymous_limit() -> u64 {
    10
}

fn default_authenticated_limit() -> u64 {
    100
}

/// Generator call settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSection {
    /// Generator timeout in seconds (default: 60).
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    /// Payload paths that must hold non-empty collections.
    #[serde(default)]
    pub required_collections: Vec<String>,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_generation_timeout(),
            required_collections: Vec::new(),
        }
    }
}

fn default_generation_timeout() -> u64 {
    60
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.muninn/config.toml`
    /// 3. `/etc/muninn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| {
            MuninnError::Configuration(format!("Invalid config file {path:?}: {e}"))
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| MuninnError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MuninnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".muninn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/muninn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(MuninnError::Configuration(
            "No config file found. Create ~/.muninn/config.toml or /etc/muninn/config.toml"
                .to_string(),
        ))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.fast_cache.ttl_secs == 0 {
            return Err(MuninnError::Configuration(
                "fast_cache.ttl_secs must be non-zero".into(),
            ));
        }
        if self.generation.timeout_secs == 0 {
            return Err(MuninnError::Configuration(
                "generation.timeout_secs must be non-zero".into(),
            ));
        }
        self.dedup_config().validate()?;
        self.rate_limit_config().validate()
    }

    pub fn fingerprinter(&self) -> Fingerprinter {
        let section = &self.fingerprint;
        let mut fingerprinter = Fingerprinter::new();
        if let Some(salt) = &section.salt {
            fingerprinter = fingerprinter.salt(salt.clone());
        }
        section
            .order_insensitive
            .iter()
            .fold(fingerprinter, |fp, path| fp.order_insensitive(path))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.fast_cache.max_entries)
            .ttl(Duration::from_secs(self.fast_cache.ttl_secs))
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig::new()
            .claim_ttl(Duration::from_millis(self.dedup.claim_ttl_ms))
            .poll_interval(Duration::from_millis(self.dedup.poll_interval_ms))
            .max_wait(Duration::from_millis(self.dedup.max_wait_ms))
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        let section = &self.rate_limit;
        let window = Duration::from_secs(section.window_secs);
        RateLimitConfig::new()
            .anonymous(TierLimit::new(section.anonymous_limit, window))
            .authenticated(TierLimit::new(section.authenticated_limit, window))
            .on_store_failure(section.on_store_failure)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }

    pub fn validator(&self) -> StructuralValidator {
        self.generation
            .required_collections
            .iter()
            .fold(StructuralValidator::new(), |v, path| {
                v.require_collection(path.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.fast_cache.max_entries, 10_000);
        assert_eq!(config.fast_cache.ttl_secs, 604_800);
        assert_eq!(config.dedup.max_wait_ms, 9_000);
        assert_eq!(config.rate_limit.anonymous_limit, 10);
        assert_eq!(config.rate_limit.on_store_failure, StoreFailurePolicy::Open);
        assert!(config.durable.path.is_none());
    }

    #[test]
    fn wait_must_be_shorter_than_claim() {
        let err = Config::from_toml_str("[dedup]\nclaim_ttl_ms = 5000\nmax_wait_ms = 5000\n")
            .unwrap_err();
        assert!(err.to_string().contains("max wait"));
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(Config::from_toml_str("[server]\naddress = \"x\"\n").is_err());
    }
}
