//! Tests for TOML configuration loading and its use by the builder.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use muninn::{
    Caller, Config, ErrorKind, GenerationOutput, Generator, Muninn, Result, Source,
    StoreFailurePolicy,
};

struct FixedGenerator(Value);

#[async_trait]
impl Generator for FixedGenerator {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, _request: &Value) -> Result<GenerationOutput> {
        Ok(GenerationOutput::new(self.0.clone(), "fixed-v1"))
    }
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn full_config_parses() {
    let config = Config::from_toml_str(
        r#"
        [fingerprint]
        salt = "v3"
        order_insensitive = ["params.tags", "params.exclude"]

        [fast_cache]
        max_entries = 500
        ttl_secs = 3600

        [durable]
        path = "/var/lib/muninn"

        [dedup]
        claim_ttl_ms = 8000
        poll_interval_ms = 50
        max_wait_ms = 7000

        [rate_limit]
        window_secs = 60
        anonymous_limit = 3
        authenticated_limit = 30
        on_store_failure = "closed"

        [generation]
        timeout_secs = 20
        required_collections = ["days"]
        "#,
    )
    .unwrap();

    assert_eq!(config.fingerprint.salt.as_deref(), Some("v3"));
    assert_eq!(config.cache_config().max_entries, 500);
    assert_eq!(config.cache_config().ttl, Duration::from_secs(3600));
    assert_eq!(config.dedup_config().claim_ttl, Duration::from_secs(8));
    assert_eq!(config.dedup_config().poll_interval, Duration::from_millis(50));

    let limits = config.rate_limit_config();
    assert_eq!(limits.anonymous.limit, 3);
    assert_eq!(limits.authenticated.window, Duration::from_secs(60));
    assert_eq!(limits.on_store_failure, StoreFailurePolicy::Closed);

    assert_eq!(config.generation_timeout(), Duration::from_secs(20));
    assert_eq!(config.validator().required_collections(), ["days"]);
}

#[test]
fn load_from_explicit_path() {
    let file = write_config("[rate_limit]\nanonymous_limit = 4\n");
    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.rate_limit.anonymous_limit, 4);
    assert_eq!(config.rate_limit.authenticated_limit, 100);
}

#[test]
fn missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.to_string().contains("not found"));
}

#[test]
fn invalid_values_are_rejected() {
    for bad in [
        "[rate_limit]\nwindow_secs = 0\n",
        "[dedup]\nclaim_ttl_ms = 1000\nmax_wait_ms = 2000\n",
        "[dedup]\npoll_interval_ms = 0\n",
        "[generation]\ntimeout_secs = 0\n",
        "[rate_limit]\non_store_failure = \"sometimes\"\n",
        "[fast_cache]\nmax_entries = \"lots\"\n",
    ] {
        assert!(Config::from_toml_str(bad).is_err(), "accepted: {bad}");
    }
}

#[tokio::test]
async fn builder_applies_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_toml_str(&format!(
        r#"
        [fingerprint]
        order_insensitive = ["tags"]

        [durable]
        path = {path:?}

        [rate_limit]
        authenticated_limit = 2

        [generation]
        required_collections = ["days"]
        "#,
        path = dir.path().join("entries").display().to_string(),
    ))
    .unwrap();

    let orch = Muninn::builder()
        .generator(Arc::new(FixedGenerator(json!({ "days": ["mon"] }))))
        .config(&config)
        .unwrap()
        .build()
        .unwrap();
    let caller = Caller::authenticated("cfg");

    let first = orch.serve(&caller, &json!({ "tags": ["a", "b"] })).await.unwrap();
    let second = orch.serve(&caller, &json!({ "tags": ["b", "a"] })).await.unwrap();
    assert_eq!(first.source, Source::Fresh);
    assert_eq!(second.source, Source::Fast);

    // The durable tier wrote through to disk.
    let file = dir
        .path()
        .join("entries")
        .join(format!("{}.json", first.fingerprint));
    assert!(file.exists());

    let err = orch.serve(&caller, &json!({ "tags": [] })).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn required_collections_from_config_are_enforced() {
    let config = Config::from_toml_str("[generation]\nrequired_collections = [\"days\"]\n").unwrap();
    let orch = Muninn::builder()
        .generator(Arc::new(FixedGenerator(json!({ "days": [] }))))
        .config(&config)
        .unwrap()
        .build()
        .unwrap();

    let err = orch
        .serve(&Caller::anonymous("ip"), &json!({ "q": 1 }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenerationIncomplete);
}
