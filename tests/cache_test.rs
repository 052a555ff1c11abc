//! Tests for the cache tiers: [`FastCache`], [`MemoryDurableStore`] and
//! [`FileDurableStore`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use muninn::{
    CacheConfig, CacheEntry, CacheTier, Caller, FastCache, FileDurableStore, Fingerprint,
    Fingerprinter, GenerationOutput, Generator, MemoryDurableStore, Muninn, Result, Source,
};

fn fingerprint(seed: &str) -> Fingerprint {
    Fingerprinter::new().fingerprint(&json!({ "seed": seed })).unwrap()
}

fn make_entry(seed: &str, payload: Value) -> CacheEntry {
    let output = GenerationOutput::new(payload.clone(), "test-model").tokens_used(7);
    CacheEntry::new(fingerprint(seed), payload, &output, Duration::from_millis(1200))
}

struct StaticGenerator;

#[async_trait]
impl Generator for StaticGenerator {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate(&self, _request: &Value) -> Result<GenerationOutput> {
        Ok(GenerationOutput::new(json!({ "days": [1, 2, 3] }), "static-v1"))
    }
}

// =========================================================================
// CacheConfig
// =========================================================================

#[test]
fn cache_config_defaults() {
    let config = CacheConfig::default();
    assert_eq!(config.max_entries, 10_000);
    assert_eq!(config.ttl, Duration::from_secs(7 * 24 * 3600));
}

#[test]
fn cache_config_builder() {
    let config = CacheConfig::new()
        .max_entries(500)
        .ttl(Duration::from_secs(60));
    assert_eq!(config.max_entries, 500);
    assert_eq!(config.ttl, Duration::from_secs(60));
}

// =========================================================================
// CacheEntry
// =========================================================================

#[test]
fn entry_records_generation_metadata() {
    let entry = make_entry("meta", json!({ "a": 1 }));
    assert_eq!(entry.generator_id, "test-model");
    assert_eq!(entry.generation_latency_ms, 1200);
    assert_eq!(entry.resource_cost.tokens_used, 7);
    assert_eq!(entry.hit_count, 0);
    assert_eq!(entry.created_at, entry.last_accessed_at);
}

#[test]
fn entry_serializes_camel_case() {
    let entry = make_entry("wire", json!({ "a": 1 }));
    let value = serde_json::to_value(&entry).unwrap();
    assert!(value.get("generatorId").is_some());
    assert!(value.get("hitCount").is_some());
    assert!(value.get("lastAccessedAt").is_some());
    assert!(value["resourceCost"].get("tokensUsed").is_some());
}

// =========================================================================
// FastCache
// =========================================================================

#[tokio::test]
async fn fast_miss_then_hit() {
    let cache = FastCache::new(&CacheConfig::default());
    let entry = make_entry("hit", json!({ "a": 1 }));

    assert!(cache.get(&entry.fingerprint).await.unwrap().is_none());
    cache.put(&entry.fingerprint, &entry, None).await.unwrap();
    let cached = cache.get(&entry.fingerprint).await.unwrap().unwrap();
    assert_eq!(cached.payload, json!({ "a": 1 }));
}

#[tokio::test]
async fn fast_entry_expires_after_ttl() {
    let cache = FastCache::new(&CacheConfig::default());
    let entry = make_entry("ttl", json!({ "a": 1 }));

    cache
        .put(&entry.fingerprint, &entry, Some(Duration::from_millis(100)))
        .await
        .unwrap();
    assert!(cache.get(&entry.fingerprint).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(cache.get(&entry.fingerprint).await.unwrap().is_none());
}

#[tokio::test]
async fn fast_invalidate_and_clear() {
    let cache = FastCache::default();
    let a = make_entry("a", json!(1));
    let b = make_entry("b", json!(2));
    cache.put(&a.fingerprint, &a, None).await.unwrap();
    cache.put(&b.fingerprint, &b, None).await.unwrap();

    cache.invalidate(&a.fingerprint).await;
    assert!(cache.get(&a.fingerprint).await.unwrap().is_none());
    assert!(cache.get(&b.fingerprint).await.unwrap().is_some());

    cache.clear();
    assert!(cache.get(&b.fingerprint).await.unwrap().is_none());
}

// =========================================================================
// Durable stores
// =========================================================================

#[tokio::test]
async fn memory_durable_counts_hits_on_read() {
    let store = MemoryDurableStore::new();
    let entry = make_entry("count", json!({ "a": 1 }));
    store.put(&entry.fingerprint, &entry, None).await.unwrap();

    let first = store.get(&entry.fingerprint).await.unwrap().unwrap();
    let second = store.get(&entry.fingerprint).await.unwrap().unwrap();
    assert_eq!(first.hit_count, 1);
    assert_eq!(second.hit_count, 2);
    assert!(second.last_accessed_at >= second.created_at);
}

#[tokio::test]
async fn memory_durable_keeps_first_write() {
    let store = MemoryDurableStore::new();
    let first = make_entry("race", json!({ "winner": "first" }));
    let second = make_entry("race", json!({ "winner": "second" }));

    store.put(&first.fingerprint, &first, None).await.unwrap();
    store.put(&second.fingerprint, &second, None).await.unwrap();

    let stored = store.peek(&first.fingerprint).await.unwrap();
    assert_eq!(stored.payload, json!({ "winner": "first" }));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn file_durable_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let entry = make_entry("persist", json!({ "plan": ["a", "b"] }));

    {
        let store = FileDurableStore::open(dir.path()).unwrap();
        store.put(&entry.fingerprint, &entry, None).await.unwrap();
    }

    let reopened = FileDurableStore::open(dir.path()).unwrap();
    let loaded = reopened.get(&entry.fingerprint).await.unwrap().unwrap();
    assert_eq!(loaded.payload, entry.payload);
    assert_eq!(loaded.hit_count, 1);

    reopened.record_hit(&entry.fingerprint).await.unwrap();
    let peeked = reopened.peek(&entry.fingerprint).await.unwrap().unwrap();
    assert_eq!(peeked.hit_count, 2);
    assert!(peeked.last_accessed_at <= Utc::now());
}

#[tokio::test]
async fn file_durable_miss_and_first_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileDurableStore::open(dir.path().join("nested")).unwrap();
    let first = make_entry("fw", json!({ "winner": "first" }));
    let second = make_entry("fw", json!({ "winner": "second" }));

    assert!(store.get(&first.fingerprint).await.unwrap().is_none());
    store.put(&first.fingerprint, &first, None).await.unwrap();
    store.put(&second.fingerprint, &second, None).await.unwrap();

    let stored = store.peek(&first.fingerprint).await.unwrap().unwrap();
    assert_eq!(stored.payload, json!({ "winner": "first" }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_durable_handles_sharing_a_directory_write_safely() {
    // Two handles on one directory stand in for two processes: their locks
    // do not see each other.
    let dir = tempfile::tempdir().unwrap();
    let a = Arc::new(FileDurableStore::open(dir.path()).unwrap());
    let b = Arc::new(FileDurableStore::open(dir.path()).unwrap());
    let entry = make_entry("shared", json!({ "plan": "shared" }));
    a.put(&entry.fingerprint, &entry, None).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = if i % 2 == 0 { a.clone() } else { b.clone() };
        let fp = entry.fingerprint.clone();
        handles.push(tokio::spawn(async move { store.record_hit(&fp).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files.len(), 1, "leftover files: {files:?}");
    let stored = a.peek(&entry.fingerprint).await.unwrap().unwrap();
    assert_eq!(stored.payload, json!({ "plan": "shared" }));
    assert!(stored.hit_count >= 1);
}

#[tokio::test]
async fn durable_stores_key_entries_by_put_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let file = FileDurableStore::open(dir.path()).unwrap();
    let memory = MemoryDurableStore::new();
    let key = fingerprint("key");
    let entry = make_entry("other", json!({ "plan": "mismatch" }));
    assert_ne!(entry.fingerprint, key);

    memory.put(&key, &entry, None).await.unwrap();
    file.put(&key, &entry, None).await.unwrap();

    assert_eq!(memory.peek(&key).await.unwrap().fingerprint, key);
    assert_eq!(file.peek(&key).await.unwrap().unwrap().fingerprint, key);
}

#[tokio::test]
async fn file_durable_corrupt_entry_is_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileDurableStore::open(dir.path()).unwrap();
    let fp = fingerprint("corrupt");
    std::fs::write(dir.path().join(format!("{fp}.json")), b"{ not json").unwrap();

    let err = store.get(&fp).await.unwrap_err();
    assert_eq!(err.kind(), muninn::ErrorKind::StoreUnavailable);
}

// =========================================================================
// Tier interplay
// =========================================================================

#[tokio::test]
async fn expired_fast_entry_is_served_from_durable() {
    let orch = Muninn::builder()
        .generator(Arc::new(StaticGenerator))
        .fast_ttl(Duration::from_secs(1))
        .durable_store(Arc::new(MemoryDurableStore::new()))
        .build()
        .unwrap();
    let caller = Caller::authenticated("u");
    let request = json!({ "plan": "week" });

    assert_eq!(orch.serve(&caller, &request).await.unwrap().source, Source::Fresh);
    assert_eq!(orch.serve(&caller, &request).await.unwrap().source, Source::Fast);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let served = orch.serve(&caller, &request).await.unwrap();
    assert_eq!(served.source, Source::Durable);
    assert_eq!(served.payload, json!({ "days": [1, 2, 3] }));
}
