//! Durable tier: the system of record.
//!
//! Two implementations:
//!
//! - [`MemoryDurableStore`]: a mutex-guarded map, for tests and
//!   single-process deployments.
//! - [`FileDurableStore`]: one JSON document per fingerprint under a
//!   directory. Writes go to a temp file and are renamed into place, so a
//!   crash mid-write never leaves a torn entry behind.
//!
//! Neither expires entries. Every `get` that hits increments `hit_count`
//! and `last_accessed_at` under the store lock, so concurrent readers never
//! lose an increment.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use super::CacheTier;
use crate::types::CacheEntry;
use crate::{Fingerprint, MuninnError, Result};

// ============================================================================
// MemoryDurableStore
// ============================================================================

/// In-memory durable tier.
#[derive(Default)]
pub struct MemoryDurableStore {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry without counting a hit.
    pub async fn peek(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.entries.lock().await.get(fingerprint).cloned()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheTier for MemoryDurableStore {
    fn name(&self) -> &str {
        "durable"
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let mut entries = self.entries.lock().await;
        Ok(entries.get_mut(fingerprint).map(|entry| {
            entry.record_hit(Utc::now());
            entry.clone()
        }))
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        entry: &CacheEntry,
        _ttl: Option<Duration>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(fingerprint) {
            debug!(%fingerprint, "durable entry already present, keeping original");
        } else {
            entries.insert(fingerprint.clone(), keyed(fingerprint, entry));
        }
        Ok(())
    }

    async fn record_hit(&self, fingerprint: &Fingerprint) -> Result<()> {
        if let Some(entry) = self.entries.lock().await.get_mut(fingerprint) {
            entry.record_hit(Utc::now());
        }
        Ok(())
    }
}

/// The entry as stored under `fingerprint`: the key wins over the entry's
/// own field.
fn keyed(fingerprint: &Fingerprint, entry: &CacheEntry) -> CacheEntry {
    let mut entry = entry.clone();
    entry.fingerprint = fingerprint.clone();
    entry
}

// ============================================================================
// FileDurableStore
// ============================================================================

/// Suffix counter for temp files, unique within this process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File-backed durable tier: `<dir>/<fingerprint>.json`.
///
/// Read-modify-write cycles are serialized through a single lock, which
/// makes hit counting exact within one process. Multiple processes sharing
/// a directory still get atomic entry writes, but hit counts may drift.
pub struct FileDurableStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileDurableStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            MuninnError::Configuration(format!("cannot create durable store at {dir:?}: {e}"))
        })?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Directory this store writes to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read an entry without counting a hit.
    pub async fn peek(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let _guard = self.lock.lock().await;
        self.read(fingerprint).await
    }

    fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint.as_str()))
    }

    async fn read(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let path = self.path_for(fingerprint);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MuninnError::store("file", e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| MuninnError::store("file", format!("corrupt entry {path:?}: {e}")))
    }

    async fn write(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(&entry.fingerprint);
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));
        let bytes = serde_json::to_vec_pretty(entry)?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| MuninnError::store("file", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| MuninnError::store("file", e))
    }

    async fn bump(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let Some(mut entry) = self.read(fingerprint).await? else {
            return Ok(None);
        };
        entry.record_hit(Utc::now());
        self.write(&entry).await?;
        Ok(Some(entry))
    }
}

#[async_trait]
impl CacheTier for FileDurableStore {
    fn name(&self) -> &str {
        "durable"
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let _guard = self.lock.lock().await;
        self.bump(fingerprint).await
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        entry: &CacheEntry,
        _ttl: Option<Duration>,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        if tokio::fs::try_exists(self.path_for(fingerprint))
            .await
            .map_err(|e| MuninnError::store("file", e))?
        {
            debug!(%fingerprint, "durable entry already present, keeping original");
            return Ok(());
        }
        self.write(&keyed(fingerprint, entry)).await
    }

    async fn record_hit(&self, fingerprint: &Fingerprint) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.bump(fingerprint).await.map(|_| ())
    }
}
