// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{borrow::Cow, path::{Path, PathBuf}, sync::Arc, time::Duration};

use bytes::Bytes;
use hoard_tier::{CacheBackend, Error};

use crate::{PruneReport, TieredBackendBuilder, file::FileTier, memory::MemoryTier, pruner::Pruner};

/// A storage backend with a bounded memory tier in front of a durable file tier.
///
/// Reads check memory first and fall back to disk; a value found on disk is
/// copied back into memory with whatever TTL it has left. Writes go to disk first
/// and then to memory, so an acknowledged write survives a restart.
///
/// Clones share the same tiers. The background pruning task stops when the last
/// clone is dropped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hoard_disk::TieredBackend;
/// use hoard_tier::CacheBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), hoard_tier::Error> {
/// # let dir = tempfile::tempdir().unwrap();
/// let backend = TieredBackend::builder(dir.path()).build()?;
///
/// backend.set("key", "{\"data\":1}".into(), Some(Duration::from_secs(60))).await?;
/// assert!(backend.get("key").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TieredBackend {
    pub(crate) inner: Arc<Inner>,
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) name: Cow<'static, str>,
    pub(crate) memory: MemoryTier,
    pub(crate) files: Arc<FileTier>,
    pub(crate) _pruner: Option<Pruner>,
}

impl TieredBackend {
    /// Creates a builder storing records under `directory`.
    #[must_use]
    pub fn builder(directory: impl Into<PathBuf>) -> TieredBackendBuilder {
        TieredBackendBuilder::new(directory.into())
    }

    /// Returns the name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the directory holding the file tier.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.inner.files.directory()
    }

    /// Runs one pruning pass now, deleting expired and unreadable records.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be listed.
    pub async fn prune_now(&self) -> Result<PruneReport, Error> {
        let report = self.inner.files.prune().await?;
        tracing::info!(
            cache.name = %self.inner.name,
            prune.scanned = report.scanned,
            prune.removed = report.removed,
            prune.stale_temp_files = report.stale_temp_files,
            "cache.prune"
        );
        Ok(report)
    }

    /// Returns the number of entries currently held in the memory tier.
    pub async fn memory_entry_count(&self) -> u64 {
        self.inner.memory.entry_count().await
    }
}

impl CacheBackend for TieredBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        if let Some(value) = self.inner.memory.get(key).await {
            return Ok(Some(value));
        }

        let Some(stored) = self.inner.files.read(key).await? else {
            return Ok(None);
        };

        self.inner.memory.insert(key, stored.value.clone(), stored.remaining).await;
        Ok(Some(stored.value))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool, Error> {
        self.inner.files.write(key, &value, ttl).await?;
        self.inner.memory.insert(key, value, ttl).await;
        Ok(true)
    }
}
