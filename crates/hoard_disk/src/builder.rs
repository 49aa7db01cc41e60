// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring a [`TieredBackend`].

use std::{borrow::Cow, path::PathBuf, sync::Arc, time::Duration};

use hoard_tier::Error;

use crate::{
    file::FileTier,
    memory::MemoryTier,
    pruner::Pruner,
    tiered::{Inner, TieredBackend},
};

/// Default bound on the in-memory tier, in bytes (50 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 50 * 1024 * 1024;

/// Default bound on the number of in-memory entries.
pub const DEFAULT_MAX_ITEMS: u64 = 2000;

/// Default period between two pruning passes (20 minutes).
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Builder for a [`TieredBackend`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hoard_disk::TieredBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), hoard_tier::Error> {
/// # let dir = tempfile::tempdir().unwrap();
/// let backend = TieredBackend::builder(dir.path())
///     .name("packages")
///     .max_size(10 * 1024 * 1024)
///     .max_items(500)
///     .prune_interval(Duration::from_secs(600))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TieredBackendBuilder {
    directory: PathBuf,
    name: Cow<'static, str>,
    max_size: u64,
    max_items: u64,
    prune_interval: Option<Duration>,
}

impl TieredBackendBuilder {
    pub(crate) fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            name: Cow::Borrowed("hoard"),
            max_size: DEFAULT_MAX_SIZE,
            max_items: DEFAULT_MAX_ITEMS,
            prune_interval: Some(DEFAULT_PRUNE_INTERVAL),
        }
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum total size of the in-memory tier, in bytes.
    #[must_use]
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    /// Sets the maximum number of entries held in memory.
    #[must_use]
    pub fn max_items(mut self, items: u64) -> Self {
        self.max_items = items;
        self
    }

    /// Sets how often expired records are deleted from disk.
    #[must_use]
    pub fn prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = Some(interval);
        self
    }

    /// Turns off background pruning. [`TieredBackend::prune_now`] still works.
    #[must_use]
    pub fn disable_pruning(mut self) -> Self {
        self.prune_interval = None;
        self
    }

    /// Creates the cache directory and builds the backend.
    ///
    /// When pruning is enabled the pruning task is spawned on the current Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound or the prune interval is zero, if the directory
    /// cannot be created, or if pruning is enabled outside a Tokio runtime.
    pub fn build(self) -> Result<TieredBackend, Error> {
        if self.max_size == 0 {
            return Err(Error::config("max_size must be greater than zero"));
        }
        if self.max_items == 0 {
            return Err(Error::config("max_items must be greater than zero"));
        }
        if self.prune_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(Error::config("prune_interval must be greater than zero"));
        }

        std::fs::create_dir_all(&self.directory).map_err(|e| Error::io(&self.directory, e))?;

        // A temporary file that survived a whole pruning period belongs to an interrupted write.
        let stale_temp_age = self.prune_interval.unwrap_or(DEFAULT_PRUNE_INTERVAL);
        let files = Arc::new(FileTier::new(self.directory, stale_temp_age));
        let pruner = match self.prune_interval {
            Some(every) => {
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|e| Error::from_message(format!("background pruning needs a Tokio runtime: {e}")))?;
                Some(Pruner::spawn(&runtime, self.name.clone(), &files, every))
            }
            None => None,
        };

        tracing::debug!(
            cache.name = %self.name,
            directory = %files.directory().display(),
            max_size = self.max_size,
            max_items = self.max_items,
            "tiered cache backend ready"
        );

        Ok(TieredBackend {
            inner: Arc::new(Inner {
                memory: MemoryTier::new(&self.name, self.max_size, self.max_items),
                name: self.name,
                files,
                _pruner: pruner,
            }),
        })
    }
}
