// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Background pruning of the file tier.

use std::{
    borrow::Cow,
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::file::FileTier;

/// Outcome of one pruning pass over the cache directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct PruneReport {
    /// Number of records examined.
    pub scanned: u64,
    /// Number of expired or unreadable records deleted.
    pub removed: u64,
    /// Number of temporary files left behind by interrupted writes and deleted.
    pub stale_temp_files: u64,
}

/// Handle to the pruning task; the task is aborted when this is dropped.
#[derive(Debug)]
pub(crate) struct Pruner(JoinHandle<()>);

impl Pruner {
    /// Starts pruning `files` every `every`, first run one period from now.
    ///
    /// The task holds only a weak reference, so it also stops on its own once the
    /// file tier is gone.
    pub(crate) fn spawn(runtime: &Handle, name: Cow<'static, str>, files: &Arc<FileTier>, every: Duration) -> Self {
        let files: Weak<FileTier> = Arc::downgrade(files);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(files) = files.upgrade() else {
                    break;
                };

                match files.prune().await {
                    Ok(report) => tracing::info!(
                        cache.name = %name,
                        prune.scanned = report.scanned,
                        prune.removed = report.removed,
                        prune.stale_temp_files = report.stale_temp_files,
                        "cache.prune"
                    ),
                    Err(e) => tracing::error!(cache.name = %name, error = %e, "cache.prune failed"),
                }
            }
        });

        Self(task)
    }
}

impl Drop for Pruner {
    fn drop(&mut self) {
        self.0.abort();
    }
}
