// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! File-backed tier: one record per key inside a cache directory.

use std::{
    ffi::OsStr,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use hoard_tier::Error;
use serde::{Deserialize, Serialize};

use crate::PruneReport;

pub(crate) const ENTRY_EXTENSION: &str = "entry";
pub(crate) const TEMP_EXTENSION: &str = "tmp";

/// On-disk record. The key is stored so a hash collision reads as a miss.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    key: String,
    expires_at_ms: Option<u64>,
    value: Vec<u8>,
}

impl Record {
    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|expires_at| now_ms >= expires_at)
    }
}

/// A value read back from disk along with the TTL it has left.
#[derive(Debug)]
pub(crate) struct StoredValue {
    pub(crate) value: Bytes,
    pub(crate) remaining: Option<Duration>,
}

#[derive(Debug)]
pub(crate) struct FileTier {
    directory: PathBuf,
    /// Temporary files older than this are left over from interrupted writes.
    stale_temp_age: Duration,
}

impl FileTier {
    pub(crate) fn new(directory: PathBuf, stale_temp_age: Duration) -> Self {
        Self {
            directory,
            stale_temp_age,
        }
    }

    pub(crate) fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let hash = xxhash_rust::xxh3::xxh3_128(key.as_bytes());
        self.directory.join(format!("{hash:032x}.{ENTRY_EXTENSION}"))
    }

    pub(crate) async fn read(&self, key: &str) -> Result<Option<StoredValue>, Error> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };

        let now = now_ms();
        let record: Record = match bincode::deserialize(&bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable cache record");
                discard(&path, now).await;
                return Ok(None);
            }
        };

        if record.key != key {
            return Ok(None);
        }

        if record.is_expired(now) {
            discard(&path, now).await;
            return Ok(None);
        }

        let remaining = record
            .expires_at_ms
            .map(|expires_at| Duration::from_millis(expires_at.saturating_sub(now)));

        Ok(Some(StoredValue {
            value: Bytes::from(record.value),
            remaining,
        }))
    }

    pub(crate) async fn write(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), Error> {
        let record = Record {
            key: key.to_owned(),
            expires_at_ms: ttl.map(|ttl| now_ms().saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))),
            value: value.to_vec(),
        };
        let encoded = bincode::serialize(&record).map_err(Error::codec)?;

        let path = self.path_for(key);
        let temp = temp_path(&path);

        if let Err(e) = tokio::fs::write(&temp, &encoded).await {
            remove_quietly(&temp).await;
            return Err(Error::io(temp, e));
        }

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            remove_quietly(&temp).await;
            return Err(Error::io(path, e));
        }

        Ok(())
    }

    /// Deletes every expired or unreadable record in the directory.
    ///
    /// Temporary files are deleted once they are older than the stale age, so
    /// files of in-progress writes are left alone.
    pub(crate) async fn prune(&self) -> Result<PruneReport, Error> {
        let mut report = PruneReport::default();
        let now = now_ms();

        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| Error::io(&self.directory, e))?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(&self.directory, e))? {
            let path = entry.path();
            match path.extension().and_then(OsStr::to_str) {
                Some(ENTRY_EXTENSION) => {}
                Some(TEMP_EXTENSION) => {
                    if self.is_stale_temp(&entry).await && remove_quietly(&path).await {
                        report.stale_temp_files += 1;
                    }
                    continue;
                }
                _ => continue,
            }

            let keep = match tokio::fs::read(&path).await {
                Ok(bytes) => bincode::deserialize::<Record>(&bytes).is_ok_and(|record| !record.is_expired(now)),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(_) => false,
            };

            report.scanned += 1;
            if !keep && discard(&path, now).await {
                report.removed += 1;
            }
        }

        Ok(report)
    }

    async fn is_stale_temp(&self, entry: &tokio::fs::DirEntry) -> bool {
        let Ok(modified) = entry.metadata().await.and_then(|metadata| metadata.modified()) else {
            return false;
        };

        SystemTime::now()
            .duration_since(modified)
            .is_ok_and(|age| age >= self.stale_temp_age)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension(format!("{:016x}.{TEMP_EXTENSION}", fastrand::u64(..)))
}

/// Deletes the record at `path`, which was found expired or unreadable.
///
/// A writer may have renamed a live record onto `path` since it was inspected.
/// The record is therefore moved aside first and inspected again: a live one is
/// linked back, unless an even newer record has taken the path meanwhile.
/// Returns `true` if a record was deleted.
async fn discard(path: &Path, now_ms: u64) -> bool {
    let aside = temp_path(path);
    match tokio::fs::rename(path, &aside).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove cache record");
            return false;
        }
    }

    let live = match tokio::fs::read(&aside).await {
        Ok(bytes) => bincode::deserialize::<Record>(&bytes).is_ok_and(|record| !record.is_expired(now_ms)),
        Err(_) => false,
    };

    if live {
        match tokio::fs::hard_link(&aside, path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to restore cache record"),
        }
    }

    remove_quietly(&aside).await;
    !live
}

/// Removes `path`, returning `true` if a file was deleted.
async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "failed to remove cache file");
            }
            false
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
