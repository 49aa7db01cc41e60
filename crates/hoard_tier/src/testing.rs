// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory backend for testing.
//!
//! This module provides `MockBackend`, an in-memory backend with per-entry expiry
//! that records every operation and supports failure injection for testing error
//! paths.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{CacheBackend, Error};

/// Recorded backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    /// A lookup of the given key.
    Get {
        /// The key that was looked up.
        key: String,
    },
    /// A write of the given key.
    Set {
        /// The key that was written.
        key: String,
        /// The time-to-live requested for the write.
        ttl: Option<Duration>,
    },
}

impl BackendOp {
    /// Returns the key the operation targeted.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Get { key } | Self::Set { key, .. } => key,
        }
    }
}

type FailPredicate = Box<dyn Fn(&BackendOp) -> bool + Send + Sync>;

#[derive(Debug)]
struct StoredEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

/// An in-memory backend for testing.
///
/// Entries may carry an expiry; an expired entry is evicted lazily when it is
/// looked up. Expiry uses Tokio's clock, so tests running with a paused clock can
/// move time forward with `tokio::time::advance`. Clones share the same storage.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hoard_tier::{CacheBackend, testing::{BackendOp, MockBackend}};
///
/// # async fn example() -> Result<(), hoard_tier::Error> {
/// let backend = MockBackend::new();
///
/// backend.set("key", "value".into(), Some(Duration::from_secs(10))).await?;
/// assert!(backend.get("key").await?.is_some());
///
/// assert_eq!(backend.operations()[0], BackendOp::Set {
///     key: "key".to_string(),
///     ttl: Some(Duration::from_secs(10)),
/// });
/// # Ok(())
/// # }
/// ```
///
/// # Failure Injection
///
/// ```
/// use hoard_tier::{CacheBackend, testing::{BackendOp, MockBackend}};
///
/// # async fn example() {
/// let backend = MockBackend::new();
///
/// backend.fail_when(|op| matches!(op, BackendOp::Get { .. }));
/// assert!(backend.get("key").await.is_err());
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    data: Arc<Mutex<HashMap<String, StoredEntry>>>,
    operations: Arc<Mutex<Vec<BackendOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl MockBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns `true` if an entry is stored under `key`, expired or not.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Removes every stored entry.
    pub fn clear(&self) {
        self.data.lock().clear();
    }

    /// Sets a predicate that decides which operations fail.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoard_tier::testing::{BackendOp, MockBackend};
    ///
    /// let backend = MockBackend::new();
    ///
    /// // Fail writes to a single key
    /// backend.fail_when(|op| matches!(op, BackendOp::Set { key, .. } if key == "broken"));
    /// ```
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&BackendOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<BackendOp> {
        self.operations.lock().clone()
    }

    /// Returns the TTLs of all recorded writes, in order.
    #[must_use]
    pub fn set_ttls(&self) -> Vec<Option<Duration>> {
        self.operations
            .lock()
            .iter()
            .filter_map(|op| match op {
                BackendOp::Set { ttl, .. } => Some(*ttl),
                BackendOp::Get { .. } => None,
            })
            .collect()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: BackendOp) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let message = match &op {
            BackendOp::Get { .. } => "mock: get failed",
            BackendOp::Set { .. } => "mock: set failed",
        };
        self.operations.lock().push(op);
        if fail { Err(Error::from_message(message)) } else { Ok(()) }
    }
}

impl CacheBackend for MockBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.record(BackendOp::Get { key: key.to_owned() })?;

        let mut data = self.data.lock();
        let Some(entry) = data.get(key) else {
            return Ok(None);
        };
        if entry.expires_at.is_some_and(|expires_at| Instant::now() >= expires_at) {
            data.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool, Error> {
        self.record(BackendOp::Set { key: key.to_owned(), ttl })?;

        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.data.lock().insert(key.to_owned(), StoredEntry { value, expires_at });
        Ok(true)
    }

    fn len(&self) -> Option<u64> {
        u64::try_from(self.data.lock().len()).ok()
    }
}
