// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache storage backends.
//!
//! [`CacheBackend`] defines the two operations the coalescing engine needs from a
//! store: look a key up, and write a value with a time-to-live.

use std::time::Duration;

use bytes::Bytes;

use crate::Error;

/// Trait for cache storage backends.
///
/// Values are handed over already encoded (see [`CachedValue`](crate::CachedValue)),
/// so a backend never needs to know the type of what it stores.
///
/// Only `get` and `set` are required. `len` and `is_empty` have default
/// implementations returning `None`, since not every backend tracks its size.
#[dynosaur::dynosaur(pub(crate) DynCacheBackend = dyn(box) CacheBackend, bridge(none))]
pub trait CacheBackend: Send + Sync {
    /// Looks up the value stored under `key`.
    ///
    /// A missing or expired entry is `Ok(None)`. An error is returned only when
    /// the store itself fails.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>, Error>> + Send;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// With `ttl` set, the entry must not be returned by [`get`](Self::get) once the
    /// duration has elapsed. Returns `true` when the write was acknowledged.
    fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Returns the number of entries, if supported.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the backend holds no entries.
    ///
    /// Returns `None` for implementations that don't track size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}
