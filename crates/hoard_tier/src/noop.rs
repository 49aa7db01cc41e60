// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use bytes::Bytes;

use crate::{CacheBackend, Error};

/// A backend that never stores anything.
///
/// `get` always reports a miss and `set` acknowledges without storing. Using it
/// turns off persistence while the coalescing engine keeps collapsing concurrent
/// duplicate calls into one computation.
///
/// # Examples
///
/// ```
/// use hoard_tier::{CacheBackend, NoopBackend};
/// # futures::executor::block_on(async {
///
/// let backend = NoopBackend;
/// assert!(backend.set("key", "value".into(), None).await?);
/// assert!(backend.get("key").await?.is_none());
/// # Ok::<(), hoard_tier::Error>(())
/// # });
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBackend;

impl CacheBackend for NoopBackend {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, Error> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Option<Duration>) -> Result<bool, Error> {
        Ok(true)
    }

    fn len(&self) -> Option<u64> {
        Some(0)
    }
}
