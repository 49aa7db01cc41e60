// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Dynamic backend wrapper for type erasure.

use std::{fmt::Debug, sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{CacheBackend, Error, backend::DynCacheBackend};

/// Extension trait for converting any `CacheBackend` into a `DynamicBackend`.
///
/// This trait is automatically implemented for all types that implement `CacheBackend`.
///
/// # Examples
///
/// ```
/// use hoard_tier::{DynamicBackend, DynamicBackendExt, NoopBackend};
///
/// let backend: DynamicBackend = NoopBackend.into_dynamic();
/// ```
pub trait DynamicBackendExt: Sized {
    /// Converts this backend into a `DynamicBackend`.
    fn into_dynamic(self) -> DynamicBackend;
}

impl<T> DynamicBackendExt for T
where
    T: CacheBackend + 'static,
{
    fn into_dynamic(self) -> DynamicBackend {
        DynamicBackend::new(self)
    }
}

/// A clonable backend with its concrete type erased.
///
/// Use this when the backend is picked at runtime, such as switching to
/// [`NoopBackend`](crate::NoopBackend) when caching is disabled.
pub struct DynamicBackend(Arc<DynCacheBackend<'static>>);

impl DynamicBackend {
    /// Creates a new dynamic backend from any `CacheBackend` implementation.
    pub fn new<T>(backend: T) -> Self
    where
        T: CacheBackend + 'static,
    {
        Self(DynCacheBackend::new_arc(backend))
    }
}

impl Debug for DynamicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicBackend").finish_non_exhaustive()
    }
}

impl Clone for DynamicBackend {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl CacheBackend for DynamicBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<bool, Error> {
        self.0.set(key, value, ttl).await
    }

    fn len(&self) -> Option<u64> {
        self.0.len()
    }

    fn is_empty(&self) -> Option<bool> {
        self.0.is_empty()
    }
}
