// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-call options and result-driven policy overrides.

use std::{borrow::Cow, fmt, sync::Arc, time::Duration};

/// Time-to-live used when neither the call, its policy, nor the cache configure one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Overrides derived from a computed value, applied to the single write of that value.
///
/// Every field left as `None` falls back to the corresponding [`CacheOptions`]
/// setting. `Policy::default()` overrides nothing.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hoard::Policy;
///
/// // Remember "not found" answers, but only briefly.
/// let policy = |value: &Option<String>| match value {
///     Some(_) => Policy::default(),
///     None => Policy::new().cache_nil(true).ttl(Duration::from_secs(600)),
/// };
///
/// assert_eq!(policy(&None).cache_nil, Some(true));
/// assert_eq!(policy(&Some("react".into())), Policy::default());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    /// Time-to-live for this write.
    pub ttl: Option<Duration>,
    /// Whether a nil value is written.
    pub cache_nil: Option<bool>,
}

impl Policy {
    /// Creates a policy that overrides nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the time-to-live.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Overrides whether a nil value is written.
    #[must_use]
    pub fn cache_nil(mut self, cache_nil: bool) -> Self {
        self.cache_nil = Some(cache_nil);
        self
    }
}

type PolicyFn<A> = dyn Fn(&A) -> Policy + Send + Sync;

/// Options for one coalesced call.
///
/// `K` is the raw key type and `A` the type of the computed value.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use hoard::{CacheOptions, Policy};
///
/// let options = CacheOptions::new(("npm", "react"))
///     .namespace("packages")
///     .ttl(Duration::from_secs(3 * 60 * 60))
///     .policy(|info: &Option<String>| {
///         if info.is_none() {
///             Policy::new().cache_nil(true).ttl(Duration::from_secs(600))
///         } else {
///             Policy::default()
///         }
///     });
/// ```
pub struct CacheOptions<K, A> {
    pub(crate) key: K,
    pub(crate) namespace: Option<Cow<'static, str>>,
    pub(crate) ttl: Option<Duration>,
    pub(crate) cache_nil: bool,
    pub(crate) policy: Option<Arc<PolicyFn<A>>>,
}

impl<K, A> CacheOptions<K, A> {
    /// Creates options for `key` with every other setting at its default.
    pub fn new(key: K) -> Self {
        Self {
            key,
            namespace: None,
            ttl: None,
            cache_nil: false,
            policy: None,
        }
    }

    /// Scopes the key to a namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<Cow<'static, str>>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the time-to-live of the stored value.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets whether a nil value (one that serializes to JSON `null`) is stored.
    ///
    /// Defaults to `false`: a nil value is returned but recomputed on the next call.
    #[must_use]
    pub fn cache_nil(mut self, cache_nil: bool) -> Self {
        self.cache_nil = cache_nil;
        self
    }

    /// Sets a function that derives overrides from the computed value.
    ///
    /// The function runs once per successful computation, inside the leader's
    /// call, so it should be cheap and free of side effects.
    #[must_use]
    pub fn policy<P>(mut self, policy: P) -> Self
    where
        P: Fn(&A) -> Policy + Send + Sync + 'static,
    {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Returns the raw key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Resolves the TTL and nil handling for writing `value`.
    pub(crate) fn resolve(&self, value: &A, default_ttl: Duration) -> (Duration, bool) {
        let policy = self.policy.as_ref().map(|policy| policy(value)).unwrap_or_default();
        let ttl = policy.ttl.or(self.ttl).unwrap_or(default_ttl);
        let cache_nil = policy.cache_nil.unwrap_or(self.cache_nil);
        (ttl, cache_nil)
    }
}

impl<K: Clone, A> Clone for CacheOptions<K, A> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            namespace: self.namespace.clone(),
            ttl: self.ttl,
            cache_nil: self.cache_nil,
            policy: self.policy.clone(),
        }
    }
}

impl<K: fmt::Debug, A> fmt::Debug for CacheOptions<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("key", &self.key)
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("cache_nil", &self.cache_nil)
            .field("policy", &self.policy.is_some())
            .finish()
    }
}
