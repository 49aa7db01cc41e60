// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Deterministic cache keys.

use std::fmt;

use hoard_tier::Error;
use serde::Serialize;

/// The string under which a value is stored in a backend.
///
/// A raw key may be any serializable value: a string, a tuple, a struct. It is
/// converted into a canonical JSON document (object fields sorted by name) and
/// hashed with XXH3-128, so structurally equal raw keys always produce the same
/// cache key. With a namespace the key reads `"<namespace>:<hash>"`, which keeps
/// identical raw keys in different namespaces apart.
///
/// # Examples
///
/// ```
/// use hoard::CacheKey;
///
/// let plain = CacheKey::new(None, &("npm", "left-pad"))?;
/// let scoped = CacheKey::new(Some("packages"), &("npm", "left-pad"))?;
///
/// assert_eq!(plain.as_str().len(), 32);
/// assert_eq!(scoped.as_str(), format!("packages:{plain}"));
/// # Ok::<(), hoard::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for `raw`, optionally scoped to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if `raw` cannot be represented as JSON, for example
    /// a map whose keys are not strings.
    pub fn new<K>(namespace: Option<&str>, raw: &K) -> Result<Self, Error>
    where
        K: Serialize + ?Sized,
    {
        // `Value` keeps object fields in a sorted map, which makes the encoding canonical.
        let canonical = serde_json::to_value(raw).map_err(Error::codec)?;
        let bytes = serde_json::to_vec(&canonical).map_err(Error::codec)?;
        let hash = xxhash_rust::xxh3::xxh3_128(&bytes);

        Ok(Self(match namespace {
            Some(namespace) => format!("{namespace}:{hash:032x}"),
            None => format!("{hash:032x}"),
        }))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
