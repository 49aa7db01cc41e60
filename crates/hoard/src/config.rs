// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache configuration read from environment variables.
//!
//! | Variable                     | Meaning                                   | Default  |
//! |------------------------------|-------------------------------------------|----------|
//! | `HOARD_CACHE_DISABLED`       | use the no-op backend                     | `false`  |
//! | `HOARD_CACHE_DIR`            | directory of the file tier                | `cache`  |
//! | `HOARD_CACHE_TTL`            | default entry time-to-live, in seconds    | `10800`  |
//! | `HOARD_CACHE_MAX_SIZE`       | memory tier size, such as `50mb`          | `50mb`   |
//! | `HOARD_CACHE_MAX_ITEMS`      | memory tier entry count                   | `2000`   |
//! | `HOARD_CACHE_PRUNE_INTERVAL` | seconds between two pruning passes        | `1200`   |

use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use hoard_tier::Error;

/// Prefix of the variables read by [`CacheConfig::from_env`].
pub const DEFAULT_ENV_PREFIX: &str = "HOARD_CACHE_";

const KIB: u64 = 1024;

/// Settings for a cache built with [`CoalescingCache::from_config`](crate::CoalescingCache::from_config).
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct CacheConfig {
    /// Swaps the persistent backend for the no-op backend.
    pub disabled: bool,
    /// Directory of the file tier. A relative path is resolved against the working directory.
    pub directory: PathBuf,
    /// Default time-to-live of entries.
    pub ttl: Duration,
    /// Maximum size of the memory tier, in bytes.
    pub max_size: u64,
    /// Maximum number of entries in the memory tier.
    pub max_items: u64,
    /// Period between two pruning passes over the file tier.
    pub prune_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            directory: PathBuf::from("cache"),
            ttl: Duration::from_secs(10_800),
            max_size: 50 * KIB * KIB,
            max_items: 2000,
            prune_interval: Duration::from_secs(1200),
        }
    }
}

impl CacheConfig {
    /// Reads the configuration from `HOARD_CACHE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first variable that cannot be parsed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_env_with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Reads the configuration from environment variables starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first variable that cannot be parsed.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, Error> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first variable that cannot be parsed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use std::time::Duration;
    ///
    /// use hoard::CacheConfig;
    ///
    /// let vars = HashMap::from([("APP_CACHE_TTL", "60"), ("APP_CACHE_MAX_SIZE", "10mb")]);
    /// let config = CacheConfig::from_lookup("APP_CACHE_", |name| vars.get(name).map(ToString::to_string))?;
    ///
    /// assert_eq!(config.ttl, Duration::from_secs(60));
    /// assert_eq!(config.max_size, 10 * 1024 * 1024);
    /// # Ok::<(), hoard::Error>(())
    /// ```
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| {
            let name = format!("{prefix}{suffix}");
            lookup(&name).map(|value| (name, value.trim().to_owned()))
        };

        let mut config = Self::default();

        if let Some((name, value)) = read("DISABLED") {
            config.disabled = parse_bool(&value).ok_or_else(|| invalid(&name, &value, "expected a boolean"))?;
        }
        if let Some((name, value)) = read("DIR") {
            if value.is_empty() {
                return Err(invalid(&name, &value, "expected a directory path"));
            }
            config.directory = PathBuf::from(value);
        }
        if let Some((name, value)) = read("TTL") {
            config.ttl = Duration::from_secs(parse_number(&name, &value)?);
        }
        if let Some((name, value)) = read("MAX_SIZE") {
            config.max_size = parse_size(&value).ok_or_else(|| invalid(&name, &value, "expected a size such as 50mb"))?;
        }
        if let Some((name, value)) = read("MAX_ITEMS") {
            config.max_items = parse_number(&name, &value)?;
        }
        if let Some((name, value)) = read("PRUNE_INTERVAL") {
            config.prune_interval = Duration::from_secs(parse_number(&name, &value)?);
        }

        Ok(config)
    }

    /// Creates the backend this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the tiered backend cannot be created.
    #[cfg(feature = "disk")]
    #[cfg_attr(docsrs, doc(cfg(feature = "disk")))]
    pub fn backend(&self, name: &'static str) -> Result<hoard_tier::DynamicBackend, Error> {
        use hoard_tier::DynamicBackendExt;

        if self.disabled {
            tracing::warn!(cache.name = name, "caching is disabled, values will be recomputed on every call");
            return Ok(hoard_tier::NoopBackend.into_dynamic());
        }

        let backend = hoard_disk::TieredBackend::builder(&self.directory)
            .name(name)
            .max_size(self.max_size)
            .max_items(self.max_items)
            .prune_interval(self.prune_interval)
            .build()?;

        Ok(backend.into_dynamic())
    }
}

fn invalid(name: &str, value: &str, expected: &str) -> Error {
    Error::config(format!("{name}={value:?}: {expected}"))
}

fn parse_number<T>(name: &str, value: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| invalid(name, value, &format!("expected a non-negative integer ({e})")))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Parses a byte size such as `"50mb"`, `"1.5 GB"` or `"4096"`.
///
/// Units are `b`, `kb`, `mb`, `gb` and `tb`, case-insensitive and 1024-based.
/// A bare number is a count of bytes.
#[must_use]
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "fractional sizes go through f64 and are range checked before converting back"
)]
pub fn parse_size(input: &str) -> Option<u64> {
    let input = input.trim().to_ascii_lowercase();
    let split = input.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "kb" => KIB,
        "mb" => KIB.pow(2),
        "gb" => KIB.pow(3),
        "tb" => KIB.pow(4),
        _ => return None,
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier);
    }

    let fractional: f64 = number.parse().ok()?;
    let bytes = (fractional * multiplier as f64).floor();
    if !bytes.is_finite() || bytes < 0.0 || bytes >= u64::MAX as f64 {
        return None;
    }

    Some(bytes as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<CacheConfig, Error> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        CacheConfig::from_lookup(DEFAULT_ENV_PREFIX, |name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config_from(&[]).unwrap();

        assert!(!config.disabled);
        assert_eq!(config.directory, PathBuf::from("cache"));
        assert_eq!(config.ttl, Duration::from_secs(10_800));
        assert_eq!(config.max_size, 52_428_800);
        assert_eq!(config.max_items, 2000);
        assert_eq!(config.prune_interval, Duration::from_secs(1200));
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn every_variable_is_read() {
        let config = config_from(&[
            ("HOARD_CACHE_DISABLED", "true"),
            ("HOARD_CACHE_DIR", "/var/cache/hoard"),
            ("HOARD_CACHE_TTL", "60"),
            ("HOARD_CACHE_MAX_SIZE", "512kb"),
            ("HOARD_CACHE_MAX_ITEMS", "10"),
            ("HOARD_CACHE_PRUNE_INTERVAL", "30"),
        ])
        .unwrap();

        assert!(config.disabled);
        assert_eq!(config.directory, PathBuf::from("/var/cache/hoard"));
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.max_size, 512 * 1024);
        assert_eq!(config.max_items, 10);
        assert_eq!(config.prune_interval, Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let error = config_from(&[("HOARD_CACHE_TTL", "soon")]).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
        assert!(error.to_string().contains("HOARD_CACHE_TTL"));

        let error = config_from(&[("HOARD_CACHE_DISABLED", "maybe")]).unwrap_err();
        assert!(error.to_string().contains("HOARD_CACHE_DISABLED"));

        let error = config_from(&[("HOARD_CACHE_MAX_SIZE", "lots")]).unwrap_err();
        assert!(error.to_string().contains("HOARD_CACHE_MAX_SIZE"));

        config_from(&[("HOARD_CACHE_DIR", " ")]).unwrap_err();
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for (value, expected) in [("TRUE", true), ("yes", true), ("1", true), ("off", false), ("No", false)] {
            assert_eq!(parse_bool(value), Some(expected), "{value}");
        }
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("10b"), Some(10));
        assert_eq!(parse_size("1kb"), Some(1024));
        assert_eq!(parse_size("50mb"), Some(50 * 1024 * 1024));
        assert_eq!(parse_size("50MB"), Some(50 * 1024 * 1024));
        assert_eq!(parse_size("2 gb"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("1.5kb"), Some(1536));
        assert_eq!(parse_size("1tb"), Some(1024_u64.pow(4)));
    }

    #[test]
    fn invalid_sizes() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("mb"), None);
        assert_eq!(parse_size("10 parsecs"), None);
        assert_eq!(parse_size("-1mb"), None);
        assert_eq!(parse_size("99999999999999999999tb"), None);
    }

    #[test]
    fn custom_prefix() {
        let vars = HashMap::from([("PKG_MAX_ITEMS".to_string(), "7".to_string())]);
        let config = CacheConfig::from_lookup("PKG_", |name| vars.get(name).cloned()).unwrap();

        assert_eq!(config.max_items, 7);
    }
}
