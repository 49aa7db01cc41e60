// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Package Metadata Example
//!
//! Caches registry lookups on disk. Concurrent lookups for the same package share
//! one request, and packages that do not exist are remembered for ten minutes
//! instead of the configured TTL.

use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use hoard::{CacheConfig, CacheOptions, CoalescingCache, DynamicBackend, Policy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PackageInfo {
    name: String,
    latest: String,
}

/// A fake registry that takes a while to answer and counts its requests.
#[derive(Debug, Clone, Default)]
struct Registry {
    requests: Arc<AtomicU32>,
}

impl Registry {
    async fn fetch(&self, name: &str) -> Result<Option<PackageInfo>, Infallible> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok((name != "left-pad-2").then(|| PackageInfo {
            name: name.to_string(),
            latest: "1.0.0".to_string(),
        }))
    }
}

fn package_options(name: &str) -> CacheOptions<String, Option<PackageInfo>> {
    CacheOptions::new(name.to_string())
        .namespace("package-info")
        .policy(|info: &Option<PackageInfo>| match info {
            None => Policy::new().cache_nil(true).ttl(Duration::from_secs(600)),
            Some(_) => Policy::default(),
        })
}

async fn package_info(
    cache: &CoalescingCache<DynamicBackend>,
    registry: &Registry,
    name: &str,
) -> Result<Option<PackageInfo>, hoard::Error> {
    cache.get_or_set(package_options(name), || registry.fetch(name)).await
}

#[tokio::main]
async fn main() -> Result<(), hoard::Error> {
    let dir = std::env::temp_dir().join("hoard-package-metadata");
    let mut config = CacheConfig::from_env()?;
    config.directory = dir;

    let cache = CoalescingCache::from_config("package-info", &config)?;
    let registry = Registry::default();

    // Ten concurrent lookups, one registry request.
    let lookups = (0..10).map(|_| package_info(&cache, &registry, "react"));
    let results = futures::future::join_all(lookups).await;
    for result in results {
        if let Some(info) = result? {
            println!("{}@{}", info.name, info.latest);
        }
    }

    // Missing packages are cached as well.
    assert!(package_info(&cache, &registry, "left-pad-2").await?.is_none());
    assert!(package_info(&cache, &registry, "left-pad-2").await?.is_none());

    let stats = cache.stats();
    println!(
        "registry requests: {}, hits: {}, misses: {}, deferred: {}",
        registry.requests.load(Ordering::Relaxed),
        stats.hits,
        stats.misses,
        stats.deferred
    );

    Ok(())
}
