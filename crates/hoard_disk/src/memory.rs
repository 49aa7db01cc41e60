// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory tier backed by moka.

use std::time::{Duration, Instant};

use bytes::Bytes;
use moka::{Expiry, future::Cache};

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: Bytes,
    ttl: Option<Duration>,
}

/// Expires each entry after the TTL it was written with.
struct EntryExpiry;

impl Expiry<String, MemoryEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &MemoryEntry, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Bounded in-memory tier.
///
/// Capacity is measured in bytes. Every entry weighs at least
/// `max_size / max_items` rounded up, so the tier never holds more than
/// `max_items` entries even when they are tiny.
#[derive(Clone, Debug)]
pub(crate) struct MemoryTier {
    cache: Cache<String, MemoryEntry>,
}

impl MemoryTier {
    pub(crate) fn new(name: &str, max_size: u64, max_items: u64) -> Self {
        // Rounded up, so that `max_size / min_weight` never exceeds `max_items`.
        let min_weight = max_size.div_ceil(max_items.max(1));

        let cache = Cache::builder()
            .name(name)
            .max_capacity(max_size)
            .weigher(move |key: &String, entry: &MemoryEntry| entry_weight(key, entry, min_weight))
            .expire_after(EntryExpiry)
            .build();

        Self { cache }
    }

    pub(crate) async fn get(&self, key: &str) -> Option<Bytes> {
        self.cache.get(key).await.map(|entry| entry.value)
    }

    pub(crate) async fn insert(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        self.cache.insert(key.to_owned(), MemoryEntry { value, ttl }).await;
    }

    pub(crate) async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

fn entry_weight(key: &str, entry: &MemoryEntry, min_weight: u64) -> u32 {
    let size = u64::try_from(key.len() + entry.value.len()).unwrap_or(u64::MAX);
    u32::try_from(size.max(min_weight)).unwrap_or(u32::MAX)
}
