// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Benchmarks for the coalescing cache.
//!
//! Run with: cargo bench -p hoard

#![allow(missing_docs, reason = "benchmark code")]

use std::{
    convert::Infallible,
    hint::black_box,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use criterion::{Criterion, criterion_group, criterion_main};
use hoard::{CacheOptions, CoalescingCache, NoopBackend};
use hoard_tier::testing::MockBackend;
use tokio::runtime::Runtime;

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_key() -> String {
    format!("key_{}", KEY_COUNTER.fetch_add(1, Ordering::Relaxed))
}

fn rt() -> Runtime {
    Runtime::new().expect("failed to create runtime")
}

fn bench_hit(c: &mut Criterion) {
    let rt = rt();
    let cache = CoalescingCache::builder(MockBackend::new()).logs(false).build();
    rt.block_on(cache.get_or_set(CacheOptions::new("hot"), || async { Ok::<_, Infallible>("value".to_string()) }))
        .expect("warm-up failed");

    c.bench_function("hit", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = Instant::now();
                for _ in 0..iters {
                    let value = cache
                        .get_or_set(CacheOptions::new(black_box("hot")), || async { Ok::<_, Infallible>(String::new()) })
                        .await;
                    let _ = black_box(value);
                }
                start.elapsed()
            })
        });
    });
}

fn bench_miss(c: &mut Criterion) {
    let rt = rt();
    let cache = CoalescingCache::builder(NoopBackend).logs(false).build();

    c.bench_function("miss_noop", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = Instant::now();
                for _ in 0..iters {
                    let value = cache
                        .get_or_set(CacheOptions::new(unique_key()), || async { Ok::<_, Infallible>(42_u64) })
                        .await;
                    let _ = black_box(value);
                }
                start.elapsed()
            })
        });
    });
}

/// 100 concurrent callers on a fresh key: one leader, 99 followers.
fn bench_high_contention(c: &mut Criterion) {
    let rt = rt();
    let cache = CoalescingCache::builder(NoopBackend).logs(false).build();

    c.bench_function("high_contention_100", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = Instant::now();
                for _ in 0..iters {
                    let key = unique_key();
                    let tasks: Vec<_> = (0..100)
                        .map(|_| {
                            let cache = cache.clone();
                            let key = key.clone();
                            tokio::spawn(async move {
                                cache
                                    .get_or_set(CacheOptions::new(key), || async {
                                        tokio::task::yield_now().await;
                                        Ok::<_, Infallible>(42_u64)
                                    })
                                    .await
                            })
                        })
                        .collect();

                    for task in tasks {
                        let _ = black_box(task.await.expect("task panicked"));
                    }
                }
                start.elapsed()
            })
        });
    });
}

criterion_group!(benches, bench_hit, bench_miss, bench_high_contention);
criterion_main!(benches);
