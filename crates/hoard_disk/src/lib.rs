// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Two-tier storage backend for the `hoard` coalescing cache.
//!
//! [`TieredBackend`] combines a bounded in-memory cache with durable file storage:
//!
//! - **Memory tier**: a concurrent `TinyLFU` cache bounded by total bytes and by
//!   entry count. Entries expire after the TTL they were written with.
//! - **File tier**: one record per key in a cache directory, written atomically
//!   through a temporary file. Records carry their absolute expiry time, so they
//!   stay valid across restarts.
//! - **Pruning**: a background task periodically deletes expired and unreadable
//!   records, along with temporary files abandoned by interrupted writes. See
//!   [`TieredBackend::prune_now`] for an on-demand pass.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use hoard_disk::TieredBackend;
//! use hoard_tier::CacheBackend;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), hoard_tier::Error> {
//! # let dir = tempfile::tempdir().unwrap();
//! let backend = TieredBackend::builder(dir.path())
//!     .max_size(50 * 1024 * 1024)
//!     .max_items(2000)
//!     .prune_interval(Duration::from_secs(1200))
//!     .build()?;
//!
//! backend.set("greeting", "{\"data\":\"hello\"}".into(), None).await?;
//! assert!(backend.get("greeting").await?.is_some());
//! # Ok(())
//! # }
//! ```

mod builder;
mod file;
mod memory;
mod pruner;
mod tiered;

#[doc(inline)]
pub use builder::{DEFAULT_MAX_ITEMS, DEFAULT_MAX_SIZE, DEFAULT_PRUNE_INTERVAL, TieredBackendBuilder};
#[doc(inline)]
pub use pruner::PruneReport;
#[doc(inline)]
pub use tiered::TieredBackend;
