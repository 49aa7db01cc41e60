// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Storage backend abstraction for the `hoard` coalescing cache.
//!
//! This crate defines the [`CacheBackend`] trait that every store used by `hoard`
//! must satisfy, along with [`CachedValue`] for encoding values and the [`Error`]
//! type for fallible operations.
//!
//! # Overview
//!
//! A backend stores opaque, already encoded values under string keys. Keeping the
//! backend type-agnostic lets one store hold the results of many different
//! computations. Deduplication of concurrent calls happens above the backend, in
//! `hoard`, so even [`NoopBackend`] keeps concurrent duplicates collapsed.
//!
//! # Implementing a Backend
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Mutex;
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use hoard_tier::{CacheBackend, Error};
//!
//! struct SimpleBackend(Mutex<HashMap<String, Bytes>>);
//!
//! impl CacheBackend for SimpleBackend {
//!     async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
//!         Ok(self.0.lock().unwrap().get(key).cloned())
//!     }
//!
//!     async fn set(&self, key: &str, value: Bytes, _ttl: Option<Duration>) -> Result<bool, Error> {
//!         self.0.lock().unwrap().insert(key.to_owned(), value);
//!         Ok(true)
//!     }
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! [`DynamicBackend`] wraps any backend in a type-erased, clonable container. Use it
//! when the concrete backend is chosen at runtime, for example when configuration
//! disables persistence.

mod backend;
mod dynamic;
pub mod error;
mod noop;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod value;

#[doc(inline)]
pub use backend::CacheBackend;
#[doc(inline)]
pub use dynamic::{DynamicBackend, DynamicBackendExt};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use noop::NoopBackend;
#[doc(inline)]
pub use value::{CachedValue, Encoded};
