// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::{borrow::Cow, path::PathBuf, sync::Arc};

type BoxedSource = Arc<dyn std::error::Error + Send + Sync>;

/// An error from a cache operation.
///
/// The error is cheap to clone: a failed computation is handed to every caller that
/// waited on it, so every variant keeps its cause behind an [`Arc`].
///
/// # Example
///
/// ```
/// use hoard_tier::Error;
///
/// let error = Error::from_message("operation failed");
/// assert_eq!(error.to_string(), "operation failed");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Reading or writing persistent storage failed.
    #[error("cache storage I/O failed at {}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A value could not be encoded for storage or decoded from it.
    #[error("cached value could not be encoded or decoded")]
    Codec(#[source] BoxedSource),

    /// The computation whose result was being cached failed.
    #[error("cache factory failed: {0}")]
    Factory(#[source] BoxedSource),

    /// The cache configuration is invalid.
    #[error("invalid cache configuration: {0}")]
    Config(Cow<'static, str>),

    /// Any other failure.
    #[error("{0}")]
    Other(Cow<'static, str>),
}

impl Error {
    /// Creates an error from a plain message.
    ///
    /// This is the public API for creating cache errors from external crates.
    pub fn from_message(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Other(message.into())
    }

    /// Creates an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Creates an encoding error.
    pub fn codec(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Codec(Arc::new(source))
    }

    /// Wraps the failure of a cached computation.
    pub fn factory(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Factory(Arc::new(source))
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the original factory error if this error wraps one of type `E`.
    ///
    /// # Example
    ///
    /// ```
    /// use hoard_tier::Error;
    ///
    /// let error = Error::factory(std::io::Error::other("registry unreachable"));
    /// let source = error.factory_error::<std::io::Error>().expect("wraps an io::Error");
    /// assert_eq!(source.to_string(), "registry unreachable");
    /// ```
    #[must_use]
    pub fn factory_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Factory(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns `true` if this error wraps a factory failure.
    #[must_use]
    pub fn is_factory(&self) -> bool {
        matches!(self, Self::Factory(_))
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
