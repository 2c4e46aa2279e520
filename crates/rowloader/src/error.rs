// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for loader operations.

use std::fmt;

use ohno::EnrichableExt;

use crate::KeySpec;

/// Classifies a loader [`Error`].
///
/// A record that does not exist is never an error; it surfaces as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A lookup referenced a key spec that was not registered with the loader.
    ///
    /// This is a programming error and is reported before any asynchronous work starts.
    UnregisteredKey,

    /// A batch fetch function failed. Every key in the affected batch observes this error.
    Fetch,

    /// The loader configuration was rejected when building.
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnregisteredKey => "unregistered key",
            Self::Fetch => "fetch failed",
            Self::InvalidConfig => "invalid configuration",
        };
        f.write_str(name)
    }
}

/// An error from a loader operation.
///
/// Errors are cheap to clone so that one failed batch can be reported to every
/// caller waiting on it. Use [`Error::kind`] to tell programming errors apart from
/// data layer failures.
///
/// A [`ErrorKind::Fetch`] error keeps the batch fetch function's error as its
/// [`source`](std::error::Error::source), so callers can downcast to their own error type.
///
/// # Example
///
/// ```
/// use std::error::Error as _;
///
/// use rowloader::{ErrorKind, Key, Loader, Row};
///
/// let by_id = |_ids: Vec<Key>| async { Err::<Vec<Row>, _>(std::io::Error::other("connection reset")) };
/// let loader = Loader::builder(by_id).build()?;
///
/// let error = futures::executor::block_on(loader.load(1)).unwrap_err();
/// assert_eq!(error.kind(), ErrorKind::Fetch);
/// assert!(error.source().is_some_and(|cause| cause.is::<std::io::Error>()));
/// # Ok::<(), rowloader::Error>(())
/// ```
#[ohno::error]
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns `true` if a lookup referenced an unregistered key spec.
    #[must_use]
    pub fn is_unregistered_key(&self) -> bool {
        self.kind == ErrorKind::UnregisteredKey
    }

    /// Returns `true` if the error came from a batch fetch function.
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        self.kind == ErrorKind::Fetch
    }

    pub(crate) fn unregistered_key(spec: &KeySpec) -> Self {
        Self::caused_by(ErrorKind::UnregisteredKey, format!("{spec} is not defined as unique key"))
    }

    pub(crate) fn fetch(spec: &KeySpec, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Fetch, cause).enrich(format!("batch fetch by {spec} failed"))
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::caused_by(ErrorKind::InvalidConfig, message.into())
    }
}

/// A specialized [`Result`] type for loader operations.
pub type Result<T> = std::result::Result<T, Error>;
