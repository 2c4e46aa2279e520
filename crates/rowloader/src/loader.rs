// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The public loader type.

use std::fmt::Debug;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};

use crate::alternate::AlternateKeyResolver;
use crate::builder::LoaderBuilder;
use crate::dedup::Deduplicated;
use crate::fetch::BatchFetch;
use crate::primary::{PrimaryCache, RecordFuture};
use crate::telemetry::{LoaderName, LoaderTelemetry};
use crate::{Key, KeySpec, Record, Result};

/// A boxed future returned by the loader's lookup methods.
pub type LoadFuture<T> = BoxFuture<'static, Result<T>>;

/// Batches and memoizes record lookups by primary key and by registered unique keys.
///
/// Lookups issued in the same scheduling turn are coalesced into a single call to the
/// batch fetch function, and every record fetched by primary key is cached for the
/// life of the loader (until it is cleared). Lookups by a unique key are first served
/// from the records already cached; only the remaining keys are fetched, and the
/// records found are cached under their primary key.
///
/// A record that does not exist resolves to `None`. A batch whose fetch fails
/// resolves to an error for every key in it, and those keys are not cached.
///
/// Cloning a `Loader` is cheap; clones share the same cache.
///
/// # Examples
///
/// ```
/// use rowloader::{Key, KeySpec, Loader, Projection, Row};
/// # futures::executor::block_on(async {
///
/// fn users() -> Vec<Row> {
///     vec![
///         Row::new().with("id", 1).with("name", "luckydrq"),
///         Row::new().with("id", 2).with("name", "dengruoqi"),
///     ]
/// }
///
/// let by_column = |column: &'static str| {
///     move |keys: Vec<Key>| async move {
///         let spec = KeySpec::from(column);
///         let rows: Vec<Row> = users()
///             .into_iter()
///             .filter(|row| keys.iter().any(|key| Projection::of(row, &spec).matches(key)))
///             .collect();
///         Ok::<_, std::io::Error>(rows)
///     }
/// };
///
/// let loader = Loader::builder(by_column("id"))
///     .unique_key("name", by_column("name"))
///     .build()?;
///
/// let loaded = loader.load_many([1, 2, 1]).await?;
/// assert_eq!(loaded.len(), 3);
///
/// // Served from the records cached by the previous call.
/// let luckydrq = loader.load_by("name", "luckydrq")?.await?.unwrap();
/// assert!(std::sync::Arc::ptr_eq(&luckydrq, loaded[0].as_ref().unwrap()));
///
/// assert!(loader.load(3).await?.is_none());
/// # Ok::<(), rowloader::Error>(())
/// # }).unwrap();
/// ```
pub struct Loader<R> {
    telemetry: LoaderTelemetry,
    primary: PrimaryCache<R>,
    alternate: AlternateKeyResolver<R>,
}

impl<R> Clone for Loader<R> {
    fn clone(&self) -> Self {
        Self {
            telemetry: self.telemetry,
            primary: self.primary.clone(),
            alternate: self.alternate.clone(),
        }
    }
}

impl<R> Debug for Loader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.telemetry.name())
            .field("primary", &self.primary)
            .field("alternate", &self.alternate)
            .finish()
    }
}

impl<R> Loader<R>
where
    R: Record + Send + Sync + 'static,
{
    /// Creates a builder with the batch fetch function for the primary key.
    pub fn builder(fetch: impl BatchFetch<R>) -> LoaderBuilder<R> {
        LoaderBuilder::new(fetch)
    }

    pub(crate) fn new(telemetry: LoaderTelemetry, primary: PrimaryCache<R>, alternate: AlternateKeyResolver<R>) -> Self {
        Self {
            telemetry,
            primary,
            alternate,
        }
    }

    /// Loads the record with primary key `key`.
    ///
    /// Repeated loads of the same key return clones of the same future until the key
    /// is cleared; the future can be compared with [`Shared::ptr_eq`](futures::future::Shared::ptr_eq).
    pub fn load(&self, key: impl Into<Key>) -> RecordFuture<R> {
        self.primary.load(key.into())
    }

    /// Loads the record whose `spec` columns equal `key`.
    ///
    /// If `spec` is the primary key this is the same as [`Loader::load`].
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::UnregisteredKey`](crate::ErrorKind::UnregisteredKey) error,
    /// without starting any work, if `spec` is neither the primary key nor a registered
    /// unique key.
    pub fn load_by(&self, spec: impl Into<KeySpec>, key: impl Into<Key>) -> Result<LoadFuture<Option<Arc<R>>>> {
        let spec = spec.into();
        if spec == *self.primary.spec() {
            return Ok(self.load(key).boxed());
        }
        self.alternate.load(&spec, key.into())
    }

    /// Loads the records with the given primary keys.
    ///
    /// Duplicate keys are fetched once. The result has one entry per requested key,
    /// in request order; duplicates share the same record. If any batch fails, the
    /// whole call fails.
    pub fn load_many<I>(&self, keys: I) -> LoadFuture<Vec<Option<Arc<R>>>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let Deduplicated { keys, positions } = Deduplicated::new(keys.into_iter().map(Into::into));
        let pending: Vec<_> = keys.into_iter().map(|key| self.primary.load(key)).collect();
        async move {
            let records = try_join_all(pending).await?;
            Ok(positions.expand(&records))
        }
        .boxed()
    }

    /// Loads the records whose `spec` columns equal each of `keys`.
    ///
    /// Keys not served by a cached record are fetched together in one batch.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::UnregisteredKey`](crate::ErrorKind::UnregisteredKey) error,
    /// without starting any work, if `spec` is neither the primary key nor a registered
    /// unique key.
    pub fn load_many_by<I>(&self, spec: impl Into<KeySpec>, keys: I) -> Result<LoadFuture<Vec<Option<Arc<R>>>>>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let spec = spec.into();
        if spec == *self.primary.spec() {
            return Ok(self.load_many(keys));
        }
        let Deduplicated { keys, positions } = Deduplicated::new(keys.into_iter().map(Into::into));
        let distinct = self.alternate.load_many(&spec, keys)?;
        Ok(async move {
            let records = distinct.await?;
            Ok(positions.expand(&records))
        }
        .boxed())
    }

    /// Removes the cached record for primary key `key`, if any.
    pub fn clear(&self, key: impl Into<Key>) -> &Self {
        self.primary.clear(&key.into());
        self
    }

    /// Removes every cached record.
    pub fn clear_all(&self) -> &Self {
        self.primary.clear_all();
        self
    }

    /// Caches `record` under primary key `key` without fetching it.
    ///
    /// Does nothing if `key` is already cached; clear it first to replace the record.
    pub fn prime(&self, key: impl Into<Key>, record: impl Into<Arc<R>>) -> &Self {
        self.primary.prime(key.into(), record.into());
        self
    }

    /// Returns the number of cached primary keys, including ones still being fetched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if primary key `key` is cached.
    #[must_use]
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.primary.contains(&key.into())
    }

    /// Returns the primary key column.
    #[must_use]
    pub fn primary_key(&self) -> &KeySpec {
        self.primary.spec()
    }

    /// Returns the registered unique keys, in no particular order.
    pub fn unique_keys(&self) -> impl Iterator<Item = &KeySpec> {
        self.alternate.unique_keys()
    }

    /// Returns the loader name used in log events.
    #[must_use]
    pub fn name(&self) -> LoaderName {
        self.telemetry.name()
    }
}
