// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Loader construction and configuration.

use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::sync::Arc;

use anyspawn::Spawner;

use crate::alternate::AlternateKeyResolver;
use crate::batch::BatchOptions;
use crate::fetch::BatchFetch;
use crate::primary::PrimaryCache;
use crate::telemetry::{LoaderName, LoaderTelemetry};
use crate::{Error, KeySpec, Loader, Record, Result};

/// The primary key column used when none is configured.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

const DEFAULT_NAME: LoaderName = "rowloader";

/// Builder for a [`Loader`].
///
/// Created by [`Loader::builder`] with the batch fetch function for the primary key.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use rowloader::{Key, Loader, Row};
///
/// async fn users_by_id(ids: Vec<Key>) -> Result<Vec<Row>, std::io::Error> {
///     # let _ = ids;
///     Ok(Vec::new())
/// }
///
/// async fn users_by_email(emails: Vec<Key>) -> Result<Vec<Row>, std::io::Error> {
///     # let _ = emails;
///     Ok(Vec::new())
/// }
///
/// let loader = Loader::builder(users_by_id)
///     .name("users")
///     .primary_key("id")
///     .unique_key("email", users_by_email)
///     .max_batch_size(NonZeroUsize::new(500).unwrap())
///     .build()?;
/// # Ok::<(), rowloader::Error>(())
/// ```
pub struct LoaderBuilder<R> {
    name: LoaderName,
    primary_key: String,
    fetch: Arc<dyn BatchFetch<R>>,
    unique_keys: Vec<(KeySpec, Arc<dyn BatchFetch<R>>)>,
    batching: BatchOptions,
    #[cfg(any(feature = "logs", test))]
    logs_enabled: bool,
}

impl<R> Debug for LoaderBuilder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderBuilder")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .field("unique_keys", &self.unique_keys.iter().map(|(spec, _)| spec).collect::<Vec<_>>())
            .field("batching", &self.batching)
            .finish_non_exhaustive()
    }
}

impl<R> LoaderBuilder<R>
where
    R: Record + Send + Sync + 'static,
{
    pub(crate) fn new(fetch: impl BatchFetch<R>) -> Self {
        Self {
            name: DEFAULT_NAME,
            primary_key: DEFAULT_PRIMARY_KEY.to_owned(),
            fetch: Arc::new(fetch),
            unique_keys: Vec::new(),
            batching: BatchOptions::default(),
            #[cfg(any(feature = "logs", test))]
            logs_enabled: false,
        }
    }

    /// Sets the name identifying this loader in log events.
    #[must_use]
    pub fn name(mut self, name: LoaderName) -> Self {
        self.name = name;
        self
    }

    /// Sets the primary key column. Defaults to [`DEFAULT_PRIMARY_KEY`].
    ///
    /// Records are cached under the value of this column.
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Registers a unique key and the batch fetch function that looks records up by it.
    ///
    /// Registering the same key spec again replaces the earlier fetch function.
    ///
    /// # Examples
    ///
    /// ```
    /// use rowloader::{Key, Loader, Row};
    ///
    /// let by_id = |_ids: Vec<Key>| async { Ok::<_, std::io::Error>(Vec::<Row>::new()) };
    /// let by_name_and_email = |_pairs: Vec<Key>| async { Ok::<_, std::io::Error>(Vec::<Row>::new()) };
    ///
    /// let loader = Loader::builder(by_id)
    ///     .unique_key(["name", "email"], by_name_and_email)
    ///     .build()?;
    /// let pending = loader.load_by(["name", "email"], ("n1", "e1"))?;
    /// # drop(pending);
    /// # Ok::<(), rowloader::Error>(())
    /// ```
    #[must_use]
    pub fn unique_key(mut self, spec: impl Into<KeySpec>, fetch: impl BatchFetch<R>) -> Self {
        let spec = spec.into();
        self.unique_keys.retain(|(registered, _)| *registered != spec);
        self.unique_keys.push((spec, Arc::new(fetch)));
        self
    }

    /// Caps the number of keys passed to one batch fetch call.
    ///
    /// Without a cap, every distinct key requested in the same turn goes into one call.
    #[must_use]
    pub fn max_batch_size(mut self, max: NonZeroUsize) -> Self {
        self.batching.max_batch_size = Some(max);
        self
    }

    /// Sets the spawner used to dispatch each batch at the end of the turn that opened it.
    ///
    /// Without a spawner, batches are dispatched on the Tokio runtime of the thread that
    /// opens them. Outside a Tokio runtime, a batch is dispatched when one of its loads
    /// is first polled, so loads created earlier but awaited later share its fetch.
    ///
    /// # Examples
    ///
    /// ```
    /// use anyspawn::Spawner;
    /// use rowloader::{Key, Loader, Row};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), rowloader::Error> {
    /// let by_id = |_ids: Vec<Key>| async { Ok::<_, std::io::Error>(Vec::<Row>::new()) };
    /// let loader = Loader::builder(by_id).spawner(Spawner::new_tokio()).build()?;
    /// assert!(loader.load(1).await?.is_none());
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.batching.spawner = Some(spawner);
        self
    }

    /// Emits a `tracing` event for each cache hit, miss, dispatch and invalidation.
    #[cfg(any(feature = "logs", test))]
    #[must_use]
    pub fn enable_logs(mut self) -> Self {
        self.logs_enabled = true;
        self
    }

    /// Builds the loader.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidConfig`](crate::ErrorKind::InvalidConfig) error if
    /// the primary key is empty, a unique key names no column or an empty column, or a
    /// unique key is the primary key itself.
    pub fn build(self) -> Result<Loader<R>> {
        let primary_spec = KeySpec::Column(self.primary_key);
        if !primary_spec.is_well_formed() {
            return Err(Error::invalid_config("primary key must name a column"));
        }
        for (spec, _) in &self.unique_keys {
            if !spec.is_well_formed() {
                return Err(Error::invalid_config(format!("unique key {spec} must name non-empty columns")));
            }
            if *spec == primary_spec {
                return Err(Error::invalid_config(format!("{spec} is the primary key")));
            }
        }

        #[cfg(any(feature = "logs", test))]
        let logs_enabled = self.logs_enabled;
        #[cfg(not(any(feature = "logs", test)))]
        let logs_enabled = false;

        let telemetry = LoaderTelemetry::new(self.name, logs_enabled);
        let primary = PrimaryCache::new(primary_spec, self.fetch, self.batching.clone(), telemetry);
        let alternate = AlternateKeyResolver::new(primary.clone(), self.unique_keys, &self.batching, telemetry);
        Ok(Loader::new(telemetry, primary, alternate))
    }
}
