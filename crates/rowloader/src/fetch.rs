// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The batch fetch collaborator contract.

use futures::future::BoxFuture;

use crate::Key;

/// Boxed error returned by batch fetch functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The future returned by [`BatchFetch::fetch`].
pub type FetchFuture<R> = BoxFuture<'static, Result<Vec<R>, BoxError>>;

/// Fetches the records for a batch of keys in one round trip.
///
/// The returned records do not need to line up with `keys`: they may come back in
/// any order, with keys that have no record simply left out, or with extra records.
/// The loader matches records to keys by value.
///
/// Any `Fn(Vec<Key>) -> impl Future<Output = Result<Vec<R>, E>>` closure implements
/// this trait.
///
/// # Examples
///
/// ```
/// use rowloader::{Key, Row};
///
/// async fn fetch_by_ids(ids: Vec<Key>) -> Result<Vec<Row>, std::io::Error> {
///     // SELECT * FROM users WHERE id IN (...)
///     # let _ = ids;
///     Ok(Vec::new())
/// }
///
/// let loader = rowloader::Loader::builder(fetch_by_ids).build().unwrap();
/// # drop(loader);
/// ```
pub trait BatchFetch<R>: Send + Sync + 'static {
    /// Fetches records for `keys`. Keys within one call are distinct.
    fn fetch(&self, keys: Vec<Key>) -> FetchFuture<R>;
}

impl<R, F, Fut, E> BatchFetch<R> for F
where
    F: Fn(Vec<Key>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<R>, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn fetch(&self, keys: Vec<Key>) -> FetchFuture<R> {
        let fut = self(keys);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}
