// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Batching, deduplicating record loader with lookups by primary and unique keys.
//!
//! A [`Loader`] sits in front of caller supplied batch fetch functions (typically
//! `SELECT ... WHERE column IN (...)` queries) and turns many individual lookups into
//! few round trips:
//!
//! - Lookups issued in the same scheduling turn are collected into one batch and
//!   fetched with a single call.
//! - Records are memoized by primary key for the life of the loader, so each primary
//!   key is fetched at most once until it is cleared.
//! - Lookups by a registered unique key, possibly spanning several columns, are first
//!   answered from the records already cached. Keys that miss are fetched in one batch
//!   and the records found are cached under their primary key.
//! - Batch fetch functions may return records in any order, leave out keys with no
//!   record, or return extra records; results are matched to keys by value.
//!
//! A missing record is `None`, never an error. A failing batch fetch fails every key in
//! the batch, and those keys are not memoized so a later lookup retries.
//!
//! A batch is dispatched at the end of the turn that opened it, on the Tokio runtime of
//! the calling thread or on the [`anyspawn::Spawner`] given to
//! [`LoaderBuilder::spawner`]. Outside a runtime, a batch is dispatched when one of its
//! lookups is first awaited.
//!
//! # Examples
//!
//! ```
//! use rowloader::{Key, Loader, Row, Value};
//! # futures::executor::block_on(async {
//!
//! async fn users_by_id(ids: Vec<Key>) -> Result<Vec<Row>, std::io::Error> {
//!     // Rows may come back in any order and with missing ids.
//!     Ok(ids
//!         .into_iter()
//!         .rev()
//!         .filter_map(|id| match id {
//!             Key::Scalar(Value::Int(id)) if id != 404 => Some(Row::new().with("id", id)),
//!             _ => None,
//!         })
//!         .collect())
//! }
//!
//! let loader = Loader::builder(users_by_id).name("users").build()?;
//!
//! let users = loader.load_many([1, 2, 404, 1]).await?;
//! let ids: Vec<_> = users
//!     .iter()
//!     .map(|user| user.as_ref().and_then(|u| u.get("id")).and_then(Value::as_i64))
//!     .collect();
//! assert_eq!(ids, vec![Some(1), Some(2), None, Some(1)]);
//! # Ok::<(), rowloader::Error>(())
//! # }).unwrap();
//! ```
//!
//! # Features
//!
//! - `logs`: emits `tracing` events for cache hits, misses, dispatches and
//!   invalidations once enabled with `LoaderBuilder::enable_logs`.
//! - `serde_json`: implements [`Record`] for JSON objects.

mod align;
mod alternate;
mod batch;
pub mod builder;
mod dedup;
mod error;
mod fetch;
mod key;
pub mod loader;
mod primary;
mod record;
mod telemetry;

#[doc(inline)]
pub use builder::{DEFAULT_PRIMARY_KEY, LoaderBuilder};
pub use error::{Error, ErrorKind, Result};
pub use fetch::{BatchFetch, BoxError, FetchFuture};
pub use key::{Key, KeySpec, Value};
#[doc(inline)]
pub use loader::{LoadFuture, Loader};
pub use primary::RecordFuture;
pub use record::{Projection, Record, Row};
pub use telemetry::LoaderName;
