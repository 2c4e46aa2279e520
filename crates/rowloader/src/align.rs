// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Aligns batch fetch results with the requested keys.
//!
//! Batch fetch functions are free to return records in any order, to leave out keys
//! without a record, or to return records nobody asked for. [`BatchAligner`] turns such
//! a result into exactly one slot per requested key by matching each record's
//! projection against the keys by value.

use std::fmt::Debug;
use std::sync::Arc;

use crate::fetch::BatchFetch;
use crate::{Error, Key, KeySpec, Projection, Record, Result};

/// One aligned result: the record for a key, or `None` if none was returned.
pub(crate) type Slot<R> = Option<Arc<R>>;

/// Wraps a batch fetch function so that its output lines up with its input.
pub(crate) struct BatchAligner<R> {
    spec: KeySpec,
    fetch: Arc<dyn BatchFetch<R>>,
}

impl<R> Debug for BatchAligner<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAligner").field("spec", &self.spec).finish_non_exhaustive()
    }
}

impl<R> BatchAligner<R>
where
    R: Record + Send + Sync + 'static,
{
    pub(crate) fn new(spec: KeySpec, fetch: Arc<dyn BatchFetch<R>>) -> Self {
        Self { spec, fetch }
    }

    pub(crate) fn spec(&self) -> &KeySpec {
        &self.spec
    }

    /// Fetches `keys` and returns one slot per key, in the order of `keys`.
    ///
    /// A failing fetch fails the whole call.
    pub(crate) fn fetch(&self, keys: Vec<Key>) -> impl Future<Output = Result<Vec<Slot<R>>>> + Send + 'static {
        let pending = self.fetch.fetch(keys.clone());
        let spec = self.spec.clone();
        async move {
            let records = pending.await.map_err(|cause| Error::fetch(&spec, cause))?;
            Ok(align(&keys, records, &spec))
        }
    }
}

/// Assigns to each key the first not yet assigned record whose projection equals it.
///
/// A record is handed out at most once: an equal key that finds every matching
/// record already assigned gets `None`. Batches never carry equal keys, so this only
/// matters to direct callers.
pub(crate) fn align<R: Record>(keys: &[Key], records: Vec<R>, spec: &KeySpec) -> Vec<Slot<R>> {
    let candidates: Vec<(Projection, Arc<R>)> = records
        .into_iter()
        .map(|record| (Projection::of(&record, spec), Arc::new(record)))
        .collect();
    let mut consumed = vec![false; candidates.len()];

    keys.iter()
        .map(|key| {
            let index = (0..candidates.len()).find(|&index| !consumed[index] && candidates[index].0.matches(key))?;
            consumed[index] = true;
            Some(Arc::clone(&candidates[index].1))
        })
        .collect()
}
