// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Lookups by registered unique keys.
//!
//! A lookup first waits for every future cached in the primary cache at call time and
//! scans the resolved records for one whose unique key columns match. Only keys that
//! no cached record matches are fetched, through a dispatcher dedicated to the key
//! specification. Fetched records are then cached under their primary key.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};

use crate::align::{BatchAligner, Slot};
use crate::batch::{BatchOptions, Batcher};
use crate::fetch::BatchFetch;
use crate::primary::{PrimaryCache, RecordFuture};
use crate::telemetry::{LoaderActivity, LoaderTelemetry};
use crate::{Error, Key, KeySpec, Projection, Record, Result};

pub(crate) struct AlternateKeyResolver<R> {
    primary: PrimaryCache<R>,
    dispatchers: Arc<HashMap<KeySpec, Batcher<R>>>,
    telemetry: LoaderTelemetry,
}

impl<R> Clone for AlternateKeyResolver<R> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            dispatchers: Arc::clone(&self.dispatchers),
            telemetry: self.telemetry,
        }
    }
}

impl<R> Debug for AlternateKeyResolver<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlternateKeyResolver")
            .field("unique_keys", &self.dispatchers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<R> AlternateKeyResolver<R>
where
    R: Record + Send + Sync + 'static,
{
    pub(crate) fn new(
        primary: PrimaryCache<R>,
        unique_keys: impl IntoIterator<Item = (KeySpec, Arc<dyn BatchFetch<R>>)>,
        options: &BatchOptions,
        telemetry: LoaderTelemetry,
    ) -> Self {
        let dispatchers = unique_keys
            .into_iter()
            .map(|(spec, fetch)| {
                let batcher = Batcher::new(BatchAligner::new(spec.clone(), fetch), options.clone(), None, telemetry);
                (spec, batcher)
            })
            .collect();
        Self {
            primary,
            dispatchers: Arc::new(dispatchers),
            telemetry,
        }
    }

    pub(crate) fn unique_keys(&self) -> impl Iterator<Item = &KeySpec> {
        self.dispatchers.keys()
    }

    /// Resolves one key of `spec`.
    ///
    /// Fails immediately if `spec` is not a registered unique key.
    pub(crate) fn load(&self, spec: &KeySpec, key: Key) -> Result<BoxFuture<'static, Result<Slot<R>>>> {
        let many = self.load_many(spec, vec![key])?;
        Ok(async move { Ok(many.await?.pop().flatten()) }.boxed())
    }

    /// Resolves distinct keys of `spec`, returning one slot per key.
    ///
    /// All keys missing from the primary cache go out in the same dispatch.
    /// Fails immediately if `spec` is not a registered unique key.
    pub(crate) fn load_many(&self, spec: &KeySpec, keys: Vec<Key>) -> Result<BoxFuture<'static, Result<Vec<Slot<R>>>>> {
        let dispatcher = self.dispatchers.get(spec).cloned().ok_or_else(|| Error::unregistered_key(spec))?;
        let snapshot = self.primary.snapshot();
        let primary = self.primary.clone();
        let spec = spec.clone();
        let telemetry = self.telemetry;

        Ok(async move {
            let cached = settled(snapshot).await;
            let mut slots: Vec<Slot<R>> = keys.iter().map(|key| first_match(&cached, &spec, key)).collect();

            let misses: Vec<usize> = (0..keys.len()).filter(|&i| slots[i].is_none()).collect();
            let hits = keys.len() - misses.len();
            if hits > 0 {
                telemetry.record(LoaderActivity::ProbeHit, hits);
            }
            if misses.is_empty() {
                return Ok(slots);
            }
            telemetry.record(LoaderActivity::ProbeMiss, misses.len());

            // Every miss is enqueued before the first await so they share a batch.
            let tickets: Vec<_> = misses.iter().map(|&i| dispatcher.enqueue(keys[i].clone(), 0)).collect();
            let fetched = join_all(tickets.into_iter().map(|ticket| ticket.resolve())).await;

            // Records of batches that succeeded are cached even if another batch failed.
            let mut failure = None;
            for (index, fetched) in misses.into_iter().zip(fetched) {
                match fetched {
                    Ok(record) => {
                        if let Some(record) = &record {
                            primary.backfill(record);
                        }
                        slots[index] = record;
                    }
                    Err(error) => {
                        failure.get_or_insert(error);
                    }
                }
            }
            failure.map_or(Ok(slots), Err)
        }
        .boxed())
    }
}

/// Waits for all `futures` and keeps the records that resolved successfully.
async fn settled<R>(futures: Vec<RecordFuture<R>>) -> Vec<Arc<R>> {
    join_all(futures).await.into_iter().filter_map(|result| result.ok().flatten()).collect()
}

fn first_match<R: Record>(records: &[Arc<R>], spec: &KeySpec, key: &Key) -> Slot<R> {
    records
        .iter()
        .find(|record| Projection::of(record.as_ref(), spec).matches(key))
        .map(Arc::clone)
}
