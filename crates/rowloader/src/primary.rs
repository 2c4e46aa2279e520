// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Memoizes record futures by primary key.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::align::BatchAligner;
use crate::batch::{BatchOptions, Batcher, FailureHook, Member};
use crate::fetch::BatchFetch;
use crate::telemetry::{LoaderActivity, LoaderTelemetry};
use crate::{Key, KeySpec, Projection, Record, Result};

/// A shared future resolving to the record for one key, or `None` if it does not exist.
///
/// Every caller loading the same primary key receives a clone of the same future; use
/// [`Shared::ptr_eq`] to check whether two handles refer to the same cache entry.
pub type RecordFuture<R> = Shared<BoxFuture<'static, Result<Option<Arc<R>>>>>;

struct CacheEntry<R> {
    generation: u64,
    future: RecordFuture<R>,
}

struct Entries<R> {
    map: HashMap<Key, CacheEntry<R>>,
    next_generation: u64,
}

impl<R> Entries<R> {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn insert_resolved(&mut self, key: Key, record: Arc<R>) -> bool
    where
        R: Send + Sync + 'static,
    {
        let generation = self.next_generation();
        match self.map.entry(key) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    generation,
                    future: futures::future::ready(Ok(Some(record))).boxed().shared(),
                });
                true
            }
        }
    }
}

/// The per-loader cache of record futures, keyed by primary key.
///
/// An entry is created the first time a key is loaded, before its batch is fetched,
/// and stays until it is cleared. Entries of a batch whose fetch fails are dropped so
/// that the next load retries.
pub(crate) struct PrimaryCache<R> {
    entries: Arc<Mutex<Entries<R>>>,
    batcher: Batcher<R>,
    spec: KeySpec,
    telemetry: LoaderTelemetry,
}

impl<R> Clone for PrimaryCache<R> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            batcher: self.batcher.clone(),
            spec: self.spec.clone(),
            telemetry: self.telemetry,
        }
    }
}

impl<R> Debug for PrimaryCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryCache")
            .field("spec", &self.spec)
            .field("len", &self.entries.lock().map.len())
            .finish_non_exhaustive()
    }
}

impl<R> PrimaryCache<R>
where
    R: Record + Send + Sync + 'static,
{
    pub(crate) fn new(
        spec: KeySpec,
        fetch: Arc<dyn BatchFetch<R>>,
        options: BatchOptions,
        telemetry: LoaderTelemetry,
    ) -> Self {
        let entries = Arc::new(Mutex::new(Entries {
            map: HashMap::new(),
            next_generation: 0,
        }));
        let batcher = Batcher::new(
            BatchAligner::new(spec.clone(), fetch),
            options,
            Some(evict_on_failure(Arc::downgrade(&entries))),
            telemetry,
        );
        Self {
            entries,
            batcher,
            spec,
            telemetry,
        }
    }

    pub(crate) fn spec(&self) -> &KeySpec {
        &self.spec
    }

    /// Returns the cached future for `key`, scheduling a fetch on first use.
    pub(crate) fn load(&self, key: Key) -> RecordFuture<R> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.map.get(&key) {
            self.telemetry.record(LoaderActivity::Hit, 1);
            return entry.future.clone();
        }

        self.telemetry.record(LoaderActivity::Miss, 1);
        let generation = entries.next_generation();
        let future = self.batcher.enqueue(key.clone(), generation).resolve().boxed().shared();
        entries.map.insert(
            key,
            CacheEntry {
                generation,
                future: future.clone(),
            },
        );
        future
    }

    /// Returns the futures cached right now, oldest entry first.
    pub(crate) fn snapshot(&self) -> Vec<RecordFuture<R>> {
        let entries = self.entries.lock();
        let mut cached: Vec<_> = entries.map.values().map(|e| (e.generation, e.future.clone())).collect();
        cached.sort_unstable_by_key(|(generation, _)| *generation);
        cached.into_iter().map(|(_, future)| future).collect()
    }

    /// Caches an already fetched record under its own primary key.
    ///
    /// Does nothing if the record has no primary key or the key is already cached.
    pub(crate) fn backfill(&self, record: &Arc<R>) -> bool {
        let Some(key) = Projection::of(record.as_ref(), &self.spec).into_key() else {
            return false;
        };
        let inserted = self.entries.lock().insert_resolved(key, Arc::clone(record));
        if inserted {
            self.telemetry.record(LoaderActivity::Backfill, 1);
        }
        inserted
    }

    /// Caches `record` under `key` unless `key` is already cached.
    pub(crate) fn prime(&self, key: Key, record: Arc<R>) -> bool {
        let inserted = self.entries.lock().insert_resolved(key, record);
        if inserted {
            self.telemetry.record(LoaderActivity::Primed, 1);
        }
        inserted
    }

    pub(crate) fn clear(&self, key: &Key) -> bool {
        let removed = self.entries.lock().map.remove(key).is_some();
        if removed {
            self.telemetry.record(LoaderActivity::Invalidated, 1);
        }
        removed
    }

    pub(crate) fn clear_all(&self) {
        let mut entries = self.entries.lock();
        let count = entries.map.len();
        entries.map.clear();
        drop(entries);
        self.telemetry.record(LoaderActivity::Cleared, count);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.entries.lock().map.contains_key(key)
    }
}

/// Drops the cache entries created for a failed batch.
///
/// Entries replaced in the meantime (cleared and loaded again, or primed) carry a
/// different generation and are kept.
fn evict_on_failure<R>(entries: Weak<Mutex<Entries<R>>>) -> FailureHook
where
    R: Send + Sync + 'static,
{
    Arc::new(move |members: &[Member]| {
        let Some(entries) = entries.upgrade() else {
            return;
        };
        let mut entries = entries.lock();
        for member in members {
            if entries.map.get(&member.key).is_some_and(|e| e.generation == member.tag) {
                entries.map.remove(&member.key);
            }
        }
    })
}
