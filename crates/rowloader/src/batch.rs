// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coalesces loads issued in the same scheduling turn into one batch fetch.
//!
//! The first key enqueued opens a batch and creates its dispatch future. The dispatch
//! future is lazy and shared by every key of the batch. Its first poll seals the batch
//! and calls the batch fetch function with all keys collected so far. Keys enqueued
//! after the batch is sealed open the next batch.
//!
//! Opening a batch spawns a task that yields once and then polls the dispatch, so the
//! batch closes at the end of the turn in which it was opened even if none of its
//! loads is awaited. The task runs on the configured [`Spawner`], or else on the Tokio
//! runtime of the calling thread. Without either, the batch closes when one of its
//! waiters first polls it. Each waiter yields once before polling, so that tasks
//! running in the same turn can still add keys.
//!
//! Equal keys enqueued into the same open batch share a slot, so a batch never
//! carries duplicate keys.

use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyspawn::Spawner;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::align::{BatchAligner, Slot};
use crate::telemetry::{LoaderActivity, LoaderTelemetry};
use crate::{Key, Record, Result};

/// Aligned records of one dispatched batch, indexed like its keys.
type Rows<R> = Arc<[Slot<R>]>;

type Dispatch<R> = Shared<BoxFuture<'static, Result<Rows<R>>>>;

/// Invoked with the tags of every member of a batch whose fetch failed.
pub(crate) type FailureHook = Arc<dyn Fn(&[Member]) + Send + Sync>;

/// A key queued into a batch, with an opaque tag chosen by the caller.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub key: Key,
    pub tag: u64,
}

/// Keys collected for a batch that has not been dispatched yet.
#[derive(Debug, Default)]
struct Queue {
    keys: Vec<Key>,
    members: Vec<Member>,
}

/// Controls how keys are grouped into batches.
#[derive(Debug, Clone, Default)]
pub(crate) struct BatchOptions {
    pub max_batch_size: Option<NonZeroUsize>,
    pub spawner: Option<Spawner>,
}

/// `None` once the batch has been sealed by its dispatch.
type QueueSlot = Arc<Mutex<Option<Queue>>>;

struct OpenBatch<R> {
    queue: QueueSlot,
    dispatch: Dispatch<R>,
}

struct BatcherInner<R> {
    aligner: Arc<BatchAligner<R>>,
    options: BatchOptions,
    on_failure: Option<FailureHook>,
    telemetry: LoaderTelemetry,
    open: Mutex<Option<OpenBatch<R>>>,
}

/// Collects keys into batches and dispatches each batch once.
///
/// Cloning a `Batcher` yields a handle to the same batches.
pub(crate) struct Batcher<R> {
    inner: Arc<BatcherInner<R>>,
}

impl<R> Clone for Batcher<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> Debug for Batcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("aligner", &self.inner.aligner)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// A claim on one slot of a batch.
pub(crate) struct Ticket<R> {
    dispatch: Dispatch<R>,
    index: usize,
}

impl<R> Ticket<R>
where
    R: Record + Send + Sync + 'static,
{
    /// Waits for the batch to be fetched and returns this ticket's record.
    pub(crate) async fn resolve(self) -> Result<Slot<R>> {
        YieldNow::default().await;
        let rows = self.dispatch.await?;
        Ok(rows.get(self.index).cloned().flatten())
    }
}

impl<R> Batcher<R>
where
    R: Record + Send + Sync + 'static,
{
    pub(crate) fn new(
        aligner: BatchAligner<R>,
        options: BatchOptions,
        on_failure: Option<FailureHook>,
        telemetry: LoaderTelemetry,
    ) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                aligner: Arc::new(aligner),
                options,
                on_failure,
                telemetry,
                open: Mutex::new(None),
            }),
        }
    }

    /// Adds `key` to the open batch, opening a new one if needed.
    pub(crate) fn enqueue(&self, key: Key, tag: u64) -> Ticket<R> {
        let mut open = self.inner.open.lock();

        if let Some(batch) = open.as_ref() {
            let mut queue = batch.queue.lock();
            if let Some(queue) = queue.as_mut() {
                let existing = queue.keys.iter().position(|k| *k == key);
                let index = match existing {
                    Some(index) => Some(index),
                    None if self.has_room(queue) => {
                        queue.keys.push(key.clone());
                        Some(queue.keys.len() - 1)
                    }
                    None => None,
                };
                if let Some(index) = index {
                    queue.members.push(Member { key, tag });
                    return Ticket {
                        dispatch: batch.dispatch.clone(),
                        index,
                    };
                }
            }
        }

        let queue = Arc::new(Mutex::new(Some(Queue {
            keys: vec![key.clone()],
            members: vec![Member { key, tag }],
        })));
        let dispatch = self.dispatch(Arc::clone(&queue));
        *open = Some(OpenBatch {
            queue,
            dispatch: dispatch.clone(),
        });
        drop(open);

        self.close_at_end_of_turn(dispatch.clone());
        Ticket { dispatch, index: 0 }
    }

    fn has_room(&self, queue: &Queue) -> bool {
        self.inner.options.max_batch_size.is_none_or(|max| queue.keys.len() < max.get())
    }

    fn close_at_end_of_turn(&self, dispatch: Dispatch<R>) {
        let closer = async move {
            YieldNow::default().await;
            // Waiters observe the outcome through their own handles.
            let _ = dispatch.await;
        };

        match &self.inner.options.spawner {
            Some(spawner) => drop(spawner.spawn(closer)),
            None => {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    drop(runtime.spawn(closer));
                }
            }
        }
    }

    fn dispatch(&self, queue: QueueSlot) -> Dispatch<R> {
        let aligner = Arc::clone(&self.inner.aligner);
        let on_failure = self.inner.on_failure.clone();
        let telemetry = self.inner.telemetry;

        async move {
            let Queue { keys, members } = queue.lock().take().unwrap_or_default();
            telemetry.record(LoaderActivity::Dispatch, keys.len());

            match aligner.fetch(keys).await {
                Ok(rows) => Ok(Rows::from(rows)),
                Err(error) => {
                    telemetry.record(LoaderActivity::FetchFailed, members.len());
                    if let Some(on_failure) = on_failure {
                        on_failure(&members);
                    }
                    Err(error)
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Yields to the executor once, letting other tasks of the current turn run.
#[derive(Debug, Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::executor::block_on;
    use futures::future::join_all;

    use super::*;
    use crate::{KeySpec, Row, Value};

    type Calls = Arc<Mutex<Vec<Vec<Key>>>>;

    fn echo_batcher(max_batch_size: Option<usize>) -> (Batcher<Row>, Calls) {
        let calls = Calls::default();
        let recorded = Arc::clone(&calls);
        let aligner: BatchAligner<Row> = BatchAligner::new(
            KeySpec::from("id"),
            Arc::new(move |keys: Vec<Key>| {
                recorded.lock().push(keys.clone());
                async move {
                    let rows = keys
                        .into_iter()
                        .filter_map(|k| match k {
                            Key::Scalar(v) => Some(Row::new().with("id", v)),
                            Key::Composite(_) => None,
                        })
                        .collect::<Vec<_>>();
                    Ok::<_, std::io::Error>(rows)
                }
            }),
        );
        let options = BatchOptions {
            max_batch_size: max_batch_size.and_then(NonZeroUsize::new),
            spawner: None,
        };
        let batcher = Batcher::new(
            aligner,
            options,
            None,
            LoaderTelemetry::new("test", false),
        );
        (batcher, calls)
    }

    fn id(slot: &Slot<Row>) -> Option<i64> {
        slot.as_ref().and_then(|r| r.get("id")).and_then(Value::as_i64)
    }

    #[test]
    fn same_turn_keys_share_one_dispatch() {
        let (batcher, calls) = echo_batcher(None);
        let tickets: Vec<_> = (1..=3).map(|i| batcher.enqueue(Key::from(i), 0).resolve()).collect();

        let slots = block_on(join_all(tickets));

        let ids: Vec<_> = slots.iter().map(|s| id(s.as_ref().unwrap())).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(*calls.lock(), vec![vec![Key::from(1), Key::from(2), Key::from(3)]]);
    }

    #[test]
    fn equal_keys_share_a_slot() {
        let (batcher, calls) = echo_batcher(None);
        let first = batcher.enqueue(Key::from(7), 0);
        let second = batcher.enqueue(Key::from(7), 1);
        assert_eq!(first.index, second.index);

        block_on(join_all([first.resolve(), second.resolve()]));
        assert_eq!(*calls.lock(), vec![vec![Key::from(7)]]);
    }

    #[test]
    fn sealed_batches_are_not_reused() {
        let (batcher, calls) = echo_batcher(None);
        block_on(batcher.enqueue(Key::from(1), 0).resolve()).unwrap();
        block_on(batcher.enqueue(Key::from(2), 0).resolve()).unwrap();
        assert_eq!(*calls.lock(), vec![vec![Key::from(1)], vec![Key::from(2)]]);
    }

    #[test]
    fn max_batch_size_splits_batches() {
        let (batcher, calls) = echo_batcher(Some(2));
        let tickets: Vec<_> = (1..=5).map(|i| batcher.enqueue(Key::from(i), 0).resolve()).collect();
        block_on(join_all(tickets));

        let sizes: Vec<_> = calls.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn failure_hook_sees_every_member() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = Arc::clone(&seen);
        let hook: FailureHook = Arc::new(move |members: &[Member]| {
            hook_seen.lock().extend(members.iter().map(|m| m.tag));
        });
        let aligner: BatchAligner<Row> = BatchAligner::new(
            KeySpec::from("id"),
            Arc::new(|_keys: Vec<Key>| async move { Err::<Vec<Row>, _>("boom") }),
        );
        let batcher = Batcher::new(aligner, BatchOptions::default(), Some(hook), LoaderTelemetry::new("test", false));

        let first = batcher.enqueue(Key::from(1), 10).resolve();
        let second = batcher.enqueue(Key::from(2), 20).resolve();
        let results = block_on(join_all([first, second]));

        assert!(results.iter().all(|r| r.as_ref().is_err_and(crate::Error::is_fetch)));
        assert_eq!(*seen.lock(), vec![10, 20]);
    }

    #[test]
    fn dispatch_runs_once_for_all_waiters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let aligner: BatchAligner<Row> = BatchAligner::new(
            KeySpec::from("id"),
            Arc::new(move |_keys: Vec<Key>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, std::io::Error>(vec![Row::new().with("id", 1)]) }
            }),
        );
        let batcher = Batcher::new(aligner, BatchOptions::default(), None, LoaderTelemetry::new("test", false));

        let waiters: Vec<_> = (0..4).map(|tag| batcher.enqueue(Key::from(1), tag).resolve()).collect();
        let slots = block_on(join_all(waiters));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slots.iter().all(|s| id(s.as_ref().unwrap()) == Some(1)));
    }

    #[tokio::test]
    async fn spawned_tasks_join_the_batch() {
        let (batcher, calls) = echo_batcher(None);
        let tasks: Vec<_> = (1..=3)
            .map(|i| {
                let batcher = batcher.clone();
                tokio::spawn(async move { batcher.enqueue(Key::from(i), 0).resolve().await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(calls.lock()[0].len(), 3);
    }

    #[tokio::test]
    async fn tasks_of_the_same_turn_join_the_batch() {
        let (batcher, calls) = echo_batcher(None);
        let first = batcher.enqueue(Key::from(1), 0).resolve();

        let late = batcher.clone();
        let joined = async move {
            // Enqueued on first poll, while the batch of `first` is still open.
            late.enqueue(Key::from(2), 0).resolve().await
        };

        let (a, b) = tokio::join!(first, joined);
        assert_eq!(id(&a.unwrap()), Some(1));
        assert_eq!(id(&b.unwrap()), Some(2));
        assert_eq!(calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn unpolled_batches_close_at_the_end_of_their_turn() {
        let (batcher, calls) = echo_batcher(None);
        let first = batcher.enqueue(Key::from(1), 0);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(*calls.lock(), vec![vec![Key::from(1)]]);

        let second = batcher.enqueue(Key::from(2), 0);
        let (a, b) = tokio::join!(first.resolve(), second.resolve());
        assert_eq!(id(&a.unwrap()), Some(1));
        assert_eq!(id(&b.unwrap()), Some(2));
        assert_eq!(*calls.lock(), vec![vec![Key::from(1)], vec![Key::from(2)]]);
    }

    #[tokio::test]
    async fn configured_spawner_closes_batches() {
        let calls = Calls::default();
        let recorded = Arc::clone(&calls);
        let aligner: BatchAligner<Row> = BatchAligner::new(
            KeySpec::from("id"),
            Arc::new(move |keys: Vec<Key>| {
                recorded.lock().push(keys);
                async move { Ok::<_, std::io::Error>(Vec::<Row>::new()) }
            }),
        );
        let options = BatchOptions {
            max_batch_size: None,
            spawner: Some(Spawner::new_tokio()),
        };
        let batcher = Batcher::new(aligner, options, None, LoaderTelemetry::new("test", false));

        drop(batcher.enqueue(Key::from(1), 0));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(*calls.lock(), vec![vec![Key::from(1)]]);
    }

    #[test]
    fn without_a_runtime_the_first_waiter_closes_the_batch() {
        let (batcher, calls) = echo_batcher(None);
        let first = batcher.enqueue(Key::from(1), 0);
        let second = batcher.enqueue(Key::from(2), 0);
        assert!(calls.lock().is_empty());

        block_on(join_all([first.resolve(), second.resolve()]));
        assert_eq!(*calls.lock(), vec![vec![Key::from(1), Key::from(2)]]);
    }
}
