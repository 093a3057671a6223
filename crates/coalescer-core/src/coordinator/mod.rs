//! Batch coordinator with load coalescing and micro-batching.
//!
//! Callers issue individual `load` and `save` requests. The coordinator:
//!
//! 1. **Defers**: the first request into an idle coordinator schedules one
//!    flush task on the Tokio runtime. The task yields once before draining,
//!    so every request issued in the same caller turn joins the same batch.
//! 2. **Batches**: the flush loop repeatedly removes the longest same-kind
//!    prefix of the queue (bounded by `max_batch_size`) and awaits the
//!    matching batch function. Batches run strictly one after another.
//! 3. **Coalesces**: with caching enabled, a `load` whose cache key already
//!    has a future returns that future instead of enqueueing.
//! 4. **Invalidates**: `save` drops the cached load for its cache key before
//!    it enqueues, so later loads always fetch fresh data.
//!
//! # Result contract
//!
//! A batch function must return one result per dispatched position. A wrong
//! length, a panic, or a batch-level `Err` rejects every caller of that
//! batch; an `Err` at a single position rejects only that caller.
//!
//! # Scheduling
//!
//! The flush task is spawned on the runtime of whoever issues the request,
//! falling back to the runtime the coordinator was built in. If that runtime
//! has shut down, queued callers fail with [`CoordinatorError::Dropped`] and
//! the next request schedules afresh.
//!
//! On a current-thread runtime (the `#[tokio::test]` default) the flush runs
//! only after the issuing task yields, which gives exact same-turn batching.
//! On a multi-thread runtime a flush may start on another worker while the
//! caller is still issuing requests. A single `load_many` or `save_many`
//! call is enqueued under one lock and never split further than
//! `max_batch_size` requires; separate `load` calls may land in the next
//! batch of the same flush loop.
//!
//! # Example
//!
//! ```rust
//! use coalescer_core::{BatchCoordinator, BatchFnResult, BatchOptions};
//!
//! async fn fetch_users(ids: Vec<u32>) -> BatchFnResult<String> {
//!     Ok(ids.into_iter().map(|id| Ok(format!("user-{id}"))).collect())
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let users: BatchCoordinator<u32, String> =
//!     BatchCoordinator::load_only(fetch_users, BatchOptions::default()).unwrap();
//!
//! let names = users.load_many([1, 2, 3]).await.unwrap();
//! assert_eq!(names, vec!["user-1", "user-2", "user-3"]);
//! # }
//! ```

mod batch_fn;
mod dispatch;
mod options;
mod queue;
mod stats;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, debug_span, trace, warn, Instrument};

use crate::error::{CoordinatorError, CoordinatorResult};

pub use batch_fn::{BatchFnResult, BatchLoadFn, BatchSaveFn, ItemResult};
pub use options::{BatchOptions, CacheKeyFn};
pub use queue::BatchKind;
pub use stats::CoordinatorStats;

use dispatch::{distribute, run_batch};
use queue::{Batch, LoadRequest, PendingQueue, SaveRequest};
use stats::StatsCounters;

/// Future returned by [`BatchCoordinator::load`].
///
/// Cloneable; every clone resolves to the same outcome. Two loads served by
/// the same cache entry return handles for which [`LoadFuture::ptr_eq`] holds.
pub struct LoadFuture<V> {
    inner: Shared<BoxFuture<'static, CoordinatorResult<V>>>,
}

impl<V> LoadFuture<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn from_receiver(receiver: oneshot::Receiver<CoordinatorResult<V>>) -> Self {
        let inner = receiver
            .map(|received| received.unwrap_or_else(|_| Err(CoordinatorError::Dropped)))
            .boxed()
            .shared();
        Self { inner }
    }

    /// Whether both handles refer to the same underlying load.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<V: Clone> Clone for LoadFuture<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone> Future for LoadFuture<V> {
    type Output = CoordinatorResult<V>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<V> fmt::Debug for LoadFuture<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFuture").finish_non_exhaustive()
    }
}

/// Future returned by [`BatchCoordinator::save`].
pub type SaveFuture<R> = BoxFuture<'static, CoordinatorResult<R>>;

/// Coalescing, micro-batching front for a batch load function and an
/// optional batch save function.
///
/// Type parameters: `K` key, `V` loaded value, `C` cache key, `W` saved
/// value, `R` per-entry save result.
///
/// Cloning is cheap and every clone shares the same queue and cache.
pub struct BatchCoordinator<K, V, C = K, W = V, R = ()> {
    inner: Arc<Inner<K, V, C, W, R>>,
}

struct Inner<K, V, C, W, R> {
    load_fn: Box<dyn BatchLoadFn<K, V>>,
    save_fn: Option<Box<dyn BatchSaveFn<K, W, R>>>,
    options: BatchOptions<K, C>,
    state: Mutex<State<K, V, C, W, R>>,
    stats: StatsCounters,
    runtime: Handle,
}

struct State<K, V, C, W, R> {
    queue: PendingQueue<LoadRequest<K, V>, SaveRequest<K, W, R>>,
    cache: HashMap<C, LoadFuture<V>>,
    /// Set while a flush task is scheduled or running.
    flushing: bool,
}

impl<K, V, C> BatchCoordinator<K, V, C>
where
    K: Send + 'static,
    V: Clone + Send + Sync + 'static,
    C: Eq + Hash + Send + 'static,
{
    /// Creates a coordinator that only loads.
    ///
    /// `save` and `save_many` on the result fail with
    /// [`CoordinatorError::Capability`].
    ///
    /// Must be called from within a Tokio runtime, which serves as the
    /// fallback for requests issued outside any runtime.
    pub fn load_only<L>(load_fn: L, options: BatchOptions<K, C>) -> CoordinatorResult<Self>
    where
        L: BatchLoadFn<K, V> + 'static,
    {
        Self::build(Box::new(load_fn), None, options)
    }
}

impl<K, V, C, W, R> BatchCoordinator<K, V, C, W, R>
where
    K: Send + 'static,
    V: Clone + Send + Sync + 'static,
    C: Eq + Hash + Send + 'static,
    W: Send + 'static,
    R: Send + 'static,
{
    /// Creates a coordinator that loads and saves.
    ///
    /// Must be called from within a Tokio runtime, which serves as the
    /// fallback for requests issued outside any runtime.
    pub fn with_save<L, S>(
        load_fn: L,
        save_fn: S,
        options: BatchOptions<K, C>,
    ) -> CoordinatorResult<Self>
    where
        L: BatchLoadFn<K, V> + 'static,
        S: BatchSaveFn<K, W, R> + 'static,
    {
        Self::build(Box::new(load_fn), Some(Box::new(save_fn)), options)
    }

    fn build(
        load_fn: Box<dyn BatchLoadFn<K, V>>,
        save_fn: Option<Box<dyn BatchSaveFn<K, W, R>>>,
        options: BatchOptions<K, C>,
    ) -> CoordinatorResult<Self> {
        options.validate()?;
        let runtime = Handle::try_current().map_err(|err| CoordinatorError::Configuration {
            message: format!("a Tokio runtime is required to schedule flushes: {err}"),
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                load_fn,
                save_fn,
                options,
                state: Mutex::new(State {
                    queue: PendingQueue::new(),
                    cache: HashMap::new(),
                    flushing: false,
                }),
                stats: StatsCounters::default(),
                runtime,
            }),
        })
    }

    /// Requests the value for `key`.
    ///
    /// The request is enqueued immediately; the returned future only waits
    /// for the outcome. With caching enabled, a key whose cache key already
    /// has a future gets that same future back and nothing is enqueued.
    pub fn load(&self, key: K) -> LoadFuture<V> {
        let inner = &self.inner;
        inner.stats.record_load();
        let cache_key = inner.load_cache_key(&key);

        let mut state = inner.lock_state();
        let future = inner.enqueue_load(&mut state, key, cache_key);
        let schedule = inner.claim_flush(&mut state);
        drop(state);

        if schedule {
            inner.schedule_flush();
        }
        future
    }

    /// Requests the values for `keys`, in order.
    ///
    /// All loads are enqueued under one lock, so a flush on another worker
    /// thread cannot split them across more batches than `max_batch_size`
    /// requires. The future fails with the first failure it observes.
    pub fn load_many<I>(&self, keys: I) -> BoxFuture<'static, CoordinatorResult<Vec<V>>>
    where
        I: IntoIterator<Item = K>,
    {
        let inner = &self.inner;
        let requests: Vec<(K, Option<C>)> = keys
            .into_iter()
            .map(|key| {
                inner.stats.record_load();
                let cache_key = inner.load_cache_key(&key);
                (key, cache_key)
            })
            .collect();

        let mut state = inner.lock_state();
        let loads: Vec<LoadFuture<V>> = requests
            .into_iter()
            .map(|(key, cache_key)| inner.enqueue_load(&mut state, key, cache_key))
            .collect();
        let schedule = inner.claim_flush(&mut state);
        drop(state);

        if schedule {
            inner.schedule_flush();
        }
        future::try_join_all(loads).boxed()
    }

    /// Requests that `value` be saved under `key`.
    ///
    /// Any cached load for the key's cache key is dropped right away, so a
    /// load issued after this call fetches fresh data even if the save has
    /// not been dispatched yet.
    pub fn save(&self, key: K, value: W) -> SaveFuture<R> {
        let inner = &self.inner;
        if inner.save_fn.is_none() {
            warn!("save called on a load-only coordinator");
            return future::ready(Err(CoordinatorError::Capability { operation: "save" })).boxed();
        }
        inner.stats.record_save();
        let cache_key = inner.load_cache_key(&key);

        let mut state = inner.lock_state();
        let future = inner.enqueue_save(&mut state, key, value, cache_key);
        let schedule = inner.claim_flush(&mut state);
        drop(state);

        if schedule {
            inner.schedule_flush();
        }
        future
    }

    /// Requests every `(key, value)` save, in order, and collects the results
    /// positionally. Like `load_many`, the entries are enqueued together.
    pub fn save_many<I>(&self, entries: I) -> BoxFuture<'static, CoordinatorResult<Vec<R>>>
    where
        I: IntoIterator<Item = (K, W)>,
    {
        let inner = &self.inner;
        if inner.save_fn.is_none() {
            warn!("save_many called on a load-only coordinator");
            return future::ready(Err(CoordinatorError::Capability {
                operation: "save_many",
            }))
            .boxed();
        }

        let requests: Vec<(K, W, Option<C>)> = entries
            .into_iter()
            .map(|(key, value)| {
                inner.stats.record_save();
                let cache_key = inner.load_cache_key(&key);
                (key, value, cache_key)
            })
            .collect();

        let mut state = inner.lock_state();
        let saves: Vec<SaveFuture<R>> = requests
            .into_iter()
            .map(|(key, value, cache_key)| inner.enqueue_save(&mut state, key, value, cache_key))
            .collect();
        let schedule = inner.claim_flush(&mut state);
        drop(state);

        if schedule {
            inner.schedule_flush();
        }
        future::try_join_all(saves).boxed()
    }

    /// Drops the cached load for `key`'s cache key.
    ///
    /// Returns whether an entry was removed.
    pub fn clear(&self, key: &K) -> bool {
        let cache_key = self.inner.options.cache_key(key);
        self.inner.lock_state().cache.remove(&cache_key).is_some()
    }

    /// Drops every cached load.
    pub fn clear_all(&self) {
        self.inner.lock_state().cache.clear();
    }

    /// Requests enqueued but not yet handed to a batch function.
    pub fn pending_len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// Number of cached loads.
    pub fn cached_len(&self) -> usize {
        self.inner.lock_state().cache.len()
    }

    /// Whether the coordinator was built with a save function.
    pub fn can_save(&self) -> bool {
        self.inner.save_fn.is_some()
    }

    pub fn options(&self) -> &BatchOptions<K, C> {
        &self.inner.options
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.inner.stats.snapshot()
    }
}

impl<K, V, C, W, R> Inner<K, V, C, W, R>
where
    K: Send + 'static,
    V: Clone + Send + Sync + 'static,
    C: Eq + Hash + Send + 'static,
    W: Send + 'static,
    R: Send + 'static,
{
    fn lock_state(&self) -> MutexGuard<'_, State<K, V, C, W, R>> {
        // No panic can occur while the guard is held, so the state is
        // consistent even if a poisoned lock is observed.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache key for `key`, or `None` when caching is disabled.
    fn load_cache_key(&self, key: &K) -> Option<C> {
        self.options.cache.then(|| self.options.cache_key(key))
    }

    fn enqueue_load(
        &self,
        state: &mut State<K, V, C, W, R>,
        key: K,
        cache_key: Option<C>,
    ) -> LoadFuture<V> {
        if let Some(existing) = cache_key.as_ref().and_then(|ck| state.cache.get(ck)) {
            self.stats.record_cache_hit();
            trace!("load served from cache");
            return existing.clone();
        }

        let (responder, receiver) = oneshot::channel();
        let future = LoadFuture::from_receiver(receiver);
        if let Some(cache_key) = cache_key {
            state.cache.insert(cache_key, future.clone());
        }
        state.queue.push_load(LoadRequest { key, responder });
        future
    }

    fn enqueue_save(
        &self,
        state: &mut State<K, V, C, W, R>,
        key: K,
        value: W,
        cache_key: Option<C>,
    ) -> SaveFuture<R> {
        if let Some(cache_key) = cache_key {
            if state.cache.remove(&cache_key).is_some() {
                trace!("save invalidated cached load");
            }
        }

        let (responder, receiver) = oneshot::channel();
        state.queue.push_save(SaveRequest {
            key,
            value,
            responder,
        });

        async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(CoordinatorError::Dropped))
        }
        .boxed()
    }

    /// Marks a flush as owed if work is queued and none is active.
    ///
    /// The caller must call [`Inner::schedule_flush`] after releasing the
    /// lock when this returns `true`.
    fn claim_flush(&self, state: &mut State<K, V, C, W, R>) -> bool {
        if state.flushing || state.queue.len() == 0 {
            return false;
        }
        state.flushing = true;
        true
    }

    /// Spawns the flush task on the caller's runtime, or on the runtime the
    /// coordinator was built in when called from outside one.
    ///
    /// Must not be called with the state lock held: a runtime that has shut
    /// down drops the task inside `spawn`, and [`FlushGuard`] then locks the
    /// state to reject the queue.
    fn schedule_flush(self: &Arc<Self>) {
        let runtime = Handle::try_current().unwrap_or_else(|_| self.runtime.clone());
        debug!("scheduling flush");

        let guard = FlushGuard {
            inner: Arc::clone(self),
            finished: false,
        };
        runtime.spawn(guard.run());
    }

    /// Drains the queue one homogeneous batch at a time.
    async fn flush(self: Arc<Self>) {
        loop {
            let (batch, remaining) = {
                let mut state = self.lock_state();
                let limit = self.options.effective_batch_size(state.queue.len());
                match state.queue.take_batch(limit) {
                    Some(batch) => (batch, state.queue.len()),
                    None => {
                        state.flushing = false;
                        debug!("queue drained");
                        return;
                    }
                }
            };

            let kind = batch.kind();
            let span = debug_span!("dispatch", %kind, size = batch.len());
            let rejected = async {
                debug!(remaining, "dispatching batch");
                self.stats.record_batch(kind);
                match batch {
                    Batch::Load(requests) => self.dispatch_load(requests).await,
                    Batch::Save(requests) => self.dispatch_save(requests).await,
                }
            }
            .instrument(span)
            .await;

            if rejected {
                self.stats.record_rejected_batch();
            }
        }
    }

    /// Returns whether the batch was rejected as a whole.
    async fn dispatch_load(&self, requests: Vec<LoadRequest<K, V>>) -> bool {
        let (keys, responders): (Vec<K>, Vec<_>) = requests
            .into_iter()
            .map(|request| (request.key, request.responder))
            .unzip();

        let outcome = run_batch(BatchKind::Load, keys.len(), self.load_fn.load(keys)).await;
        let rejected = outcome.is_err();
        distribute(responders, outcome);
        rejected
    }

    /// Returns whether the batch was rejected as a whole.
    async fn dispatch_save(&self, requests: Vec<SaveRequest<K, W, R>>) -> bool {
        let (entries, responders): (Vec<(K, W)>, Vec<_>) = requests
            .into_iter()
            .map(|request| ((request.key, request.value), request.responder))
            .unzip();

        let outcome = match &self.save_fn {
            Some(save_fn) => run_batch(BatchKind::Save, entries.len(), save_fn.save(entries)).await,
            None => Err(CoordinatorError::Capability { operation: "save" }),
        };
        let rejected = outcome.is_err();
        distribute(responders, outcome);
        rejected
    }

    /// Called when a flush task is dropped before draining the queue.
    ///
    /// Clears `flushing` so the next request schedules a new flush, drops
    /// every queued responder (callers see [`CoordinatorError::Dropped`])
    /// and evicts the cached loads that would otherwise resolve to that
    /// error forever.
    fn abandon_flush(&self) {
        let abandoned = {
            let mut state = self.lock_state();
            state.flushing = false;
            let batches = state.queue.take_all();
            if self.options.cache {
                for batch in &batches {
                    if let Batch::Load(requests) = batch {
                        for request in requests {
                            state.cache.remove(&self.options.cache_key(&request.key));
                        }
                    }
                }
            }
            batches
        };

        let rejected: usize = abandoned.iter().map(Batch::len).sum();
        warn!(rejected, "flush task dropped before the queue drained");
    }
}

/// Owns a scheduled flush.
///
/// If the task is dropped before the flush loop returns, for example when
/// the runtime shuts down, the guard hands the queue back.
struct FlushGuard<K, V, C, W, R>
where
    K: Send + 'static,
    V: Clone + Send + Sync + 'static,
    C: Eq + Hash + Send + 'static,
    W: Send + 'static,
    R: Send + 'static,
{
    inner: Arc<Inner<K, V, C, W, R>>,
    finished: bool,
}

impl<K, V, C, W, R> FlushGuard<K, V, C, W, R>
where
    K: Send + 'static,
    V: Clone + Send + Sync + 'static,
    C: Eq + Hash + Send + 'static,
    W: Send + 'static,
    R: Send + 'static,
{
    async fn run(mut self) {
        tokio::task::yield_now().await;
        Arc::clone(&self.inner).flush().await;
        self.finished = true;
    }
}

impl<K, V, C, W, R> Drop for FlushGuard<K, V, C, W, R>
where
    K: Send + 'static,
    V: Clone + Send + Sync + 'static,
    C: Eq + Hash + Send + 'static,
    W: Send + 'static,
    R: Send + 'static,
{
    fn drop(&mut self) {
        if !self.finished {
            self.inner.abandon_flush();
        }
    }
}

impl<K, V, C, W, R> Clone for BatchCoordinator<K, V, C, W, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, C, W, R> fmt::Debug for BatchCoordinator<K, V, C, W, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("options", &self.inner.options)
            .field("can_save", &self.inner.save_fn.is_some())
            .field("stats", &self.inner.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod queue_proptest;
