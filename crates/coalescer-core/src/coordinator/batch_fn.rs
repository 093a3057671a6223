//! Batch function traits.
//!
//! A batch function receives every key (or key/value entry) of one
//! dispatched batch and must answer with exactly one result per position,
//! in the same order. Plain async functions and closures implement these
//! traits through blanket impls; stateful collaborators implement them
//! directly with `#[async_trait]`.

use std::future::Future;

use async_trait::async_trait;

use crate::error::{BatchError, ItemError};

/// Outcome for one position of a batch.
pub type ItemResult<T> = Result<T, ItemError>;

/// Outcome of one batch function call.
///
/// `Err` fails the whole batch; `Ok` must hold one [`ItemResult`] per
/// dispatched position.
pub type BatchFnResult<T> = Result<Vec<ItemResult<T>>, BatchError>;

/// Fetches values for a batch of keys.
#[async_trait]
pub trait BatchLoadFn<K, V>: Send + Sync {
    async fn load(&self, keys: Vec<K>) -> BatchFnResult<V>;
}

/// Persists a batch of key/value entries.
///
/// `R` is whatever the persistence layer reports back per entry.
#[async_trait]
pub trait BatchSaveFn<K, W, R>: Send + Sync {
    async fn save(&self, entries: Vec<(K, W)>) -> BatchFnResult<R>;
}

#[async_trait]
impl<K, V, F, Fut> BatchLoadFn<K, V> for F
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync,
    Fut: Future<Output = BatchFnResult<V>> + Send + 'static,
{
    async fn load(&self, keys: Vec<K>) -> BatchFnResult<V> {
        (self)(keys).await
    }
}

#[async_trait]
impl<K, W, R, F, Fut> BatchSaveFn<K, W, R> for F
where
    K: Send + 'static,
    W: Send + 'static,
    R: Send + 'static,
    F: Fn(Vec<(K, W)>) -> Fut + Send + Sync,
    Fut: Future<Output = BatchFnResult<R>> + Send + 'static,
{
    async fn save(&self, entries: Vec<(K, W)>) -> BatchFnResult<R> {
        (self)(entries).await
    }
}
