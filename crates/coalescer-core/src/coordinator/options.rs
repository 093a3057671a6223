//! Construction-time options for the batch coordinator.

use std::fmt;
use std::sync::Arc;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Maps a caller key to the key used for load memoization.
pub type CacheKeyFn<K, C> = Arc<dyn Fn(&K) -> C + Send + Sync>;

/// Options for a [`BatchCoordinator`](super::BatchCoordinator).
///
/// Defaults: caching enabled, identity cache keys, unbounded batches.
///
/// # Example
///
/// ```rust
/// use coalescer_core::BatchOptions;
///
/// let options = BatchOptions::<String>::default()
///     .with_max_batch_size(100)
///     .with_cache_key_fn(|key: &String| key.to_lowercase());
///
/// assert_eq!(options.cache_key(&"User:1".to_string()), "user:1");
/// ```
pub struct BatchOptions<K, C = K> {
    /// Whether loads are memoized per cache key.
    ///
    /// When disabled, every `load` enqueues its own item even if the same
    /// key is already pending.
    pub cache: bool,
    /// Upper bound on items per dispatched batch. `None` means unbounded.
    pub max_batch_size: Option<usize>,
    cache_key_fn: CacheKeyFn<K, C>,
}

impl<K> Default for BatchOptions<K, K>
where
    K: Clone + 'static,
{
    fn default() -> Self {
        Self {
            cache: true,
            max_batch_size: None,
            cache_key_fn: Arc::new(|key: &K| key.clone()),
        }
    }
}

impl<K> BatchOptions<K, K>
where
    K: Clone + 'static,
{
    /// Creates options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, C> BatchOptions<K, C> {
    /// Enables or disables load memoization.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Caps the number of items in one dispatched batch.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    /// Removes the batch size cap.
    pub fn with_unbounded_batches(mut self) -> Self {
        self.max_batch_size = None;
        self
    }

    /// Replaces the cache key derivation.
    ///
    /// Keys that map to the same cache key share one cached load, even when
    /// the keys themselves differ.
    pub fn with_cache_key_fn<C2, F>(self, cache_key_fn: F) -> BatchOptions<K, C2>
    where
        F: Fn(&K) -> C2 + Send + Sync + 'static,
    {
        BatchOptions {
            cache: self.cache,
            max_batch_size: self.max_batch_size,
            cache_key_fn: Arc::new(cache_key_fn),
        }
    }

    /// Derives the cache key for `key`.
    pub fn cache_key(&self, key: &K) -> C {
        (self.cache_key_fn)(key)
    }

    /// Number of items the next batch may take from a queue of `queued` items.
    pub fn effective_batch_size(&self, queued: usize) -> usize {
        match self.max_batch_size {
            Some(max) => max.min(queued),
            None => queued,
        }
    }

    /// Validates the options.
    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.max_batch_size == Some(0) {
            return Err(CoordinatorError::Configuration {
                message: "max_batch_size must be a positive integer, got: 0".to_string(),
            });
        }
        Ok(())
    }
}

impl<K, C> Clone for BatchOptions<K, C> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache,
            max_batch_size: self.max_batch_size,
            cache_key_fn: Arc::clone(&self.cache_key_fn),
        }
    }
}

impl<K, C> fmt::Debug for BatchOptions<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("cache", &self.cache)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}
