//! Per-coordinator counters.

use std::sync::atomic::{AtomicU64, Ordering};

use super::queue::BatchKind;

/// Snapshot of a coordinator's counters.
///
/// All counters only ever increase over the coordinator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// `load` calls, including those served from the cache.
    pub loads_requested: u64,
    /// `load` calls answered by an existing cached future.
    pub cache_hits: u64,
    /// `save` calls accepted for dispatch.
    pub saves_requested: u64,
    /// Load batches handed to the load function.
    pub load_batches: u64,
    /// Save batches handed to the save function.
    pub save_batches: u64,
    /// Batches rejected as a whole (contract violation or batch failure).
    pub rejected_batches: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    loads_requested: AtomicU64,
    cache_hits: AtomicU64,
    saves_requested: AtomicU64,
    load_batches: AtomicU64,
    save_batches: AtomicU64,
    rejected_batches: AtomicU64,
}

impl StatsCounters {
    pub fn record_load(&self) {
        self.loads_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save(&self) {
        self.saves_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, kind: BatchKind) {
        match kind {
            BatchKind::Load => self.load_batches.fetch_add(1, Ordering::Relaxed),
            BatchKind::Save => self.save_batches.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_rejected_batch(&self) {
        self.rejected_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            loads_requested: self.loads_requested.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            saves_requested: self.saves_requested.load(Ordering::Relaxed),
            load_batches: self.load_batches.load(Ordering::Relaxed),
            save_batches: self.save_batches.load(Ordering::Relaxed),
            rejected_batches: self.rejected_batches.load(Ordering::Relaxed),
        }
    }
}
