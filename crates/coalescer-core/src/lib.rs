//! coalescer-core: Request coalescing and micro-batching
//!
//! This crate contains the batch coordinator, which:
//! - Defers individual `load`/`save` calls to the next scheduling cycle
//! - Groups queued calls into homogeneous batches (all loads or all saves)
//! - Dispatches each batch through one caller-supplied batch function
//! - Memoizes loads per cache key until a save to that key invalidates them
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               coalescer-core                 │
//! ├─────────────────────────────────────────────┤
//! │  coordinator/ - Batch coordinator           │
//! │    batch_fn.rs  - Batch function traits     │
//! │    options.rs   - Cache / batch size knobs  │
//! │    queue.rs     - Pending queue & batching  │
//! │    dispatch.rs  - Result validation         │
//! │    stats.rs     - Per-instance counters     │
//! │  error.rs     - Error taxonomy              │
//! └─────────────────────────────────────────────┘
//! ```

pub mod coordinator;
pub mod error;

// Re-export commonly used types at the crate root
pub use coordinator::{
    BatchCoordinator, BatchFnResult, BatchKind, BatchLoadFn, BatchOptions, BatchSaveFn,
    CoordinatorStats, ItemResult, LoadFuture, SaveFuture,
};
pub use error::{BatchError, CoordinatorError, CoordinatorResult, ItemError, ValidationError};
