//! coalescer: batch coordinator with settings and logging
//!
//! Re-exports the coordinator from `coalescer-core` and adds the pieces an
//! application needs around it:
//! - [`config`] - YAML / environment settings mapped onto [`BatchOptions`]
//! - [`observability`] - `tracing-subscriber` setup for coordinator events
//!
//! # Example
//!
//! ```ignore
//! use coalescer::{observability::init_logging, BatchCoordinator, CoalescerSettings};
//!
//! let settings = CoalescerSettings::load("coalescer.yaml")?;
//! init_logging(settings.logging_config());
//!
//! let users = BatchCoordinator::load_only(fetch_users, settings.batch_options())?;
//! let alice = users.load(1).await?;
//! ```

pub mod config;
pub mod observability;

pub use coalescer_core::{
    BatchCoordinator, BatchError, BatchFnResult, BatchKind, BatchLoadFn, BatchOptions,
    BatchSaveFn, CoordinatorError, CoordinatorResult, CoordinatorStats, ItemError, ItemResult,
    LoadFuture, SaveFuture, ValidationError,
};
pub use config::{CoalescerSettings, ConfigLoadError};
