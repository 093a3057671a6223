//! Observability for coalescer.
//!
//! The coordinator emits `tracing` events (batch dispatch at DEBUG, cache
//! hits at TRACE, rejected batches at WARN). This module installs a
//! subscriber that renders them as text or JSON.

mod logging;

pub use logging::{build_subscriber, init_logging, LogFormat, LoggingConfig};
