//! Error types for batch coordination.

use thiserror::Error;

use crate::coordinator::BatchKind;

/// Errors surfaced to callers of the batch coordinator.
///
/// Every variant is `Clone` because a single cached load may be awaited by
/// many callers, each of which receives its own copy of the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// Constructor arguments were rejected.
    #[error("invalid coordinator configuration: {message}")]
    Configuration { message: String },

    /// A save was requested from a coordinator built without a save function.
    #[error("{operation} is not supported: coordinator was constructed without a save function")]
    Capability { operation: &'static str },

    /// The batch function broke its result contract; the whole batch fails.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The batch function reported a failure for the batch as a whole.
    #[error("{kind} function failed: {message}")]
    BatchFailed { kind: BatchKind, message: String },

    /// The batch function reported a failure for this one item.
    #[error(transparent)]
    Item(#[from] ItemError),

    /// The coordinator's flush task went away before resolving the request.
    #[error("coordinator stopped before the request was resolved")]
    Dropped,
}

/// Violations of the batch function result contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The result list does not line up with the dispatched batch.
    #[error(
        "{kind} function must return a list of the same length as the list of {}: expected {expected}, got {actual}",
        .kind.subject()
    )]
    LengthMismatch {
        kind: BatchKind,
        expected: usize,
        actual: usize,
    },

    /// The batch function panicked instead of producing a result list.
    #[error("{kind} function panicked instead of returning a list of results: {message}")]
    Panicked { kind: BatchKind, message: String },
}

/// A per-position failure returned inside an otherwise well-formed batch result.
///
/// Only the caller waiting on that position is rejected with it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ItemError {
    message: String,
}

impl ItemError {
    /// Creates an item error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Captures the display text of any error.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(err.to_string())
    }

    /// Message the caller's future fails with.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A failure of the batch function as a whole.
///
/// Every caller in the batch is rejected with
/// [`CoordinatorError::BatchFailed`] carrying this message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BatchError {
    message: String,
}

impl BatchError {
    /// Creates a batch error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Captures the display text of any error.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(err.to_string())
    }

    /// Message the batch function reported; every caller of the batch sees it.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_displays_its_message_verbatim() {
        let err: CoordinatorError = ItemError::new("x").into();
        assert_eq!(err.to_string(), "x");
    }

    #[test]
    fn test_length_mismatch_message_names_load_keys() {
        let err = ValidationError::LengthMismatch {
            kind: BatchKind::Load,
            expected: 3,
            actual: 2,
        };
        let message = err.to_string();
        assert!(message.starts_with("load function"));
        assert!(message.contains("list of keys"));
        assert!(message.contains("expected 3, got 2"));
    }

    #[test]
    fn test_length_mismatch_message_names_save_entries() {
        let err = ValidationError::LengthMismatch {
            kind: BatchKind::Save,
            expected: 1,
            actual: 0,
        };
        let message = err.to_string();
        assert!(message.starts_with("save function"));
        assert!(message.contains("[key, value] entries"));
    }

    #[test]
    fn test_capability_error_names_operation() {
        let err = CoordinatorError::Capability {
            operation: "save_many",
        };
        assert!(err.to_string().starts_with("save_many is not supported"));
    }

    #[test]
    fn test_from_error_captures_display_text() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        assert_eq!(ItemError::from_error(&io).message(), "disk on fire");
        assert_eq!(BatchError::from_error(&io).message(), "disk on fire");
    }
}
