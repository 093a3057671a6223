//! Batch function invocation, result validation and distribution.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::warn;

use super::batch_fn::{BatchFnResult, ItemResult};
use super::queue::{BatchKind, Responder};
use crate::error::{CoordinatorError, CoordinatorResult, ValidationError};

/// Awaits one batch function call and checks its result contract.
///
/// A panic, a batch-level `Err`, or a result list whose length differs from
/// `expected` turns into a single error that applies to the whole batch.
pub(crate) async fn run_batch<T, Fut>(
    kind: BatchKind,
    expected: usize,
    call: Fut,
) -> CoordinatorResult<Vec<ItemResult<T>>>
where
    Fut: Future<Output = BatchFnResult<T>>,
{
    let results = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(results)) => results,
        Ok(Err(err)) => {
            warn!(%kind, size = expected, error = %err, "batch function failed");
            return Err(CoordinatorError::BatchFailed {
                kind,
                message: err.message().to_string(),
            });
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(%kind, size = expected, %message, "batch function panicked");
            return Err(ValidationError::Panicked { kind, message }.into());
        }
    };

    if results.len() != expected {
        warn!(
            %kind,
            expected,
            actual = results.len(),
            "batch function returned wrong number of results"
        );
        return Err(ValidationError::LengthMismatch {
            kind,
            expected,
            actual: results.len(),
        }
        .into());
    }

    Ok(results)
}

/// Resolves every caller of a batch.
///
/// On success position `i` of `outcome` goes to responder `i`; per-item
/// errors reject only their own caller. A batch-wide error rejects all.
pub(crate) fn distribute<T>(
    responders: Vec<Responder<T>>,
    outcome: CoordinatorResult<Vec<ItemResult<T>>>,
) {
    // Send errors mean the caller dropped its future; nothing to do.
    match outcome {
        Ok(results) => {
            for (responder, result) in responders.into_iter().zip(results) {
                let _ = responder.send(result.map_err(CoordinatorError::Item));
            }
        }
        Err(err) => {
            for responder in responders {
                let _ = responder.send(Err(err.clone()));
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
