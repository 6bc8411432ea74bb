//! Cooperative cancellation for store operations.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{PersistenceError, Result};

/// Runs `operation` unless `cancel` fires first.
///
/// An already-cancelled token short-circuits without polling the operation.
/// Dropping a half-finished database transaction rolls it back.
pub async fn guard<T, F>(cancel: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(PersistenceError::Cancelled);
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PersistenceError::Cancelled),
        result = operation => result,
    }
}
