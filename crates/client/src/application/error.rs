//! Application error types

use crate::application::dto::{ActionId, SyncStatus};
use crate::ports::outbound::StorageError;

/// Errors from the action queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Durable store refused the write; the in-memory change was rolled back
    #[error("queue storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("queue serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("action {0} not found")]
    NotFound(ActionId),

    /// Only Pending actions can be cancelled
    #[error("action {id} is {status} and cannot be cancelled")]
    NotCancellable { id: ActionId, status: SyncStatus },
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
