use thiserror::Error;

use crate::domain::{CommandError, TaskId};
use crate::queue::TaskState;

/// Errors surfaced by the store and by `TaskRecord::run`.
///
/// `InvalidCommand` never escapes `TaskRecord::run`: it is folded into the
/// record's state machine as a failed attempt.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandError),

    /// `run()` was called on a record that was never claimed.
    #[error("task {id} is {state}, expected running")]
    InvalidState { id: TaskId, state: TaskState },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A persisted row could not be decoded back into a `TaskRecord`.
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("invalid record {id}: {reason}")]
    InvalidRecord { id: TaskId, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl QueueError {
    /// True for failures of the backing store rather than of the caller.
    pub fn is_storage(&self) -> bool {
        matches!(self, QueueError::Storage(_) | QueueError::CorruptRecord { .. })
    }
}
