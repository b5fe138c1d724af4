//! Task state machine for the queue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Task state.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed -> Pending (loop until max_retries)
/// - Pending -> Running -> Dead (when max_retries reached)
///
/// A dead record never comes back; a manual retry creates a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Ready to be claimed.
    Pending,

    /// Claimed by a worker.
    Running,

    /// Successfully completed.
    Completed,

    /// Waiting for its backoff deadline.
    Failed,

    /// Failed permanently (dead-letter queue).
    Dead,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Pending,
        TaskState::Running,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Dead,
    ];

    /// Persisted / display name.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Dead => "dead",
        }
    }

    /// Is this a terminal state for the record identity?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Dead)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task state `{0}` (expected one of pending, running, completed, failed, dead)")]
pub struct ParseStateError(pub String);

impl FromStr for TaskState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}
