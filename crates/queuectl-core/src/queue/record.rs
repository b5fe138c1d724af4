//! Task record: the persisted unit of work and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{RetryPolicy, TaskState};
use crate::domain::{Command, TaskId};
use crate::error::QueueError;
use crate::ports::{Clock, Executor};

/// A task as stored in the queue.
///
/// Design:
/// - The store owns the durable copy. A worker only holds a detached copy
///   for one claim -> run -> persist cycle.
/// - `next_attempt_at` is `Some` if and only if `state == Failed`.
/// - `attempts <= max_retries`; reaching `max_retries` on a failure means Dead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub command: String,
    pub state: TaskState,

    /// Number of failed attempts so far.
    pub attempts: u32,
    pub max_retries: u32,

    /// When the record becomes eligible for requeue (Failed only).
    pub next_attempt_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// A fresh pending record with zero attempts.
    pub fn new(
        id: TaskId,
        command: impl Into<String>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            command: command.into(),
            state: TaskState::Pending,
            attempts: 0,
            max_retries,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new pending record that re-runs this record's command from scratch.
    pub fn retried(&self, id: TaskId, now: DateTime<Utc>) -> Self {
        Self::new(id, self.command.clone(), self.max_retries, now)
    }

    /// Remaining failures before the record goes dead.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_retries.saturating_sub(self.attempts)
    }

    /// Execute the command of a claimed record and apply the outcome.
    ///
    /// The record must be `Running` (i.e. returned by `claim_next`); otherwise
    /// this fails with `InvalidState` and nothing is changed.
    pub async fn run(
        &mut self,
        executor: &dyn Executor,
        policy: &RetryPolicy,
        clock: &dyn Clock,
    ) -> Result<TaskState, QueueError> {
        if self.state != TaskState::Running {
            return Err(QueueError::InvalidState {
                id: self.id.clone(),
                state: self.state,
            });
        }

        let outcome = match self.command.parse::<Command>() {
            Ok(command) => {
                executor.execute(&self.id, &command).await;
                Ok(())
            }
            Err(error) => Err(QueueError::InvalidCommand(error)),
        };

        Ok(self.finish(outcome, clock.now(), policy))
    }

    fn finish(
        &mut self,
        outcome: Result<(), QueueError>,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> TaskState {
        match outcome {
            Ok(()) => self.state = TaskState::Completed,
            Err(error) => {
                self.attempts = self.attempts.saturating_add(1);
                self.state = if self.attempts >= self.max_retries {
                    TaskState::Dead
                } else {
                    TaskState::Failed
                };
                warn!(
                    task_id = %self.id,
                    %error,
                    attempts = self.attempts,
                    remaining = self.remaining_attempts(),
                    "task attempt failed"
                );
                if self.state == TaskState::Dead {
                    info!(task_id = %self.id, "task is dead, moving to dead-letter queue");
                }
            }
        }

        self.updated_at = now;
        self.next_attempt_at = match self.state {
            TaskState::Failed => Some(policy.next_attempt_at(now, self.attempts)),
            _ => None,
        };
        self.state
    }
}
