//! TaskStore port - 永続化されたタスクの正本（source of truth）
//!
//! すべての状態遷移はストア内部の単一ロックで直列化されます。
//! コマンドの実行はロックの外で行い、長時間のタスクが他の claim を止めないようにします。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::status::QueueCounts;
use crate::domain::TaskId;
use crate::error::QueueError;
use crate::queue::{TaskRecord, TaskState};

/// Durable table of `TaskRecord`s.
///
/// # 設計原則
/// - 変更系の操作は 1 つのクリティカルセクション内で完結する
/// - ストレージ障害時は部分的な書き込みを残さず `QueueError::Storage` を返す
/// - 返される `TaskRecord` は切り離されたコピー（呼び出し側が自由に変更できる）
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert-or-update by id.
    ///
    /// On conflict only the mutable fields (`state`, `attempts`,
    /// `next_attempt_at`, `updated_at`) are overwritten; `command`,
    /// `max_retries` and `created_at` keep their first-insert values.
    async fn enqueue(&self, record: &TaskRecord) -> Result<(), QueueError>;

    /// Insert a new record. An existing id is never touched; it fails with
    /// `AlreadyExists`.
    async fn submit(&self, record: &TaskRecord) -> Result<(), QueueError>;

    /// Atomically move the oldest pending record to running and return it.
    ///
    /// No two callers ever receive the same id.
    async fn claim_next(&self) -> Result<Option<TaskRecord>, QueueError>;

    /// Move every failed record whose deadline is unset or `<= now` back to
    /// pending. Returns the number of records moved.
    async fn requeue_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError>;

    /// Records in `state`, oldest first.
    async fn query_by_state(&self, state: TaskState) -> Result<Vec<TaskRecord>, QueueError>;

    async fn counts_by_state(&self) -> Result<QueueCounts, QueueError>;

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, QueueError>;

    /// Replace a dead record with a fresh pending one under `new_id`.
    ///
    /// The new record copies `command` and `max_retries` and starts at
    /// zero attempts. Fails with `NotFound` for an unknown id and
    /// `InvalidState` if the record is not dead.
    async fn retry_dead(&self, id: &TaskId, new_id: TaskId) -> Result<TaskRecord, QueueError>;

    /// Reset records left running by a crashed process back to pending.
    async fn recover_orphans(&self) -> Result<usize, QueueError>;
}
