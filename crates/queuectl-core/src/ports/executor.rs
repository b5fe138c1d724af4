//! Executor port - コマンドの実行
//!
//! コマンドの検証は `Command` のパースで完結しているので、
//! Executor は失敗しません。副作用（出力・待機）だけを担当します。

use async_trait::async_trait;

use crate::domain::{Command, TaskId};

/// Performs the side effect of an already-validated command.
///
/// Implementations must not touch the store: `execute` is called with no
/// store lock held and may take as long as the command needs.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, task_id: &TaskId, command: &Command);
}
