//! BuiltinExecutor - `echo` と `sleep` の実行

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Command, TaskId};
use crate::ports::Executor;

/// Runs the two built-in opcodes.
///
/// `echo` prints `task <id>: <text>` to stdout. `sleep` suspends only the
/// calling worker task.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinExecutor;

#[async_trait]
impl Executor for BuiltinExecutor {
    async fn execute(&self, task_id: &TaskId, command: &Command) {
        match command {
            Command::Echo(text) => {
                println!("task {task_id}: {text}");
            }
            Command::Sleep(seconds) => {
                debug!(%task_id, seconds, "sleeping");
                tokio::time::sleep(Duration::from_secs(*seconds)).await;
            }
        }
    }
}
