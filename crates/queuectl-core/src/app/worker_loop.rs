//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. TaskStore::claim_next() で pending → running（ストアのロック内で完結）
//! 2. TaskRecord::run() でコマンドを実行（ロックは保持しない）
//! 3. TaskStore::enqueue() で結果を永続化
//! 4. 停止シグナルを確認（実行中のコマンドは中断しない）
//!
//! ワーカー同士は TaskStore 以外に共有状態を持ちません。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::QueueError;
use crate::ports::{Clock, Executor, SystemClock, TaskStore};
use crate::queue::{RetryPolicy, TaskRecord};

/// Everything a worker needs; cheap to clone (one clone per worker).
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn TaskStore>,
    pub executor: Arc<dyn Executor>,
    pub policy: RetryPolicy,
    pub clock: Arc<dyn Clock>,
    /// Sleep between claims when the queue is empty.
    pub poll_interval: Duration,
}

impl WorkerContext {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

    pub fn new(store: Arc<dyn TaskStore>, executor: Arc<dyn Executor>) -> Self {
        Self {
            store,
            executor,
            policy: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// One claim -> run -> persist cycle.
///
/// Returns the record in its final state, or `None` when nothing was pending.
pub async fn process_next(ctx: &WorkerContext) -> Result<Option<TaskRecord>, QueueError> {
    let Some(mut record) = ctx.store.claim_next().await? else {
        return Ok(None);
    };

    record
        .run(ctx.executor.as_ref(), &ctx.policy, ctx.clock.as_ref())
        .await?;
    ctx.store.enqueue(&record).await?;

    Ok(Some(record))
}

/// Worker group handle.
/// - `request_shutdown()` (or dropping the handle) stops every worker after
///   its current iteration
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, ctx: WorkerContext) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let ctx = ctx.clone();
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(worker_loop(worker_id, ctx, rx)));
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// In-flight commands are not cancelled; workers just stop claiming.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: WorkerContext,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(worker_id, "worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let idle = match process_next(&ctx).await {
            Ok(Some(record)) => {
                info!(
                    worker_id,
                    task_id = %record.id,
                    state = %record.state,
                    attempts = record.attempts,
                    terminal = record.state.is_terminal(),
                    "task finished"
                );
                false
            }
            Ok(None) => true,
            Err(error) if error.is_storage() => {
                error!(worker_id, %error, "store failure, backing off");
                true
            }
            Err(error) => {
                warn!(worker_id, %error, "worker iteration failed");
                true
            }
        };

        if idle {
            // 空のときだけ待つ。shutdown が来たら待機を打ち切る
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(ctx.poll_interval) => {}
            }
        }
    }

    info!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use crate::impls::{BuiltinExecutor, SqliteStore};
    use crate::queue::TaskState;
    use chrono::Utc;

    async fn context() -> WorkerContext {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        WorkerContext::new(store, Arc::new(BuiltinExecutor))
            .with_poll_interval(Duration::from_millis(10))
    }

    async fn submit(ctx: &WorkerContext, id: &str, command: &str, max_retries: u32) {
        let record = TaskRecord::new(TaskId::from(id), command, max_retries, Utc::now());
        ctx.store.enqueue(&record).await.unwrap();
    }

    #[tokio::test]
    async fn process_next_persists_final_state() {
        let ctx = context().await;
        submit(&ctx, "job1", "echo hi", 3).await;

        let record = process_next(&ctx).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Completed);

        let stored = ctx.store.get(&TaskId::from("job1")).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Completed);
        assert_eq!(stored.attempts, 0);
    }

    #[tokio::test]
    async fn process_next_on_empty_queue() {
        let ctx = context().await;
        assert!(process_next(&ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn worker_group_drains_queue_and_stops() {
        let ctx = context().await;
        for i in 0..8 {
            submit(&ctx, &format!("job{i}"), &format!("echo {i}"), 3).await;
        }
        submit(&ctx, "bad", "bogus", 1).await;

        let group = WorkerGroup::spawn(3, ctx.clone());
        assert_eq!(group.len(), 3);

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let counts = ctx.store.counts_by_state().await.unwrap();
                if counts.completed == 8 && counts.dead == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(drained.is_ok(), "workers did not drain the queue");

        tokio::time::timeout(Duration::from_secs(5), group.shutdown_and_join())
            .await
            .expect("workers did not stop");
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_command() {
        let ctx = context().await;
        submit(&ctx, "slow", "sleep 1", 3).await;

        let group = WorkerGroup::spawn(1, ctx.clone());
        // wait until the worker has claimed it
        loop {
            if ctx.store.counts_by_state().await.unwrap().running == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        group.shutdown_and_join().await;

        let stored = ctx.store.get(&TaskId::from("slow")).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Completed);
    }
}
