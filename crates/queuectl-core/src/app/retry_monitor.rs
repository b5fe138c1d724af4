//! RetryMonitor - バックオフ期限を過ぎた failed タスクの回収
//!
//! # フロー
//! 1. 一定周期（既定 1 秒）で TaskStore::requeue_due(now) を呼ぶ
//! 2. failed → pending へ遷移（ワーカーから再び見えるようになる）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::QueueError;
use crate::ports::{Clock, TaskStore};

/// Periodically requeues failed records whose backoff has elapsed.
pub struct RetryMonitor {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl RetryMonitor {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass. Returns the number of records requeued.
    pub async fn tick(&self) -> Result<usize, QueueError> {
        let requeued = self.store.requeue_due(self.clock.now()).await?;
        if requeued > 0 {
            info!(count = requeued, "requeued failed task(s)");
        }
        Ok(requeued)
    }

    /// Run in the background until the returned handle is stopped or dropped.
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        MonitorHandle { shutdown_tx, join }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; start one period in
        ticker.tick().await;
        debug!(interval_ms = self.interval.as_millis() as u64, "retry monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.tick().await {
                        error!(%error, "requeue pass failed");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("retry monitor stopped");
    }
}

/// Handle to a running `RetryMonitor`.
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the monitor and wait for the current pass to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "retry monitor panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::domain::TaskId;
    use crate::impls::SqliteStore;
    use crate::ports::FixedClock;
    use crate::queue::{TaskRecord, TaskState};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    async fn store_with_failed(deadline: DateTime<Utc>) -> (Arc<SqliteStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(start()));
        let store = Arc::new(SqliteStore::in_memory_with_clock(clock.clone()).await.unwrap());
        let mut record = TaskRecord::new(TaskId::from("job1"), "bogus", 3, start());
        record.state = TaskState::Failed;
        record.attempts = 1;
        record.next_attempt_at = Some(deadline);
        store.enqueue(&record).await.unwrap();
        (store, clock)
    }

    #[tokio::test]
    async fn tick_waits_for_deadline() {
        let (store, clock) = store_with_failed(start() + TimeDelta::seconds(2)).await;
        let monitor = RetryMonitor::new(store.clone(), clock.clone());

        assert_eq!(monitor.tick().await.unwrap(), 0);
        clock.advance(TimeDelta::seconds(2));
        assert_eq!(monitor.tick().await.unwrap(), 1);
        assert_eq!(monitor.tick().await.unwrap(), 0);

        let record = store.get(&TaskId::from("job1")).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(record.next_attempt_at, None);
    }

    #[tokio::test]
    async fn background_monitor_requeues_and_stops() {
        let (store, clock) = store_with_failed(start() + TimeDelta::seconds(2)).await;
        let handle = RetryMonitor::new(store.clone(), clock.clone())
            .with_interval(Duration::from_millis(10))
            .spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.counts_by_state().await.unwrap().failed, 1);

        clock.advance(TimeDelta::seconds(5));
        let requeued = tokio::time::timeout(Duration::from_secs(5), async {
            while store.counts_by_state().await.unwrap().pending != 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(requeued.is_ok(), "monitor never requeued the record");

        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("monitor did not stop");
    }
}
