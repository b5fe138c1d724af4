//! Subcommand handlers. Each one renders core results to the console.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result, bail};
use queuectl_core::ports::Clock;
use queuectl_core::{
    BuiltinExecutor, IdGenerator, QueueError, RetryMonitor, SqliteStore, SystemClock, TaskId,
    TaskRecord, TaskState, TaskStore, UlidGenerator, WorkerContext, WorkerGroup,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cli::{ConfigCommand, stop_marker_path};
use crate::config::Config;

/// Body of `queuectl enqueue '<json>'`.
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub command: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl JobRequest {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .context("Job must be a JSON object with a string `command`, e.g. '{\"command\":\"echo hi\"}'")
    }

    /// Build the pending record; a missing id is generated, a missing
    /// `max_retries` comes from config.
    pub fn into_record(
        self,
        config: &Config,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<TaskRecord> {
        let max_retries = self.max_retries.unwrap_or(config.max_retries);
        if max_retries == 0 {
            bail!("max_retries must be at least 1");
        }
        let id = match self.id {
            Some(id) if id.trim().is_empty() => bail!("id must not be empty"),
            Some(id) => TaskId::from(id),
            None => ids.generate_task_id(),
        };
        Ok(TaskRecord::new(id, self.command, max_retries, clock.now()))
    }
}

pub async fn enqueue(store: &SqliteStore, config: &Config, job_json: &str) -> Result<()> {
    let record = JobRequest::parse(job_json)?.into_record(
        config,
        &UlidGenerator::new(SystemClock),
        &SystemClock,
    )?;
    match store.submit(&record).await {
        Ok(()) => {}
        Err(QueueError::AlreadyExists(id)) => {
            bail!("Job '{id}' already exists; omit `id` to get a fresh one.")
        }
        Err(e) => return Err(e.into()),
    }
    debug!(task_id = %record.id, command = %record.command, "job enqueued");
    println!("Job '{}' enqueued successfully.", record.id);
    Ok(())
}

pub async fn worker_start(
    store: Arc<SqliteStore>,
    config: &Config,
    count: usize,
    db: &Path,
) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }

    let recovered = store.recover_orphans().await?;
    if recovered > 0 {
        warn!(count = recovered, "reset jobs left running by a previous process");
    }

    let marker = stop_marker_path(db);
    if marker.exists() {
        fs::remove_file(&marker).context("Failed to clear stale stop marker")?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ctx = WorkerContext::new(store.clone(), Arc::new(BuiltinExecutor))
        .with_policy(config.retry_policy()?)
        .with_clock(clock.clone())
        .with_poll_interval(config.poll_interval());
    let monitor = RetryMonitor::new(store, clock)
        .with_interval(config.monitor_interval())
        .spawn();
    let group = WorkerGroup::spawn(count, ctx);

    println!("Started {} worker(s). Press Ctrl+C or run `queuectl worker stop` to stop.", group.len());
    wait_for_stop(&marker).await?;

    println!("Stop signal received. Waiting for running jobs to finish...");
    group.shutdown_and_join().await;
    monitor.stop().await;
    println!("All workers stopped gracefully.");
    Ok(())
}

async fn wait_for_stop(marker: &Path) -> Result<()> {
    let mut poll = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                return Ok(());
            }
            _ = poll.tick() => {
                if marker.exists() {
                    if let Err(e) = fs::remove_file(marker) {
                        warn!(error = %e, "failed to remove stop marker");
                    }
                    return Ok(());
                }
            }
        }
    }
}

pub fn worker_stop(db: &Path) -> Result<()> {
    let marker = stop_marker_path(db);
    fs::write(&marker, b"").context(format!("Failed to write {}", marker.display()))?;
    println!("Stop requested. Workers will exit after their current job.");
    Ok(())
}

pub async fn status(store: &SqliteStore, db: &Path) -> Result<()> {
    let counts = store.counts_by_state().await?;
    println!("Job Status Summary:");
    for (state, count) in counts.iter() {
        println!("  {:<10} {}", state.as_str(), count);
    }
    println!("  {:<10} {}", "total", counts.total());
    if stop_marker_path(db).exists() {
        println!("Worker stop requested (pending pickup).");
    }
    Ok(())
}

pub async fn list(store: &SqliteStore, state: TaskState) -> Result<()> {
    let records = store.query_by_state(state).await?;
    if records.is_empty() {
        println!("No jobs found in state '{state}'.");
        return Ok(());
    }
    println!("Jobs in state '{state}':");
    for record in &records {
        print_record(record);
    }
    Ok(())
}

pub async fn dlq_list(store: &SqliteStore) -> Result<()> {
    let records = store.query_by_state(TaskState::Dead).await?;
    if records.is_empty() {
        println!("No jobs in DLQ.");
        return Ok(());
    }
    println!("Dead Letter Queue:");
    for record in &records {
        print_record(record);
    }
    Ok(())
}

pub async fn dlq_retry(store: &SqliteStore, job_id: &str) -> Result<()> {
    let ids = UlidGenerator::new(SystemClock);
    match store.retry_dead(&TaskId::from(job_id), ids.generate_task_id()).await {
        Ok(fresh) => {
            println!("Retried job '{job_id}' as new job '{}'.", fresh.id);
            Ok(())
        }
        Err(QueueError::NotFound(_)) | Err(QueueError::InvalidState { .. }) => {
            bail!("No DLQ job found with id '{job_id}'.")
        }
        Err(e) => Err(e.into()),
    }
}

pub fn config(path: &Path, command: ConfigCommand) -> Result<()> {
    let mut config = Config::load(path)?;
    match command {
        ConfigCommand::Show => {
            println!("Current Config ({}):", path.display());
            for (key, value) in config.entries() {
                println!("  {key}: {value}");
            }
        }
        ConfigCommand::Set { key, value } => {
            config.set(&key, &value)?;
            config.save(path)?;
            println!("Config '{key}' set to {value}");
        }
    }
    Ok(())
}

fn print_record(record: &TaskRecord) {
    let retry = record
        .next_attempt_at
        .map(|at| format!(" | next attempt {}", at.format("%Y-%m-%d %H:%M:%S")))
        .unwrap_or_default();
    println!(
        "  {} | {:<9} | attempts {}/{}{} | {}",
        record.id,
        record.state.as_str(),
        record.attempts,
        record.max_retries,
        retry,
        record.command
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuectl_core::ports::FixedClock;

    struct FixedIds;

    impl IdGenerator for FixedIds {
        fn generate_task_id(&self) -> TaskId {
            TaskId::from("job-generated")
        }
    }

    fn clock() -> FixedClock {
        FixedClock::new(SystemClock.now())
    }

    #[test]
    fn request_uses_config_defaults() {
        let config = Config::default();
        let record = JobRequest::parse(r#"{"command": "sleep 2"}"#)
            .unwrap()
            .into_record(&config, &FixedIds, &clock())
            .unwrap();

        assert_eq!(record.id, TaskId::from("job-generated"));
        assert_eq!(record.command, "sleep 2");
        assert_eq!(record.max_retries, 3);
        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(record.attempts, 0);
    }

    #[test]
    fn request_overrides() {
        let record = JobRequest::parse(r#"{"id": "job1", "command": "echo hi", "max_retries": 7}"#)
            .unwrap()
            .into_record(&Config::default(), &FixedIds, &clock())
            .unwrap();

        assert_eq!(record.id, TaskId::from("job1"));
        assert_eq!(record.max_retries, 7);
    }

    #[test]
    fn malformed_requests_are_rejected() {
        assert!(JobRequest::parse("echo hi").is_err());
        assert!(JobRequest::parse(r#"{"cmd": "echo hi"}"#).is_err());
        assert!(JobRequest::parse(r#"{"command": 5}"#).is_err());

        let zero = JobRequest::parse(r#"{"command": "echo", "max_retries": 0}"#).unwrap();
        assert!(zero.into_record(&Config::default(), &FixedIds, &clock()).is_err());

        let blank = JobRequest::parse(r#"{"command": "echo", "id": " "}"#).unwrap();
        assert!(blank.into_record(&Config::default(), &FixedIds, &clock()).is_err());
    }

    #[tokio::test]
    async fn dlq_retry_of_unknown_job_fails() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(dlq_retry(&store, "missing").await.is_err());
    }

    #[tokio::test]
    async fn enqueue_persists_pending_job() {
        let store = SqliteStore::in_memory().await.unwrap();
        enqueue(&store, &Config::default(), r#"{"id": "job1", "command": "echo hi"}"#)
            .await
            .unwrap();

        let record = store.get(&TaskId::from("job1")).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(record.max_retries, 3);
    }

    #[tokio::test]
    async fn enqueue_refuses_existing_id() {
        let store = SqliteStore::in_memory().await.unwrap();
        enqueue(&store, &Config::default(), r#"{"id": "job1", "command": "echo first"}"#)
            .await
            .unwrap();
        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, TaskId::from("job1"));

        let resubmit =
            enqueue(&store, &Config::default(), r#"{"id": "job1", "command": "echo second"}"#).await;
        assert!(resubmit.is_err());

        let stored = store.get(&TaskId::from("job1")).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Running);
        assert_eq!(stored.command, "echo first");
        assert!(store.claim_next().await.unwrap().is_none());
    }
}
