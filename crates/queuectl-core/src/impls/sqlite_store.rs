//! SQLite implementation of TaskStore.
//!
//! 1 本の接続を `tokio::sync::Mutex` で保護し、すべての操作をその
//! クリティカルセクション内で実行します（単一ロック方式）。
//! claim と requeue は単一の UPDATE 文なので、同じファイルを開いている
//! 別プロセスに対してもアトミックです。

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow};
use sqlx::{Connection, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::app::status::QueueCounts;
use crate::domain::TaskId;
use crate::error::QueueError;
use crate::ports::{Clock, SystemClock, TaskStore};
use crate::queue::{TaskRecord, TaskState};

const COLUMNS: &str =
    "id, command, state, attempts, max_retries, next_attempt_at, created_at, updated_at";

/// SQLite-backed task store.
pub struct SqliteStore {
    conn: Mutex<SqliteConnection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::connect_with(options, Arc::new(SystemClock)).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self, QueueError> {
        Self::in_memory_with_clock(Arc::new(SystemClock)).await
    }

    pub async fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect_with(options, clock).await
    }

    pub async fn connect_with(
        options: SqliteConnectOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, QueueError> {
        let mut conn = SqliteConnection::connect_with(&options).await?;
        run_migrations(&mut conn).await?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }
}

async fn run_migrations(conn: &mut SqliteConnection) -> Result<(), QueueError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_list (
            id TEXT PRIMARY KEY,
            command TEXT NOT NULL,
            state TEXT NOT NULL
                CHECK(state IN ('pending', 'running', 'completed', 'failed', 'dead')),
            attempts INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL,
            next_attempt_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_task_list_state
        ON task_list(state, created_at)
        "#,
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn enqueue(&self, record: &TaskRecord) -> Result<(), QueueError> {
        validate(record)?;
        let mut conn = self.conn.lock().await;
        upsert(&mut conn, record).await?;
        debug!(task_id = %record.id, state = %record.state, "record persisted");
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<TaskRecord>, QueueError> {
        let now = encode_timestamp(&self.clock.now());
        let mut conn = self.conn.lock().await;
        // 復元できない行は claim ごとロールバックする（running に残さない）
        let mut tx = conn.begin().await?;

        // Select + update in one statement: the row is flipped to running
        // before any other caller can see it as pending.
        let sql = format!(
            r#"
            UPDATE task_list
            SET state = 'running', updated_at = ?
            WHERE state = 'pending' AND id = (
                SELECT id FROM task_list
                WHERE state = 'pending'
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
        let record = row.as_ref().map(decode_record).transpose()?;
        tx.commit().await?;
        drop(conn);

        if let Some(record) = &record {
            debug!(task_id = %record.id, attempts = record.attempts, "claimed");
        }
        Ok(record)
    }

    async fn submit(&self, record: &TaskRecord) -> Result<(), QueueError> {
        validate(record)?;
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(
            r#"
            INSERT INTO task_list
                (id, command, state, attempts, max_retries, next_attempt_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.command.as_str())
        .bind(record.state.as_str())
        .bind(i64::from(record.attempts))
        .bind(i64::from(record.max_retries))
        .bind(record.next_attempt_at.as_ref().map(encode_timestamp))
        .bind(encode_timestamp(&record.created_at))
        .bind(encode_timestamp(&record.updated_at))
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => {
                debug!(task_id = %record.id, "record submitted");
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(QueueError::AlreadyExists(record.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn requeue_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let now = encode_timestamp(&now);
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(
            r#"
            UPDATE task_list
            SET state = 'pending', next_attempt_at = NULL, updated_at = ?
            WHERE state = 'failed'
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
            "#,
        )
        .bind(now.as_str())
        .bind(now.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn query_by_state(&self, state: TaskState) -> Result<Vec<TaskRecord>, QueueError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM task_list WHERE state = ? ORDER BY created_at ASC, rowid ASC"
        );
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(&sql)
            .bind(state.as_str())
            .fetch_all(&mut *conn)
            .await?;
        drop(conn);

        rows.iter().map(decode_record).collect()
    }

    async fn counts_by_state(&self) -> Result<QueueCounts, QueueError> {
        let mut conn = self.conn.lock().await;
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(id) FROM task_list GROUP BY state")
                .fetch_all(&mut *conn)
                .await?;
        drop(conn);

        let mut counts = QueueCounts::default();
        for (state, count) in rows {
            let parsed = state
                .parse::<TaskState>()
                .map_err(|e| QueueError::CorruptRecord {
                    id: format!("<state {state}>"),
                    reason: e.to_string(),
                })?;
            counts.add(parsed, count.max(0) as usize);
        }
        Ok(counts)
    }

    async fn get(&self, id: &TaskId) -> Result<Option<TaskRecord>, QueueError> {
        let sql = format!("SELECT {COLUMNS} FROM task_list WHERE id = ?");
        let mut conn = self.conn.lock().await;
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
        drop(conn);

        row.as_ref().map(decode_record).transpose()
    }

    async fn retry_dead(&self, id: &TaskId, new_id: TaskId) -> Result<TaskRecord, QueueError> {
        let now = self.clock.now();
        let sql = format!("SELECT {COLUMNS} FROM task_list WHERE id = ?");

        let mut conn = self.conn.lock().await;
        // Dropping `tx` on an early return rolls everything back.
        let mut tx = conn.begin().await?;

        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(QueueError::NotFound(id.clone()));
        };
        let dead = decode_record(&row)?;
        if dead.state != TaskState::Dead {
            return Err(QueueError::InvalidState {
                id: dead.id,
                state: dead.state,
            });
        }

        let fresh = dead.retried(new_id, now);
        sqlx::query("DELETE FROM task_list WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        upsert(&mut tx, &fresh).await?;
        tx.commit().await?;

        info!(old_id = %id, new_id = %fresh.id, "dead task requeued as new record");
        Ok(fresh)
    }

    async fn recover_orphans(&self) -> Result<usize, QueueError> {
        let now = encode_timestamp(&self.clock.now());
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(
            "UPDATE task_list SET state = 'pending', updated_at = ? WHERE state = 'running'",
        )
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}

async fn upsert(conn: &mut SqliteConnection, record: &TaskRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO task_list
            (id, command, state, attempts, max_retries, next_attempt_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            state = excluded.state,
            attempts = excluded.attempts,
            next_attempt_at = excluded.next_attempt_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(record.id.as_str())
    .bind(record.command.as_str())
    .bind(record.state.as_str())
    .bind(i64::from(record.attempts))
    .bind(i64::from(record.max_retries))
    .bind(record.next_attempt_at.as_ref().map(encode_timestamp))
    .bind(encode_timestamp(&record.created_at))
    .bind(encode_timestamp(&record.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn validate(record: &TaskRecord) -> Result<(), QueueError> {
    let invalid = |reason: &str| QueueError::InvalidRecord {
        id: record.id.clone(),
        reason: reason.to_string(),
    };
    if record.max_retries == 0 {
        return Err(invalid("max_retries must be positive"));
    }
    if record.attempts > record.max_retries {
        return Err(invalid("attempts exceed max_retries"));
    }
    if record.next_attempt_at.is_some() && record.state != TaskState::Failed {
        return Err(invalid("next_attempt_at is only allowed while failed"));
    }
    Ok(())
}

/// Fixed-width ISO-8601 (`2024-01-01T12:00:00.000000Z`), so that string
/// comparison in SQL is chronological.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp `{raw}`: {e}"))
}

fn decode_record(row: &SqliteRow) -> Result<TaskRecord, QueueError> {
    let id: String = row.try_get("id")?;
    let corrupt = |reason: String| QueueError::CorruptRecord {
        id: id.clone(),
        reason,
    };

    let state = row
        .try_get::<String, _>("state")?
        .parse::<TaskState>()
        .map_err(|e| corrupt(e.to_string()))?;
    let attempts = u32::try_from(row.try_get::<i64, _>("attempts")?)
        .map_err(|e| corrupt(format!("attempts: {e}")))?;
    let max_retries = u32::try_from(row.try_get::<i64, _>("max_retries")?)
        .map_err(|e| corrupt(format!("max_retries: {e}")))?;
    let next_attempt_at = row
        .try_get::<Option<String>, _>("next_attempt_at")?
        .map(|raw| decode_timestamp(&raw))
        .transpose()
        .map_err(&corrupt)?;
    let created_at = decode_timestamp(&row.try_get::<String, _>("created_at")?).map_err(&corrupt)?;
    let updated_at = decode_timestamp(&row.try_get::<String, _>("updated_at")?).map_err(&corrupt)?;

    Ok(TaskRecord {
        id: TaskId::from(id),
        command: row.try_get("command")?,
        state,
        attempts,
        max_retries,
        next_attempt_at,
        created_at,
        updated_at,
    })
}
