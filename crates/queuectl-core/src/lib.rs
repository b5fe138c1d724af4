//! queuectl-core
//!
//! Core building blocks for the queuectl job queue: a durable SQLite task
//! store with atomic claim/requeue, the task state machine with exponential
//! backoff, and the worker / retry-monitor loops.
//!
//! # モジュール構成
//! - **domain**: ID とコマンド文法（echo / sleep）
//! - **queue**: TaskRecord, TaskState, RetryPolicy（状態機械）
//! - **ports**: 抽象化レイヤー（TaskStore, Executor, Clock, IdGenerator）
//! - **impls**: 実装（SqliteStore, BuiltinExecutor）
//! - **app**: WorkerGroup, RetryMonitor, QueueCounts

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{MonitorHandle, QueueCounts, RetryMonitor, WorkerContext, WorkerGroup};
pub use domain::{Command, CommandError, TaskId};
pub use error::QueueError;
pub use impls::{BuiltinExecutor, SqliteStore};
pub use ports::{Clock, Executor, IdGenerator, SystemClock, TaskStore, UlidGenerator};
pub use queue::{RetryPolicy, TaskRecord, TaskState};
