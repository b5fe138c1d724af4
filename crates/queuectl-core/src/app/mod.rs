//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **WorkerGroup**: タスク実行ループ（claim→run→persist）
//! - **RetryMonitor**: バックオフ期限切れの failed タスクを pending に戻す
//! - **QueueCounts**: 状態ごとの件数

pub mod retry_monitor;
pub mod status;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::retry_monitor::{MonitorHandle, RetryMonitor};
pub use self::status::QueueCounts;
pub use self::worker_loop::{WorkerContext, WorkerGroup, process_next};
