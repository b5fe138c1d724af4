//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部（SQLite, 時刻, コマンド実行）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。実装は `impls` にあります。

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::Executor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::TaskStore;
