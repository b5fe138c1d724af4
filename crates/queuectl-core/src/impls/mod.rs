//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SqliteStore**: SQLite を正本とする TaskStore
//! - **BuiltinExecutor**: `echo` / `sleep` の実行

pub mod builtin_executor;
pub mod sqlite_store;

// 主要な型を再エクスポート
pub use self::builtin_executor::BuiltinExecutor;
pub use self::sqlite_store::SqliteStore;
