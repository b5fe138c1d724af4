//! Task identifiers.
//!
//! ID は不透明な文字列として扱います。自動生成される ID は ULID ベース
//! （`job-` プレフィックス付き）ですが、投入時に任意の文字列を指定することもできます。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

const GENERATED_PREFIX: &str = "job-";

/// Opaque, immutable identifier of a `TaskRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// ULID から ID を作成（`job-<ULID>`）
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{GENERATED_PREFIX}{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
