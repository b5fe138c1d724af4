//! Queue module: task state machine, records, and retry policy.

mod record;
mod retry;
mod state;

pub use record::TaskRecord;
pub use retry::RetryPolicy;
pub use state::{ParseStateError, TaskState};
