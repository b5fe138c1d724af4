//! Domain model (IDs, command grammar).

pub mod command;
pub mod ids;

pub use self::command::{Command, CommandError};
pub use self::ids::TaskId;
