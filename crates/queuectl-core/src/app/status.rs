//! Status - ステータスクエリ

use serde::{Deserialize, Serialize};

use crate::queue::TaskState;

/// Number of records per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
}

impl QueueCounts {
    pub fn get(&self, state: TaskState) -> usize {
        match state {
            TaskState::Pending => self.pending,
            TaskState::Running => self.running,
            TaskState::Completed => self.completed,
            TaskState::Failed => self.failed,
            TaskState::Dead => self.dead,
        }
    }

    pub fn add(&mut self, state: TaskState, count: usize) {
        let slot = match state {
            TaskState::Pending => &mut self.pending,
            TaskState::Running => &mut self.running,
            TaskState::Completed => &mut self.completed,
            TaskState::Failed => &mut self.failed,
            TaskState::Dead => &mut self.dead,
        };
        *slot += count;
    }

    pub fn total(&self) -> usize {
        TaskState::ALL.into_iter().map(|state| self.get(state)).sum()
    }

    /// Every state with its count, zeros included.
    pub fn iter(&self) -> impl Iterator<Item = (TaskState, usize)> + '_ {
        TaskState::ALL.into_iter().map(|state| (state, self.get(state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_total() {
        let mut counts = QueueCounts::default();
        counts.add(TaskState::Dead, 2);
        counts.add(TaskState::Pending, 1);
        counts.add(TaskState::Dead, 1);

        assert_eq!(counts.dead, 3);
        assert_eq!(counts.get(TaskState::Pending), 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn iter_lists_all_states() {
        let counts = QueueCounts {
            failed: 7,
            ..QueueCounts::default()
        };
        let listed: Vec<_> = counts.iter().collect();
        assert_eq!(listed.len(), 5);
        assert!(listed.contains(&(TaskState::Failed, 7)));
        assert!(listed.contains(&(TaskState::Completed, 0)));
    }
}
