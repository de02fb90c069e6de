//! Task states as reported by the backend and as classified by the
//! completion barrier.

use serde::{Deserialize, Serialize};

/// State of a task as reported by the compute backend.
///
/// Transitions are backend-driven (`Pending -> Running -> Completed`);
/// this crate only ever observes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Task queued or preparing on a node.
    #[default]
    Pending,
    /// Task container is executing.
    Running,
    /// Task container exited, whatever its exit code.
    Completed,
}

impl TaskState {
    /// Returns true if no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

/// Classification of a task from the completion barrier's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Pending,
    Running,
    Completed,
    /// Still non-terminal when the barrier's deadline elapsed.
    TimedOut,
}

impl CompletionState {
    /// Classify a task given its last observed state and whether the
    /// barrier's deadline has passed.
    pub fn classify(state: TaskState, deadline_elapsed: bool) -> Self {
        match (state, deadline_elapsed) {
            (TaskState::Completed, _) => Self::Completed,
            (_, true) => Self::TimedOut,
            (TaskState::Pending, false) => Self::Pending,
            (TaskState::Running, false) => Self::Running,
        }
    }
}

impl From<TaskState> for CompletionState {
    fn from(state: TaskState) -> Self {
        Self::classify(state, false)
    }
}
