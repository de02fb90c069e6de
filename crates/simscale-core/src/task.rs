//! Task descriptors for simulation replicas.

use serde::{Deserialize, Serialize};

use crate::{Credentials, JobId, NodeId, Secret, TaskId, TaskState};

/// Container isolation of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// Fully qualified image reference.
    pub image: String,
    /// Extra options passed to the container runtime (workdir, volumes).
    pub run_options: String,
}

/// An environment variable set in the task's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSetting {
    pub name: String,
    pub value: Secret,
}

impl EnvironmentSetting {
    pub fn new(name: impl Into<String>, value: impl Into<Secret>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One replica to submit into a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: TaskId,
    pub command_line: String,
    pub container: ContainerSettings,
    pub environment: Vec<EnvironmentSetting>,
    /// Run as an elevated, task-scoped auto user.
    pub elevated: bool,
}

impl TaskSpec {
    /// Create a task spec with no environment.
    pub fn new(id: TaskId, command_line: impl Into<String>, container: ContainerSettings) -> Self {
        Self {
            id,
            command_line: command_line.into(),
            container,
            environment: Vec::new(),
            elevated: true,
        }
    }

    /// Builder method to inject the simulator credentials.
    pub fn with_credentials(mut self, credentials: &Credentials) -> Self {
        self.environment.push(EnvironmentSetting::new(
            Credentials::WORKSPACE_VAR,
            credentials.workspace.as_str(),
        ));
        self.environment.push(EnvironmentSetting::new(
            Credentials::ACCESS_KEY_VAR,
            credentials.access_key.clone(),
        ));
        self
    }

    /// Look up an environment variable by name.
    pub fn env(&self, name: &str) -> Option<&Secret> {
        self.environment
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }
}

/// Handle to a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub job_id: JobId,
    pub task_id: TaskId,
}

/// A task as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub state: TaskState,
    /// Node the task ran (or runs) on, once scheduled.
    pub node_id: Option<NodeId>,
    /// Container exit code, once completed.
    pub exit_code: Option<i32>,
}

impl TaskSummary {
    pub fn new(id: TaskId, state: TaskState) -> Self {
        Self {
            id,
            state,
            node_id: None,
            exit_code: None,
        }
    }

    /// Completed with a known non-zero exit code.
    pub fn exited_with_failure(&self) -> bool {
        self.state.is_terminal() && matches!(self.exit_code, Some(code) if code != 0)
    }
}
