//! SimScale Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Async runtime
//! - Any concrete compute backend
//!
//! All types here describe a scale-out campaign: the pool that runs it,
//! the job grouping its replicas, and the tasks themselves. They are
//! transient descriptors; the remote backend's own records are the source
//! of truth.

pub mod error;
pub mod ids;
pub mod job;
pub mod platform;
pub mod pool;
pub mod secret;
pub mod sizing;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{JobId, NodeId, PoolId, TaskId};
pub use job::{JobHandle, JobSpec, JobSummary};
pub use platform::OsFamily;
pub use pool::{
    ContainerConfig, ContainerRegistry, FileShareMount, ImageReference, NodeCounts, NodeStateCounts,
    PoolHandle, PoolSpec, TargetNodes,
};
pub use secret::{Credentials, Secret};
pub use sizing::{SizingPolicy, SizingRecommendation, VmTier};
pub use status::{CompletionState, TaskState};
pub use task::{ContainerSettings, EnvironmentSetting, TaskHandle, TaskSpec, TaskSummary};
