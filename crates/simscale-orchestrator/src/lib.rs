//! SimScale Orchestrator Library
//!
//! Drives a scale-out simulation campaign against a compute backend:
//! provision (or reuse) a pool, create a job, fan out one task per replica,
//! optionally wait for every task to complete, and tear resources down.
//!
//! The backend is reached only through the traits in [`backend`]; the HTTP
//! implementation lives in `simscale-client` and [`memory::InMemoryBackend`]
//! serves tests and dry runs.

pub mod backend;
pub mod barrier;
pub mod campaign;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod fanout;
pub mod memory;
pub mod output;
pub mod provisioner;
pub mod teardown;

pub use backend::{BackendError, ComputeBackend, JobBackend, OutputStream, PoolBackend, TaskBackend};
pub use barrier::{CompletionBarrier, CompletionReport};
pub use campaign::{Campaign, CampaignReport};
pub use config::{BackendConfig, CampaignConfig, CliOverrides, ConfigError, FileConfig, WaitConfig};
pub use context::OrchestrationContext;
pub use credentials::{CredentialError, CredentialProvider};
pub use error::{OrchestratorError, ResourceKind};
pub use fanout::{FanoutReport, SubmissionFailure, TaskFanout};
pub use memory::{InMemoryBackend, Progression};
pub use output::{OutputCollector, TaskOutput, DEFAULT_OUTPUT_FILE};
pub use provisioner::ResourceProvisioner;
pub use teardown::{TeardownManager, TeardownOutcome};
