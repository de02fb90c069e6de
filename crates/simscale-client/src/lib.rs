//! HTTP compute backend for SimScale.
//!
//! Talks to a Batch-style REST service (pools, jobs, tasks, task files) and
//! implements the orchestrator's backend traits on top of it.

pub mod error;
pub mod http;
pub mod wire;

pub use error::ClientError;
pub use http::{HttpBackend, DEFAULT_API_VERSION};
