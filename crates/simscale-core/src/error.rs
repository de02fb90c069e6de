//! Core domain errors.

use thiserror::Error;

/// Core domain errors for SimScale.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A pool definition violates its invariants.
    #[error("Invalid pool spec '{pool_id}': {reason}")]
    InvalidPoolSpec { pool_id: String, reason: String },

    /// A job definition violates its invariants.
    #[error("Invalid job spec '{job_id}': {reason}")]
    InvalidJobSpec { job_id: String, reason: String },

    /// Sizing was asked for a pool with no nodes.
    #[error("Pool must have at least one node (dedicated + low-priority >= 1)")]
    EmptyPool,

    /// Unknown operating system family.
    #[error("Unknown platform '{0}' (expected 'linux' or 'windows')")]
    UnknownPlatform(String),
}
