//! Newtype wrappers for identifiers to ensure type safety.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new id from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the inner string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(
    /// Identifier of a compute pool.
    PoolId
);

string_id!(
    /// Identifier of a job. Unique per provisioning call.
    JobId
);

string_id!(
    /// Identifier of a task, unique within its job.
    TaskId
);

string_id!(
    /// Identifier of a compute node inside a pool.
    NodeId
);

impl PoolId {
    /// Default pool id for an image and node budget: `{image}pool{nodes}`.
    pub fn for_image(image_name: &str, total_nodes: u32) -> Self {
        Self(format!("{image_name}pool{total_nodes}"))
    }
}

impl JobId {
    /// Timestamp-suffixed job id: `Job-{campaign}-{%Y-%m-%d-%H-%M-%S}`.
    ///
    /// Two campaigns started within the same second collide; callers that
    /// need tighter guarantees should pass an explicit id.
    pub fn timestamped<Tz>(campaign: &str, at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self(format!("Job-{}-{}", campaign, at.format("%Y-%m-%d-%H-%M-%S")))
    }
}

impl TaskId {
    /// Id of replica `index` in a campaign: `job_number{index}_{campaign}`.
    pub fn replica(index: u32, campaign: &str) -> Self {
        Self(format!("job_number{index}_{campaign}"))
    }
}
