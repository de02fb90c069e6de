//! Opaque secrets and the simulator credentials injected into every task.
//! We never log a secret in full, only a short SHA-256 fingerprint.

use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// A secret string whose `Debug` and `Display` output is redacted.
///
/// Use [`Secret::expose`] at the single point where the plaintext is sent
/// over the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Plaintext value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First 8 hex chars of the SHA-256 of the value, safe to log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..8].to_string()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(sha256:{})", self.fingerprint())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Workspace id and access key handed to every simulator replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub workspace: String,
    pub access_key: Secret,
}

impl Credentials {
    /// Environment variable carrying the workspace id.
    pub const WORKSPACE_VAR: &'static str = "SIM_WORKSPACE";
    /// Environment variable carrying the access key.
    pub const ACCESS_KEY_VAR: &'static str = "SIM_ACCESS_KEY";

    pub fn new(workspace: impl Into<String>, access_key: impl Into<Secret>) -> Self {
        Self {
            workspace: workspace.into(),
            access_key: access_key.into(),
        }
    }
}
