//! Compute pool descriptors.

use serde::{Deserialize, Serialize};

use crate::{CoreError, OsFamily, PoolId, Secret};

/// Marketplace image the pool's nodes boot from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    #[serde(default = "ImageReference::latest")]
    pub version: String,
}

impl ImageReference {
    fn latest() -> String {
        "latest".to_string()
    }

    /// Windows Server images are published under this publisher.
    pub fn is_windows_server(&self) -> bool {
        self.publisher == "MicrosoftWindowsServer"
    }
}

/// Private registry the container image is pulled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRegistry {
    pub server: String,
    pub username: String,
    pub password: Secret,
}

/// Container runtime configuration of the pool: which images to prefetch
/// and where to pull them from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Fully qualified image reference, `server/name:version`.
    pub image: String,
    pub registry: Option<ContainerRegistry>,
}

impl ContainerConfig {
    /// Build `server/name:version` from its parts.
    pub fn qualified_image(server: &str, name: &str, version: &str) -> String {
        let server = server.trim_end_matches('/');
        if server.is_empty() {
            format!("{name}:{version}")
        } else {
            format!("{server}/{name}:{version}")
        }
    }
}

/// File share mounted on every node of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileShareMount {
    pub account_name: String,
    pub url: String,
    pub account_key: Secret,
    /// Path relative to the node's mount root, see [`OsFamily::mount_path`].
    pub relative_mount_path: String,
    pub mount_options: String,
}

impl FileShareMount {
    pub const DEFAULT_MOUNT_OPTIONS: &'static str = "/persistent:Yes";
}

/// Target node counts of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNodes {
    pub dedicated: u32,
    pub low_priority: u32,
}

impl TargetNodes {
    pub fn new(dedicated: u32, low_priority: u32) -> Self {
        Self {
            dedicated,
            low_priority,
        }
    }

    pub fn total(&self) -> u32 {
        self.dedicated.saturating_add(self.low_priority)
    }
}

/// Full definition of a pool to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    pub id: PoolId,
    /// VM size of every node, e.g. `Standard_E8s_v3`.
    pub vm_size: String,
    /// Node agent SKU matching `image`.
    pub node_agent_sku: String,
    pub image: ImageReference,
    pub os_family: OsFamily,
    pub container: ContainerConfig,
    pub target: TargetNodes,
    pub max_tasks_per_node: u32,
    /// Present only when a shared file share was requested.
    pub mount: Option<FileShareMount>,
}

impl PoolSpec {
    /// Check the invariants every pool definition must satisfy.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: &str| CoreError::InvalidPoolSpec {
            pool_id: self.id.to_string(),
            reason: reason.to_string(),
        };

        if self.id.as_str().trim().is_empty() {
            return Err(invalid("pool id must not be empty"));
        }
        if self.max_tasks_per_node < 1 {
            return Err(invalid("max tasks per node must be at least 1"));
        }
        if self.target.total() < 1 {
            return Err(invalid("dedicated + low-priority nodes must be at least 1"));
        }
        if self.vm_size.trim().is_empty() {
            return Err(invalid("vm size must not be empty"));
        }
        if let Some(mount) = &self.mount {
            if mount.relative_mount_path != self.os_family.mount_path() {
                return Err(invalid("mount path does not match the platform convention"));
            }
        }
        Ok(())
    }

    pub fn has_shared_mount(&self) -> bool {
        self.mount.is_some()
    }
}

/// Handle to a pool that exists (or is being created) on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pub id: PoolId,
}

impl PoolHandle {
    pub fn new(id: PoolId) -> Self {
        Self { id }
    }
}

/// Node counts of one priority class, by node state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStateCounts {
    pub creating: u32,
    pub starting: u32,
    pub idle: u32,
    pub running: u32,
    pub unusable: u32,
    pub preempted: u32,
    pub total: u32,
}

/// Node counts of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounts {
    pub pool_id: PoolId,
    pub dedicated: NodeStateCounts,
    pub low_priority: NodeStateCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PoolSpec {
        PoolSpec {
            id: PoolId::new("simpool10"),
            vm_size: "Standard_E8s_v3".to_string(),
            node_agent_sku: "batch.node.ubuntu 20.04".to_string(),
            image: ImageReference {
                publisher: "microsoft-azure-batch".to_string(),
                offer: "ubuntu-server-container".to_string(),
                sku: "20-04-lts".to_string(),
                version: "latest".to_string(),
            },
            os_family: OsFamily::Linux,
            container: ContainerConfig {
                image: "reg.io/sim:1.0".to_string(),
                registry: None,
            },
            target: TargetNodes::new(1, 9),
            max_tasks_per_node: 10,
            mount: None,
        }
    }

    #[test]
    fn test_valid_spec() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_zero_tasks_per_node_rejected() {
        let mut s = spec();
        s.max_tasks_per_node = 0;
        assert!(matches!(s.validate(), Err(CoreError::InvalidPoolSpec { .. })));
    }

    #[test]
    fn test_zero_nodes_rejected() {
        let mut s = spec();
        s.target = TargetNodes::new(0, 0);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_mount_path_must_follow_platform() {
        let mut s = spec();
        s.mount = Some(FileShareMount {
            account_name: "acct".to_string(),
            url: "https://acct.file.core.windows.net/share".to_string(),
            account_key: Secret::new("key"),
            relative_mount_path: "S".to_string(),
            mount_options: FileShareMount::DEFAULT_MOUNT_OPTIONS.to_string(),
        });
        assert!(s.validate().is_err());

        if let Some(mount) = s.mount.as_mut() {
            mount.relative_mount_path = "azfileshare".to_string();
        }
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_qualified_image() {
        assert_eq!(
            ContainerConfig::qualified_image("reg.azurecr.io/", "sim", "2"),
            "reg.azurecr.io/sim:2"
        );
        assert_eq!(ContainerConfig::qualified_image("", "sim", "2"), "sim:2");
    }
}
