//! Orchestrator configuration.
//!
//! Settings are read from a TOML file into [`FileConfig`], optionally
//! overridden from the command line with [`CliOverrides`], and validated
//! once into strongly-typed values ([`BackendConfig`], [`CampaignConfig`])
//! before any remote call is made.
//!
//! ```toml
//! [batch]
//! account_name = "simbatch"
//! account_url = "https://simbatch.westus2.batch.azure.com"
//!
//! [registry]
//! server = "simreg.azurecr.io"
//! username = "simreg"
//! password = "..."
//! image_name = "cartpole"
//! image_version = "latest"
//! platform = "linux"
//!
//! [pool]
//! node_agent_sku = "batch.node.ubuntu 20.04"
//! image = { publisher = "microsoft-azure-batch", offer = "ubuntu-server-container", sku = "20-04-lts" }
//!
//! [campaign]
//! replicas = 100
//! command = "python main.py"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use simscale_core::{
    ContainerConfig, ContainerRegistry, CoreError, FileShareMount, ImageReference, JobId, OsFamily,
    PoolId, PoolSpec, Secret, SizingPolicy, SizingRecommendation, TargetNodes,
};

/// Configuration errors. All of them are fatal and raised before any
/// backend call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Default command run by each replica.
pub const DEFAULT_COMMAND: &str = "python main.py";
/// Default working directory inside the container.
pub const DEFAULT_WORKDIR: &str = "src";
/// Default completion deadline (two hours).
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 2 * 60 * 60;
/// Default barrier poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
/// Default dedicated node count.
pub const DEFAULT_DEDICATED_NODES: u32 = 1;
/// Default low-priority node count.
pub const DEFAULT_LOW_PRIORITY_NODES: u32 = 9;

/// Raw configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub batch: BatchSection,
    pub registry: RegistrySection,
    pub pool: PoolSection,
    pub storage: Option<StorageSection>,
    pub campaign: CampaignSection,
    pub credentials: CredentialsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub account_name: String,
    pub account_url: String,
    pub api_version: Option<String>,
    /// Bearer token presented to the batch service.
    pub token: Option<Secret>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub image_name: String,
    pub image_version: String,
    /// `linux` or `windows`.
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowsImageSection {
    pub image: ImageReference,
    pub node_agent_sku: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub pool_id: Option<String>,
    /// Explicit VM size. Empty or `none` selects one from the sizing policy.
    pub vm_size: Option<String>,
    pub node_agent_sku: String,
    pub image: Option<ImageReference>,
    /// Required on the windows platform, where it replaces `image`/`node_agent_sku`.
    pub windows: Option<WindowsImageSection>,
    pub dedicated_nodes: u32,
    pub low_priority_nodes: u32,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            pool_id: None,
            vm_size: None,
            node_agent_sku: String::new(),
            image: None,
            windows: None,
            dedicated_nodes: DEFAULT_DEDICATED_NODES,
            low_priority_nodes: DEFAULT_LOW_PRIORITY_NODES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub account_name: String,
    pub url: String,
    pub account_key: Secret,
    pub mount_options: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CampaignSection {
    pub name: Option<String>,
    pub job_id: Option<String>,
    pub replicas: Option<u32>,
    pub command: Option<String>,
    pub workdir: Option<String>,
    pub use_fileshare: bool,
    pub wait: bool,
    pub wait_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub require_success: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub workspace: Option<String>,
    pub access_key: Option<Secret>,
    /// Secret store holding `SIM_WORKSPACE` / `SIM_ACCESS_KEY`.
    pub env_file: Option<PathBuf>,
    /// Prompt for missing credentials and persist them to `env_file`.
    pub prompt: Option<bool>,
}

impl CredentialsSection {
    pub fn env_file(&self) -> PathBuf {
        self.env_file.clone().unwrap_or_else(|| PathBuf::from(".env"))
    }

    pub fn prompt(&self) -> bool {
        self.prompt.unwrap_or(true)
    }
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub pool_id: Option<String>,
    pub vm_size: Option<String>,
    pub dedicated_nodes: Option<u32>,
    pub low_priority_nodes: Option<u32>,
    pub replicas: Option<u32>,
    pub command: Option<String>,
    pub campaign: Option<String>,
    pub job_id: Option<String>,
    pub image_name: Option<String>,
    pub image_version: Option<String>,
    pub use_fileshare: Option<bool>,
    pub wait: Option<bool>,
    pub wait_timeout_secs: Option<u64>,
    pub workdir: Option<String>,
    pub workspace: Option<String>,
    pub access_key: Option<Secret>,
}

/// Connection settings of the batch service.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub account_name: String,
    pub account_url: String,
    pub api_version: Option<String>,
    pub token: Option<Secret>,
}

/// Completion-wait settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Treat completed tasks with a non-zero exit code as a failure.
    pub require_success: bool,
}

/// Fully validated settings of one campaign run.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub campaign: String,
    /// Explicit job id; a timestamped one is derived when absent.
    pub job_id: Option<JobId>,
    pub replicas: u32,
    pub command: String,
    pub workdir: String,
    pub os_family: OsFamily,
    pub sizing: SizingRecommendation,
    /// Complete pool definition, already sized.
    pub pool: PoolSpec,
    /// `None` when the caller does not want to block on completion.
    pub wait: Option<WaitConfig>,
}

/// Trim whitespace and the stray single quotes older config files carry.
fn clean(value: &str) -> String {
    value.trim().trim_matches('\'').trim().to_string()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(clean).filter(|v| !v.is_empty())
}

fn required(value: &str, field: &'static str) -> Result<String, ConfigError> {
    non_empty(Some(value)).ok_or(ConfigError::Missing(field))
}

impl FileConfig {
    /// Load a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: CliOverrides) {
        let CliOverrides {
            pool_id,
            vm_size,
            dedicated_nodes,
            low_priority_nodes,
            replicas,
            command,
            campaign,
            job_id,
            image_name,
            image_version,
            use_fileshare,
            wait,
            wait_timeout_secs,
            workdir,
            workspace,
            access_key,
        } = overrides;

        if pool_id.is_some() {
            self.pool.pool_id = pool_id;
        }
        if vm_size.is_some() {
            self.pool.vm_size = vm_size;
        }
        if let Some(n) = dedicated_nodes {
            self.pool.dedicated_nodes = n;
        }
        if let Some(n) = low_priority_nodes {
            self.pool.low_priority_nodes = n;
        }
        if replicas.is_some() {
            self.campaign.replicas = replicas;
        }
        if command.is_some() {
            self.campaign.command = command;
        }
        if campaign.is_some() {
            self.campaign.name = campaign;
        }
        if job_id.is_some() {
            self.campaign.job_id = job_id;
        }
        if let Some(name) = image_name {
            self.registry.image_name = name;
        }
        if let Some(version) = image_version {
            self.registry.image_version = version;
        }
        if let Some(flag) = use_fileshare {
            self.campaign.use_fileshare = flag;
        }
        if let Some(flag) = wait {
            self.campaign.wait = flag;
        }
        if wait_timeout_secs.is_some() {
            self.campaign.wait_timeout_secs = wait_timeout_secs;
        }
        if workdir.is_some() {
            self.campaign.workdir = workdir;
        }
        if workspace.is_some() {
            self.credentials.workspace = workspace;
        }
        if access_key.is_some() {
            self.credentials.access_key = access_key;
        }
    }

    /// Batch service connection settings.
    pub fn backend_config(&self) -> Result<BackendConfig, ConfigError> {
        Ok(BackendConfig {
            account_name: clean(&self.batch.account_name),
            account_url: required(&self.batch.account_url, "batch.account_url")?,
            api_version: non_empty(self.batch.api_version.as_deref()),
            token: self.batch.token.clone(),
        })
    }

    pub fn os_family(&self) -> Result<OsFamily, ConfigError> {
        match non_empty(self.registry.platform.as_deref()) {
            Some(p) => Ok(p.parse()?),
            None => Ok(OsFamily::Linux),
        }
    }

    fn total_nodes(&self) -> u32 {
        TargetNodes::new(self.pool.dedicated_nodes, self.pool.low_priority_nodes).total()
    }

    /// Pool id: explicit, or `{image_name}pool{total_nodes}`.
    pub fn pool_id(&self) -> Result<PoolId, ConfigError> {
        if let Some(id) = non_empty(self.pool.pool_id.as_deref()) {
            return Ok(PoolId::new(id));
        }
        let image_name = required(&self.registry.image_name, "registry.image_name")?;
        Ok(PoolId::for_image(&image_name, self.total_nodes()))
    }

    /// Validate everything a campaign run needs.
    pub fn campaign_config(&self) -> Result<CampaignConfig, ConfigError> {
        let os_family = self.os_family()?;
        let image_name = required(&self.registry.image_name, "registry.image_name")?;
        let image_version = required(&self.registry.image_version, "registry.image_version")?;

        let replicas = self
            .campaign
            .replicas
            .ok_or(ConfigError::Missing("campaign.replicas"))?;
        if replicas == 0 {
            return Err(ConfigError::Invalid {
                field: "campaign.replicas",
                reason: "at least one replica is required".to_string(),
            });
        }

        let target = TargetNodes::new(self.pool.dedicated_nodes, self.pool.low_priority_nodes);
        if target.total() == 0 {
            return Err(ConfigError::Invalid {
                field: "pool.dedicated_nodes",
                reason: "dedicated + low-priority nodes must be at least 1".to_string(),
            });
        }
        let sizing = SizingPolicy.recommend(replicas, target.dedicated, target.low_priority)?;

        let vm_size = match non_empty(self.pool.vm_size.as_deref()) {
            Some(size) if !size.eq_ignore_ascii_case("none") => size,
            _ => sizing.vm_size().to_string(),
        };

        let (image, node_agent_sku) = match os_family {
            OsFamily::Windows => {
                let win = self
                    .pool
                    .windows
                    .as_ref()
                    .ok_or(ConfigError::Missing("pool.windows"))?;
                if !win.image.is_windows_server() {
                    return Err(ConfigError::Invalid {
                        field: "pool.windows.image",
                        reason: format!(
                            "windows containers need a MicrosoftWindowsServer image, got '{}'",
                            win.image.publisher
                        ),
                    });
                }
                (win.image.clone(), clean(&win.node_agent_sku))
            }
            OsFamily::Linux => (
                self.pool.image.clone().ok_or(ConfigError::Missing("pool.image"))?,
                clean(&self.pool.node_agent_sku),
            ),
        };
        if node_agent_sku.is_empty() {
            return Err(ConfigError::Missing("pool.node_agent_sku"));
        }

        let server = clean(&self.registry.server);
        let registry = match (&self.registry.username, &self.registry.password) {
            (Some(username), Some(password)) if !server.is_empty() => Some(ContainerRegistry {
                server: server.clone(),
                username: clean(username),
                password: password.clone(),
            }),
            _ => None,
        };

        let mount = if self.campaign.use_fileshare {
            let storage = self
                .storage
                .as_ref()
                .ok_or(ConfigError::Missing("storage"))?;
            Some(FileShareMount {
                account_name: required(&storage.account_name, "storage.account_name")?,
                url: required(&storage.url, "storage.url")?,
                account_key: storage.account_key.clone(),
                relative_mount_path: os_family.mount_path().to_string(),
                mount_options: non_empty(storage.mount_options.as_deref())
                    .unwrap_or_else(|| FileShareMount::DEFAULT_MOUNT_OPTIONS.to_string()),
            })
        } else {
            None
        };

        let pool = PoolSpec {
            id: self.pool_id()?,
            vm_size,
            node_agent_sku,
            image,
            os_family,
            container: ContainerConfig {
                image: ContainerConfig::qualified_image(&server, &image_name, &image_version),
                registry,
            },
            target,
            max_tasks_per_node: sizing.tasks_per_node,
            mount,
        };
        pool.validate()?;

        let campaign = non_empty(self.campaign.name.as_deref())
            .unwrap_or_else(|| format!("{image_name}job{replicas}"));

        let wait = if self.campaign.wait {
            let timeout_secs = self
                .campaign
                .wait_timeout_secs
                .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
            let poll_ms = self
                .campaign
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
            if poll_ms == 0 {
                return Err(ConfigError::Invalid {
                    field: "campaign.poll_interval_ms",
                    reason: "must be greater than zero".to_string(),
                });
            }
            Some(WaitConfig {
                timeout: Duration::from_secs(timeout_secs),
                poll_interval: Duration::from_millis(poll_ms),
                require_success: self.campaign.require_success,
            })
        } else {
            None
        };

        Ok(CampaignConfig {
            campaign,
            job_id: non_empty(self.campaign.job_id.as_deref()).map(JobId::new),
            replicas,
            command: non_empty(self.campaign.command.as_deref())
                .unwrap_or_else(|| DEFAULT_COMMAND.to_string()),
            workdir: non_empty(self.campaign.workdir.as_deref())
                .unwrap_or_else(|| DEFAULT_WORKDIR.to_string()),
            os_family,
            sizing,
            pool,
            wait,
        })
    }
}
