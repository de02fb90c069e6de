//! Immutable state shared by the orchestration components of one run.

use simscale_core::{Credentials, OsFamily, PoolSpec};

use crate::config::CampaignConfig;

/// Everything the components need to know about the current campaign,
/// built once and passed by reference.
#[derive(Debug, Clone)]
pub struct OrchestrationContext {
    campaign: String,
    os_family: OsFamily,
    image: String,
    shared_mount: bool,
    credentials: Credentials,
}

impl OrchestrationContext {
    pub fn new(
        campaign: impl Into<String>,
        os_family: OsFamily,
        image: impl Into<String>,
        shared_mount: bool,
        credentials: Credentials,
    ) -> Self {
        Self {
            campaign: campaign.into(),
            os_family,
            image: image.into(),
            shared_mount,
            credentials,
        }
    }

    /// Context for a validated campaign. The shared mount flag follows the
    /// pool definition so fan-out and provisioning agree on it.
    pub fn for_campaign(config: &CampaignConfig, credentials: Credentials) -> Self {
        Self::for_pool(&config.campaign, &config.pool, credentials)
    }

    pub fn for_pool(campaign: &str, pool: &PoolSpec, credentials: Credentials) -> Self {
        Self::new(
            campaign,
            pool.os_family,
            pool.container.image.clone(),
            pool.has_shared_mount(),
            credentials,
        )
    }

    pub fn campaign(&self) -> &str {
        &self.campaign
    }

    pub fn os_family(&self) -> OsFamily {
        self.os_family
    }

    /// Fully qualified container image every replica runs.
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn shared_mount(&self) -> bool {
        self.shared_mount
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}
