//! Pool sizing heuristics.
//!
//! Maps the requested replica count and node budget to a per-node task
//! density and a VM size able to host it.
//!
//! ```text
//! tasks_per_node = max(floor(replicas / (dedicated + low_priority)), 1)
//!
//! tasks_per_node <= 8   -> Standard_E2s_v3
//! tasks_per_node <= 16  -> Standard_E8s_v3
//! tasks_per_node <= 32  -> Standard_E16s_v3
//! tasks_per_node <= 75  -> Standard_E32s_v3
//! otherwise             -> Standard_E64s_v3 (density warning)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

/// VM size tiers, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VmTier {
    E2s,
    E8s,
    E16s,
    E32s,
    E64s,
}

impl VmTier {
    /// Highest density each tier is rated for; the last tier has no bound.
    const TIERS: [(u32, VmTier); 4] = [
        (8, VmTier::E2s),
        (16, VmTier::E8s),
        (32, VmTier::E16s),
        (75, VmTier::E32s),
    ];

    /// Smallest tier rated for `tasks_per_node`.
    pub fn for_density(tasks_per_node: u32) -> Self {
        Self::TIERS
            .iter()
            .find(|(limit, _)| tasks_per_node <= *limit)
            .map(|(_, tier)| *tier)
            .unwrap_or(VmTier::E64s)
    }

    /// Backend VM size name.
    pub fn vm_size(&self) -> &'static str {
        match self {
            Self::E2s => "Standard_E2s_v3",
            Self::E8s => "Standard_E8s_v3",
            Self::E16s => "Standard_E16s_v3",
            Self::E32s => "Standard_E32s_v3",
            Self::E64s => "Standard_E64s_v3",
        }
    }
}

impl fmt::Display for VmTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.vm_size())
    }
}

/// Result of a sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingRecommendation {
    pub tasks_per_node: u32,
    pub tier: VmTier,
    /// Set when the density exceeds what the largest tier is rated for.
    /// The caller is expected to surface it as a warning.
    pub density_warning: bool,
}

impl SizingRecommendation {
    pub fn vm_size(&self) -> &'static str {
        self.tier.vm_size()
    }
}

/// Pure sizing policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizingPolicy;

impl SizingPolicy {
    /// Density threshold above which the largest tier is selected and a
    /// warning is raised.
    pub const MAX_RATED_DENSITY: u32 = 75;

    /// Recommend a per-node density and VM tier.
    ///
    /// Only an empty node budget is rejected; any density, however high,
    /// yields a recommendation.
    pub fn recommend(
        &self,
        total_replicas: u32,
        dedicated_nodes: u32,
        low_priority_nodes: u32,
    ) -> Result<SizingRecommendation, CoreError> {
        let total_nodes = dedicated_nodes.saturating_add(low_priority_nodes);
        if total_nodes == 0 {
            return Err(CoreError::EmptyPool);
        }

        let tasks_per_node = (total_replicas / total_nodes).max(1);
        let tier = VmTier::for_density(tasks_per_node);

        Ok(SizingRecommendation {
            tasks_per_node,
            tier,
            density_warning: tasks_per_node > Self::MAX_RATED_DENSITY,
        })
    }
}
