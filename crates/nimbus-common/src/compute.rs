use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::{Provisioned, Resource, ResourceKind};

/// Provisioning progress of an asynchronously created resource.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    #[default]
    Creating,
    Succeeded,
    Failed,
}

impl ProvisioningState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProvisioningState::Succeeded | ProvisioningState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProvisioningState::Creating => "creating",
            ProvisioningState::Succeeded => "succeeded",
            ProvisioningState::Failed => "failed",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComputeTier {
    #[default]
    Dedicated,
    LowPriority,
}

/// A cluster that deployments run on. Created once and shared across deployments.
///
/// Stored under `/computes/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeTarget {
    pub name: String,

    /// VM size, e.g. "STANDARD_DS3_V2".
    pub size: String,

    #[serde(default)]
    pub tier: ComputeTier,

    #[serde(default)]
    pub min_instances: u32,

    #[serde(default = "default_max_instances")]
    pub max_instances: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub provisioning_state: ProvisioningState,

    #[serde(default)]
    pub created_at_ms: u64,
}

fn default_max_instances() -> u32 {
    1
}

impl ComputeTarget {
    pub fn new(name: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
            tier: ComputeTier::default(),
            min_instances: 0,
            max_instances: default_max_instances(),
            description: None,
            provisioning_state: ProvisioningState::Creating,
            created_at_ms: 0,
        }
    }

    pub fn with_instances(mut self, min: u32, max: u32) -> Self {
        self.min_instances = min;
        self.max_instances = max;
        self
    }
}

impl Resource for ComputeTarget {
    const KIND: ResourceKind = ResourceKind::Compute;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Provisioned for ComputeTarget {
    fn provisioning_state(&self) -> ProvisioningState {
        self.provisioning_state
    }
}
