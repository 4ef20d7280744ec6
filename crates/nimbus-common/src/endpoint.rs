use serde::{Deserialize, Serialize};

use crate::compute::ProvisioningState;
use crate::resource::{Provisioned, Resource, ResourceKind};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    AadToken,
    Key,
}

/// A stable batch endpoint that routes jobs to one of its deployments.
///
/// Stored under `/endpoints/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub name: String,

    #[serde(default)]
    pub auth_mode: AuthMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Must name a deployment that exists under this endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_deployment: Option<String>,

    #[serde(default)]
    pub provisioning_state: ProvisioningState,

    #[serde(default)]
    pub created_at_ms: u64,
}

impl Endpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auth_mode: AuthMode::default(),
            description: None,
            default_deployment: None,
            provisioning_state: ProvisioningState::Creating,
            created_at_ms: 0,
        }
    }
}

impl Resource for Endpoint {
    const KIND: ResourceKind = ResourceKind::Endpoint;

    fn name(&self) -> &str {
        &self.name
    }
}

impl Provisioned for Endpoint {
    fn provisioning_state(&self) -> ProvisioningState {
        self.provisioning_state
    }
}
