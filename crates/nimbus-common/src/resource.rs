use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::compute::ProvisioningState;
use crate::error::{NimbusError, Result};

/// The remote resource kinds managed by the lifecycle client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Compute,
    Model,
    Dataset,
    Endpoint,
    Deployment,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Compute => "compute",
            ResourceKind::Model => "model",
            ResourceKind::Dataset => "dataset",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::Deployment => "deployment",
        }
    }

    /// Collection segment used in both REST paths and store keys.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Compute => "computes",
            ResourceKind::Model => "models",
            ResourceKind::Dataset => "datasets",
            ResourceKind::Endpoint => "endpoints",
            ResourceKind::Deployment => "deployments",
        }
    }

    /// Versioned kinds keep every registration; a name maps to many versions.
    pub fn is_versioned(self) -> bool {
        matches!(self, ResourceKind::Model | ResourceKind::Dataset)
    }

    /// Scoped kinds live under a parent resource (deployments under an endpoint).
    pub fn is_scoped(self) -> bool {
        matches!(self, ResourceKind::Deployment)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named remote resource that travels as JSON.
pub trait Resource: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn name(&self) -> &str;

    /// Owning resource name for scoped kinds.
    fn scope(&self) -> Option<&str> {
        None
    }

    /// Version for versioned kinds; `None` before the control plane assigns one.
    fn version(&self) -> Option<&str> {
        None
    }
}

/// Resources that provision asynchronously and expose a provisioning state.
pub trait Provisioned: Resource {
    fn provisioning_state(&self) -> ProvisioningState;
}

/// Orders versions numerically when both are integers, lexically otherwise.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Names and versions become store key segments, so they must be non-empty
/// and free of `/`.
pub fn check_name(kind: ResourceKind, what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(NimbusError::InvalidReference(format!("{kind} {what} must not be empty")));
    }
    if value.contains('/') {
        return Err(NimbusError::InvalidReference(format!(
            "{kind} {what} '{value}' must not contain '/'"
        )));
    }
    Ok(())
}
