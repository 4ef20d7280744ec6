use serde::{Deserialize, Serialize};

use crate::compute::ProvisioningState;
use crate::resource::{Provisioned, Resource, ResourceKind};

/// Runtime environment for custom scoring code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Base container image reference.
    pub image: String,

    /// Path to the dependency (conda) file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conda_file: Option<String>,
}

/// Location of the scoring script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CodeConfiguration {
    /// Directory uploaded with the deployment.
    pub code: String,
    pub scoring_script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeploymentResources {
    pub instance_count: u32,
}

impl Default for DeploymentResources {
    fn default() -> Self {
        Self { instance_count: 1 }
    }
}

/// What the backend does with per-mini-batch results.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputAction {
    /// Append every returned row to `output_file_name`.
    #[default]
    AppendRow,
    /// Keep only the job summary.
    SummaryOnly,
}

/// Retry policy enforced by the backend, never by this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    /// Seconds per mini-batch before it counts as failed.
    pub timeout: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoggingLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

/// Compute + model + execution parameters behind an endpoint.
///
/// Stored under `/deployments/{endpoint_name}/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub name: String,
    pub endpoint_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Model reference, e.g. "azureml:heart-classifier:1".
    pub model: String,

    /// Compute reference, e.g. "azureml:batch-cluster".
    pub compute: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_configuration: Option<CodeConfiguration>,

    #[serde(default)]
    pub resources: DeploymentResources,

    pub max_concurrency_per_instance: u32,
    pub mini_batch_size: u32,

    #[serde(default)]
    pub output_action: OutputAction,

    pub output_file_name: String,

    #[serde(default)]
    pub retry_settings: RetrySettings,

    /// Number of failed items tolerated before the job fails; -1 means unlimited.
    pub error_threshold: i64,

    #[serde(default)]
    pub logging_level: LoggingLevel,

    #[serde(default)]
    pub provisioning_state: ProvisioningState,

    #[serde(default)]
    pub created_at_ms: u64,
}

impl Resource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;

    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> Option<&str> {
        Some(self.endpoint_name.as_str())
    }
}

impl Provisioned for Deployment {
    fn provisioning_state(&self) -> ProvisioningState {
        self.provisioning_state
    }
}
