use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compute::ProvisioningState;
use crate::deployment::{
    CodeConfiguration, Deployment, DeploymentResources, Environment, LoggingLevel, OutputAction,
    RetrySettings,
};
use crate::error::{NimbusError, Result};
use crate::reference::ResourceRef;

const DEFAULT_OUTPUT_FILE: &str = "predictions.csv";

/// Declarative deployment file, e.g. `deployment.yml`:
///
/// ```yaml
/// endpoint_name: heart-classifier-batch
/// name: classifier-xgboost-mlflow
/// model: azureml:heart-classifier@latest
/// compute: azureml:batch-cluster
/// resources:
///   instance_count: 2
/// max_concurrency_per_instance: 2
/// mini_batch_size: 2
/// output_action: append_row
/// output_file_name: predictions.csv
/// retry_settings:
///   max_retries: 3
///   timeout: 300
/// error_threshold: -1
/// logging_level: info
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeploymentDescriptor {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub endpoint_name: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Informational deployment type, e.g. "model".
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<String>,

    pub model: String,
    pub compute: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_configuration: Option<CodeConfiguration>,

    #[serde(default)]
    pub resources: DeploymentResources,

    #[serde(default = "default_one")]
    pub max_concurrency_per_instance: u32,

    #[serde(default = "default_mini_batch_size")]
    pub mini_batch_size: u32,

    #[serde(default)]
    pub output_action: OutputAction,

    #[serde(default = "default_output_file")]
    pub output_file_name: String,

    #[serde(default)]
    pub retry_settings: RetrySettings,

    #[serde(default = "default_error_threshold")]
    pub error_threshold: i64,

    #[serde(default)]
    pub logging_level: LoggingLevel,
}

fn default_one() -> u32 {
    1
}

fn default_mini_batch_size() -> u32 {
    10
}

fn default_output_file() -> String {
    DEFAULT_OUTPUT_FILE.to_string()
}

fn default_error_threshold() -> i64 {
    -1
}

impl DeploymentDescriptor {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let descriptor: Self = serde_yaml::from_str(raw)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint_name.trim().is_empty() {
            return Err(invalid("endpoint_name must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        ResourceRef::parse(&self.model)?;
        ResourceRef::parse(&self.compute)?;

        match (&self.environment, &self.code_configuration) {
            (Some(_), None) => {
                return Err(invalid("environment given without code_configuration"));
            }
            (None, Some(_)) => {
                return Err(invalid("code_configuration given without environment"));
            }
            _ => {}
        }

        if self.resources.instance_count == 0 {
            return Err(invalid("resources.instance_count must be positive"));
        }
        if self.max_concurrency_per_instance == 0 {
            return Err(invalid("max_concurrency_per_instance must be positive"));
        }
        if self.mini_batch_size == 0 {
            return Err(invalid("mini_batch_size must be positive"));
        }
        if self.output_file_name.trim().is_empty() {
            return Err(invalid("output_file_name must not be empty"));
        }
        if self.retry_settings.timeout == 0 {
            return Err(invalid("retry_settings.timeout must be positive"));
        }
        if self.error_threshold < -1 {
            return Err(invalid("error_threshold must be -1 (unlimited) or non-negative"));
        }
        Ok(())
    }

    /// Whether the backend is expected to supply environment and scoring script.
    pub fn is_no_code(&self) -> bool {
        self.environment.is_none() && self.code_configuration.is_none()
    }

    /// Build the deployment resource, with `model` replaced by its resolved form.
    pub fn into_deployment(self, model: String) -> Deployment {
        Deployment {
            name: self.name,
            endpoint_name: self.endpoint_name,
            description: self.description,
            model,
            compute: self.compute,
            environment: self.environment,
            code_configuration: self.code_configuration,
            resources: self.resources,
            max_concurrency_per_instance: self.max_concurrency_per_instance,
            mini_batch_size: self.mini_batch_size,
            output_action: self.output_action,
            output_file_name: self.output_file_name,
            retry_settings: self.retry_settings,
            error_threshold: self.error_threshold,
            logging_level: self.logging_level,
            provisioning_state: ProvisioningState::Creating,
            created_at_ms: 0,
        }
    }
}

fn invalid(msg: &str) -> NimbusError {
    NimbusError::InvalidDescriptor(msg.to_string())
}
