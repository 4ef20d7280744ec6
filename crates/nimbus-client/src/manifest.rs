use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nimbus_common::{
    generate_name, AuthMode, ComputeTarget, Dataset, DeploymentDescriptor, Endpoint, Model,
    NimbusError, Result, DEFAULT_OUTPUT_NAME,
};

use crate::waiter::{PollPolicy, DEFAULT_POLL_INTERVAL};

/// Length of the random suffix appended to `endpoint.name_prefix`.
pub const ENDPOINT_SUFFIX_LEN: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EndpointSection {
    /// Fixed endpoint name. Mutually exclusive with `name_prefix`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Prefix for a generated name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    #[serde(default)]
    pub auth_mode: AuthMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EndpointSection {
    /// The endpoint to ensure; generates a fresh name from `name_prefix`.
    pub fn to_endpoint(&self) -> Result<Endpoint> {
        let name = match (&self.name, &self.name_prefix) {
            (Some(name), None) => name.clone(),
            (None, Some(prefix)) => generate_name(prefix, ENDPOINT_SUFFIX_LEN),
            _ => {
                return Err(NimbusError::InvalidDescriptor(
                    "endpoint needs exactly one of name or name_prefix".into(),
                ))
            }
        };
        let mut endpoint = Endpoint::new(name);
        endpoint.auth_mode = self.auth_mode;
        endpoint.description = self.description.clone();
        Ok(endpoint)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InvocationSection {
    /// Dataset version or `latest`; the dataset itself comes from `dataset`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_label: Option<String>,

    /// Name the deployment in the request instead of relying on the default.
    #[serde(default)]
    pub explicit_deployment: bool,

    /// Make the deployment the endpoint default before invoking.
    #[serde(default = "default_true")]
    pub make_default: bool,
}

fn default_true() -> bool {
    true
}

impl Default for InvocationSection {
    fn default() -> Self {
        Self {
            dataset_label: None,
            explicit_deployment: false,
            make_default: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    #[serde(default = "default_output_name")]
    pub name: String,

    /// Local directory receiving `named-outputs/<name>/`.
    #[serde(default = "default_destination")]
    pub destination: PathBuf,
}

fn default_output_name() -> String {
    DEFAULT_OUTPUT_NAME.to_string()
}

fn default_destination() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            name: default_output_name(),
            destination: default_destination(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PollSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,

    /// Overall bound per wait; omitted means the default bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_polls: None,
            timeout_secs: None,
        }
    }
}

impl PollSection {
    pub fn to_policy(&self) -> PollPolicy {
        let mut policy = PollPolicy::every(Duration::from_secs(self.interval_secs));
        if let Some(max) = self.max_polls {
            policy = policy.with_max_polls(max);
        }
        if let Some(secs) = self.timeout_secs {
            policy = policy.with_timeout(Some(Duration::from_secs(secs)));
        }
        policy
    }
}

/// End-to-end workflow file, e.g. `workflow.yml`:
///
/// ```yaml
/// compute:
///   name: batch-cluster
///   size: STANDARD_DS3_V2
///   max_instances: 5
/// model:
///   name: heart-classifier
///   path: model
///   type: mlflow_model
/// dataset:
///   name: heart-dataset-unlabeled
///   path: data
///   type: uri_folder
/// endpoint:
///   name_prefix: heart-classifier-
/// deployment: deployment.yml
/// invocation:
///   dataset_label: latest
/// output:
///   name: score
///   destination: downloads
/// poll:
///   interval_secs: 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub compute: ComputeTarget,
    pub model: Model,
    pub dataset: Dataset,
    pub endpoint: EndpointSection,

    /// Deployment descriptor path, relative to the manifest file.
    pub deployment: PathBuf,

    #[serde(default)]
    pub invocation: InvocationSection,

    #[serde(default)]
    pub output: OutputSection,

    /// Overrides the workspace poll policy when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollSection>,

    /// Directory relative paths resolve against; set by [`Manifest::load`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Manifest {
    pub fn from_yaml(raw: &str, base_dir: &Path) -> Result<Self> {
        let mut manifest: Self = serde_yaml::from_str(raw)?;
        manifest.base_dir = base_dir.to_path_buf();
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&raw, base)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(NimbusError::InvalidDescriptor(msg.to_string()));
        if self.compute.name.trim().is_empty() {
            return invalid("compute.name must not be empty");
        }
        if self.model.name.trim().is_empty() {
            return invalid("model.name must not be empty");
        }
        if self.dataset.name.trim().is_empty() {
            return invalid("dataset.name must not be empty");
        }
        if self.endpoint.name.is_some() == self.endpoint.name_prefix.is_some() {
            return invalid("endpoint needs exactly one of name or name_prefix");
        }
        if self.poll.as_ref().is_some_and(|p| p.interval_secs == 0) {
            return invalid("poll.interval_secs must be positive");
        }
        if self.output.name.trim().is_empty() {
            return invalid("output.name must not be empty");
        }
        Ok(())
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.base_dir.join(&self.deployment)
    }

    pub fn load_descriptor(&self) -> Result<DeploymentDescriptor> {
        DeploymentDescriptor::load(&self.descriptor_path())
    }

    pub fn output_destination(&self) -> PathBuf {
        self.base_dir.join(&self.output.destination)
    }

    /// The `poll` section's policy, or `fallback` when the manifest has none.
    pub fn poll_policy(&self, fallback: &PollPolicy) -> PollPolicy {
        self.poll
            .as_ref()
            .map_or_else(|| fallback.clone(), PollSection::to_policy)
    }
}

#[cfg(test)]
mod tests {
    use nimbus_common::ModelType;

    use super::*;

    const MANIFEST: &str = r#"
compute:
  name: batch-cluster
  size: STANDARD_DS3_V2
  min_instances: 0
  max_instances: 5
model:
  name: heart-classifier
  path: model
  type: mlflow_model
  description: Heart disease classifier
dataset:
  name: heart-dataset-unlabeled
  path: data
  type: uri_folder
endpoint:
  name_prefix: heart-classifier-
deployment: deployment.yml
output:
  destination: downloads
poll:
  interval_secs: 5
  max_polls: 100
"#;

    #[test]
    fn test_parse_manifest_with_defaults() {
        let m = Manifest::from_yaml(MANIFEST, Path::new("/work")).unwrap();
        assert_eq!(m.compute.max_instances, 5);
        assert_eq!(m.model.model_type, ModelType::MlflowModel);
        assert!(m.invocation.make_default);
        assert!(!m.invocation.explicit_deployment);
        assert_eq!(m.output.name, "score");
        assert_eq!(m.descriptor_path(), PathBuf::from("/work/deployment.yml"));
        assert_eq!(m.output_destination(), PathBuf::from("/work/downloads"));

        let policy = m.poll_policy(&PollPolicy::default());
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_polls, Some(100));
    }

    #[test]
    fn test_generated_endpoint_name() {
        let m = Manifest::from_yaml(MANIFEST, Path::new(".")).unwrap();
        let ep = m.endpoint.to_endpoint().unwrap();
        let suffix = ep.name.strip_prefix("heart-classifier-").unwrap();
        assert_eq!(suffix.len(), ENDPOINT_SUFFIX_LEN);
    }

    #[test]
    fn test_endpoint_name_and_prefix_are_exclusive() {
        let both = MANIFEST.replace(
            "  name_prefix: heart-classifier-",
            "  name_prefix: heart-classifier-\n  name: fixed",
        );
        let err = Manifest::from_yaml(&both, Path::new(".")).unwrap_err();
        assert!(matches!(err, NimbusError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let raw = format!("{MANIFEST}extra: 1\n");
        assert!(matches!(
            Manifest::from_yaml(&raw, Path::new(".")),
            Err(NimbusError::Yaml(_))
        ));
    }

    #[test]
    fn test_bundled_demo_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../demos/heart-classifier/workflow.yml");
        let m = Manifest::load(&path).unwrap();
        assert_eq!(m.invocation.dataset_label.as_deref(), Some("latest"));

        let descriptor = m.load_descriptor().unwrap();
        assert_eq!(descriptor.name, "classifier-xgboost-mlflow");
        assert_eq!(descriptor.retry_settings.max_retries, 3);
    }

    #[test]
    fn test_missing_poll_section_keeps_workspace_policy() {
        let start = MANIFEST.find("poll:").unwrap();
        let raw = &MANIFEST[..start];
        let m = Manifest::from_yaml(raw, Path::new(".")).unwrap();
        assert_eq!(m.poll, None);

        let flags = PollPolicy::every(Duration::from_secs(3)).with_max_polls(7);
        assert_eq!(m.poll_policy(&flags), flags);
    }
}
