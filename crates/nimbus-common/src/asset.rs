use serde::{Deserialize, Serialize};

use crate::resource::{Resource, ResourceKind};

/// Storage format of a registered model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Self-describing format; deployments need no environment or scoring script.
    #[default]
    MlflowModel,
    CustomModel,
    TritonModel,
}

/// A registered model version.
///
/// Stored under `/models/{name}/{version}`. Immutable once registered; registering
/// the same name again creates a new version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub name: String,

    /// Assigned by the control plane when omitted at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Local or remote path of the model files.
    pub path: String,

    #[serde(rename = "type", default)]
    pub model_type: ModelType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub created_at_ms: u64,
}

impl Model {
    pub fn new(name: impl Into<String>, path: impl Into<String>, model_type: ModelType) -> Self {
        Self {
            name: name.into(),
            version: None,
            path: path.into(),
            model_type,
            description: None,
            created_at_ms: 0,
        }
    }
}

impl Resource for Model {
    const KIND: ResourceKind = ResourceKind::Model;

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    #[default]
    UriFolder,
    UriFile,
}

/// A registered input dataset version. Stored under `/datasets/{name}/{version}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub path: String,

    #[serde(rename = "type", default)]
    pub data_type: DatasetType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub created_at_ms: u64,
}

impl Dataset {
    pub fn new(name: impl Into<String>, path: impl Into<String>, data_type: DatasetType) -> Self {
        Self {
            name: name.into(),
            version: None,
            path: path.into(),
            data_type,
            description: None,
            created_at_ms: 0,
        }
    }
}

impl Resource for Dataset {
    const KIND: ResourceKind = ResourceKind::Dataset;

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}
