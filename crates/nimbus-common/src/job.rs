use std::fmt;

use serde::{Deserialize, Serialize};

/// Output name the backend uses for scoring results unless told otherwise.
pub const DEFAULT_OUTPUT_NAME: &str = "score";

/// Job status. Moves forward only: pending → running → {completed | failed}.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Whether `self -> next` respects monotonic progress. Re-asserting the
    /// current status is allowed; leaving a terminal status is not.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a batch job scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobInput {
    /// A registered dataset; `label` defaults to the latest version.
    Dataset {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// A raw storage URI (file or folder).
    Uri { uri: String },
}

impl fmt::Display for JobInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobInput::Dataset { name, label } => match label {
                Some(l) => write!(f, "{name}@{l}"),
                None => write!(f, "{name}@latest"),
            },
            JobInput::Uri { uri } => f.write_str(uri),
        }
    }
}

/// Invocation request sent to an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRequest {
    pub endpoint: String,

    /// Omitted means the backend routes to the endpoint's default deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    pub input: JobInput,

    #[serde(default = "default_outputs")]
    pub outputs: Vec<String>,
}

fn default_outputs() -> Vec<String> {
    vec![DEFAULT_OUTPUT_NAME.to_string()]
}

impl JobRequest {
    pub fn new(endpoint: impl Into<String>, input: JobInput) -> Self {
        Self {
            endpoint: endpoint.into(),
            deployment: None,
            input,
            outputs: default_outputs(),
        }
    }

    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }
}

/// A batch job as reported by the control plane. Stored under `/jobs/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub name: String,
    pub endpoint: String,

    /// Deployment the backend actually routed to.
    pub deployment: String,

    pub input: JobInput,
    pub status: JobStatus,

    /// Set on sub-jobs spawned by a parent (e.g. the scoring execution).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    /// Failure reason reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub created_at_ms: u64,

    #[serde(default)]
    pub updated_at_ms: u64,
}
