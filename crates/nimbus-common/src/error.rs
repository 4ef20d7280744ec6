use std::fmt;

use crate::job::JobStatus;

/// Malformed scoring output text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Byte offset into the input where parsing stopped.
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed result text at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, thiserror::Error)]
pub enum NimbusError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{kind} '{name}' not found")]
    ResourceNotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    CreationConflict { kind: &'static str, name: String },

    #[error("provisioning {kind} '{name}' failed")]
    ProvisioningFailed { kind: &'static str, name: String },

    #[error("job '{name}' failed: {message}")]
    JobFailed { name: String, message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("timed out waiting for {what} after {polls} polls")]
    Timeout { what: String, polls: u32 },

    #[error("waiting for {what} was cancelled")]
    Cancelled { what: String },

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid deployment descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("job '{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("metadata store error: {0}")]
    Store(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NimbusError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        NimbusError::ResourceNotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NimbusError::ResourceNotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, NimbusError::CreationConflict { .. })
    }
}

pub type Result<T, E = NimbusError> = std::result::Result<T, E>;
