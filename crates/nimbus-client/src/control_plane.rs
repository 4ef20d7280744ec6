use async_trait::async_trait;
use serde_json::Value;

use nimbus_common::{Job, JobRequest, ResourceKind, Result};

/// Request/response surface of the remote control plane.
///
/// Resources travel as JSON so that one object-safe trait serves every kind;
/// typed access lives on [`crate::Workspace`]. `scope` names the owning
/// endpoint for deployments and is `None` for every other kind.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Every resource of `kind`. Versioned kinds return one entry per version.
    async fn list(&self, kind: ResourceKind, scope: Option<&str>) -> Result<Vec<Value>>;

    /// A single resource; for versioned kinds, the latest version.
    async fn get(&self, kind: ResourceKind, scope: Option<&str>, name: &str) -> Result<Value>;

    /// Fails with `CreationConflict` when the name (or name + version) is taken.
    async fn create(&self, kind: ResourceKind, scope: Option<&str>, body: Value) -> Result<Value>;

    /// Replaces an existing resource; fails with `ResourceNotFound` when absent.
    async fn update(
        &self,
        kind: ResourceKind,
        scope: Option<&str>,
        name: &str,
        body: Value,
    ) -> Result<Value>;

    async fn submit_job(&self, req: &JobRequest) -> Result<Job>;
    async fn get_job(&self, name: &str) -> Result<Job>;

    /// Sub-jobs spawned by `parent`, in backend order.
    async fn list_child_jobs(&self, parent: &str) -> Result<Vec<Job>>;

    async fn job_logs(&self, name: &str) -> Result<String>;

    /// Relative paths of the files making up a named job output.
    async fn list_output_files(&self, job: &str, output: &str) -> Result<Vec<String>>;

    async fn read_output_file(&self, job: &str, output: &str, path: &str) -> Result<Vec<u8>>;
}
