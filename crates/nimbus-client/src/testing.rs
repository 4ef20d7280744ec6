//! Fakes shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use nimbus_common::{
    Deployment, DeploymentResources, Endpoint, Job, JobRequest, LoggingLevel, OutputAction,
    ProvisioningState, ResourceKind, Result, RetrySettings,
};
use nimbus_meta::MemoryMetaStore;

use crate::control_plane::ControlPlane;
use crate::store::StoreControlPlane;
use crate::workspace::Workspace;

pub type MemoryPlane = StoreControlPlane<MemoryMetaStore>;

pub fn memory_plane() -> Arc<MemoryPlane> {
    Arc::new(StoreControlPlane::new(Arc::new(MemoryMetaStore::new())))
}

pub fn memory_workspace() -> (Workspace, Arc<MemoryPlane>) {
    let plane = memory_plane();
    (Workspace::new(plane.clone()), plane)
}

pub async fn seed_endpoint(ws: &Workspace, name: &str) {
    ws.ensure_endpoint(&Endpoint::new(name)).await.unwrap();
}

pub fn deployment(endpoint: &str, name: &str) -> Deployment {
    Deployment {
        name: name.to_string(),
        endpoint_name: endpoint.to_string(),
        description: None,
        model: "azureml:m:1".to_string(),
        compute: "azureml:c".to_string(),
        environment: None,
        code_configuration: None,
        resources: DeploymentResources::default(),
        max_concurrency_per_instance: 1,
        mini_batch_size: 10,
        output_action: OutputAction::AppendRow,
        output_file_name: "predictions.csv".to_string(),
        retry_settings: RetrySettings::default(),
        error_threshold: -1,
        logging_level: LoggingLevel::Info,
        provisioning_state: ProvisioningState::Creating,
        created_at_ms: 0,
    }
}

/// Endpoint `endpoint` with deployment `name` set as its default.
pub async fn seed_routable_endpoint(ws: &Workspace, endpoint: &str, name: &str) {
    seed_endpoint(ws, endpoint).await;
    ws.ensure_deployment(&deployment(endpoint, name)).await.unwrap();
    ws.set_default_deployment(endpoint, name).await.unwrap();
}

/// Delegating control plane that counts creates and can hide one listing,
/// simulating a concurrent creator.
pub struct CountingPlane {
    inner: Arc<MemoryPlane>,
    pub creates: AtomicU32,
    pub hide_next_list: AtomicBool,
}

impl CountingPlane {
    pub fn memory() -> (Arc<CountingPlane>, Arc<MemoryPlane>) {
        let inner = memory_plane();
        let plane = Arc::new(CountingPlane {
            inner: inner.clone(),
            creates: AtomicU32::new(0),
            hide_next_list: AtomicBool::new(false),
        });
        (plane, inner)
    }
}

#[async_trait]
impl ControlPlane for CountingPlane {
    async fn list(&self, kind: ResourceKind, scope: Option<&str>) -> Result<Vec<Value>> {
        if self.hide_next_list.swap(false, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.list(kind, scope).await
    }

    async fn get(&self, kind: ResourceKind, scope: Option<&str>, name: &str) -> Result<Value> {
        self.inner.get(kind, scope, name).await
    }

    async fn create(&self, kind: ResourceKind, scope: Option<&str>, body: Value) -> Result<Value> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(kind, scope, body).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        scope: Option<&str>,
        name: &str,
        body: Value,
    ) -> Result<Value> {
        self.inner.update(kind, scope, name, body).await
    }

    async fn submit_job(&self, req: &JobRequest) -> Result<Job> {
        self.inner.submit_job(req).await
    }

    async fn get_job(&self, name: &str) -> Result<Job> {
        self.inner.get_job(name).await
    }

    async fn list_child_jobs(&self, parent: &str) -> Result<Vec<Job>> {
        self.inner.list_child_jobs(parent).await
    }

    async fn job_logs(&self, name: &str) -> Result<String> {
        self.inner.job_logs(name).await
    }

    async fn list_output_files(&self, job: &str, output: &str) -> Result<Vec<String>> {
        self.inner.list_output_files(job, output).await
    }

    async fn read_output_file(&self, job: &str, output: &str, path: &str) -> Result<Vec<u8>> {
        self.inner.read_output_file(job, output, path).await
    }
}
