use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use nimbus_common::util::now_ms;
use nimbus_common::{
    check_name, compare_versions, Job, JobInput, JobRequest, JobStatus, Label, NimbusError,
    ProvisioningState, ResourceKind, Result,
};
use nimbus_meta::MetaStore;

use crate::control_plane::ControlPlane;

const JOBS_PREFIX: &str = "/jobs/";

fn store_err<E: std::fmt::Display>(e: E) -> NimbusError {
    NimbusError::Store(e.to_string())
}

fn kind_prefix(kind: ResourceKind, scope: Option<&str>) -> Result<String> {
    match (kind.is_scoped(), scope) {
        (true, Some(scope)) => Ok(format!("/{}/{}/", kind.collection(), scope)),
        (true, None) => Err(NimbusError::InvalidReference(format!(
            "{kind} requires an owning endpoint"
        ))),
        (false, _) => Ok(format!("/{}/", kind.collection())),
    }
}

fn body_str<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(|v| v.as_str())
}

/// Control plane backed by a [`MetaStore`].
///
/// Desired resources and jobs are written to the store; an executor (an
/// external process sharing the store, or a test) advances provisioning and
/// job state through the executor API below.
pub struct StoreControlPlane<S> {
    store: Arc<S>,
}

impl<S> Clone for StoreControlPlane<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: MetaStore> StoreControlPlane<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<(T, u64)>> {
        match self.store.get(key).await.map_err(store_err)? {
            Some((bytes, rev)) => Ok(Some((serde_json::from_slice(&bytes)?, rev))),
            None => Ok(None),
        }
    }

    async fn list_values(&self, prefix: &str) -> Result<Vec<Value>> {
        let kvs = self.store.list_prefix(prefix).await.map_err(store_err)?;
        let mut out = Vec::with_capacity(kvs.len());
        for (key, bytes, _) in kvs {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(v) => out.push(v),
                Err(e) => tracing::warn!(%key, error=%e, "skipping undecodable entry"),
            }
        }
        Ok(out)
    }

    /// Versions of one versioned resource, highest last.
    async fn versions(&self, kind: ResourceKind, name: &str) -> Result<Vec<Value>> {
        let prefix = format!("/{}/{}/", kind.collection(), name);
        let mut versions = self.list_values(&prefix).await?;
        versions.retain(|v| body_str(v, "name") == Some(name));
        versions.sort_by(|a, b| {
            compare_versions(
                body_str(a, "version").unwrap_or(""),
                body_str(b, "version").unwrap_or(""),
            )
        });
        Ok(versions)
    }

    async fn deployment_exists(&self, endpoint: &str, deployment: &str) -> Result<bool> {
        let key = format!("/deployments/{endpoint}/{deployment}");
        Ok(self.store.get(&key).await.map_err(store_err)?.is_some())
    }

    /// An endpoint's default deployment must exist under that same endpoint.
    async fn check_default_deployment(&self, endpoint: &Value) -> Result<()> {
        let Some(default) = body_str(endpoint, "default_deployment") else {
            return Ok(());
        };
        let name = body_str(endpoint, "name").unwrap_or_default();
        if self.deployment_exists(name, default).await? {
            Ok(())
        } else {
            Err(NimbusError::InvalidReference(format!(
                "deployment '{default}' does not exist under endpoint '{name}'"
            )))
        }
    }

    async fn load_job(&self, name: &str) -> Result<(Job, u64)> {
        self.read(&format!("{JOBS_PREFIX}{name}"))
            .await?
            .ok_or_else(|| NimbusError::not_found("job", name))
    }

    async fn all_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .list_values(JOBS_PREFIX)
            .await?
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        jobs.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(jobs)
    }

    // ── Executor API ────────────────────────────────────────────────

    /// Every job in submission order.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.all_jobs().await
    }

    /// Record the outcome of provisioning a compute, endpoint or deployment.
    pub async fn set_provisioning_state(
        &self,
        kind: ResourceKind,
        scope: Option<&str>,
        name: &str,
        state: ProvisioningState,
    ) -> Result<()> {
        if kind.is_versioned() {
            return Err(NimbusError::InvalidReference(format!(
                "{kind} has no provisioning state"
            )));
        }
        let key = format!("{}{}", kind_prefix(kind, scope)?, name);
        let (mut body, rev): (Value, u64) = self
            .read(&key)
            .await?
            .ok_or_else(|| NimbusError::not_found(kind.as_str(), name))?;
        body["provisioning_state"] = serde_json::to_value(state)?;
        self.swap(&key, rev, &body).await?;
        tracing::info!(%kind, name, %state, "provisioning state recorded");
        Ok(())
    }

    /// Move a job forward. Backward moves and moves out of a terminal status
    /// fail with `InvalidTransition`.
    pub async fn advance_job(
        &self,
        name: &str,
        status: JobStatus,
        message: Option<String>,
    ) -> Result<Job> {
        let (mut job, rev) = self.load_job(name).await?;
        if !job.status.can_transition_to(status) {
            return Err(NimbusError::InvalidTransition {
                name: name.to_string(),
                from: job.status,
                to: status,
            });
        }
        if job.status == status && message.is_none() {
            return Ok(job);
        }
        job.status = status;
        if message.is_some() {
            job.message = message;
        }
        job.updated_at_ms = now_ms();
        self.swap(&format!("{JOBS_PREFIX}{name}"), rev, &job).await?;
        tracing::info!(job = name, %status, "job status recorded");
        Ok(job)
    }

    pub async fn append_job_log(&self, name: &str, line: &str) -> Result<()> {
        self.load_job(name).await?;
        let key = format!("/job_logs/{name}");
        let current = self.store.get(&key).await.map_err(store_err)?;
        let (mut text, rev) = match current {
            Some((bytes, rev)) => (String::from_utf8_lossy(&bytes).into_owned(), rev),
            None => (String::new(), 0),
        };
        text.push_str(line);
        text.push('\n');
        let (ok, _) = self
            .store
            .compare_and_swap(&key, rev, text.into_bytes())
            .await
            .map_err(store_err)?;
        if !ok {
            return Err(NimbusError::Store(format!("concurrent write to {key}")));
        }
        Ok(())
    }

    /// Publish one file of a named job output.
    pub async fn put_output_file(
        &self,
        job: &str,
        output: &str,
        path: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        let (job, _) = self.load_job(job).await?;
        if !job.outputs.iter().any(|o| o == output) {
            return Err(NimbusError::not_found("output", format!("{}/{output}", job.name)));
        }
        let key = format!("/outputs/{}/{output}/{path}", job.name);
        self.store.put(&key, content).await.map_err(store_err)?;
        Ok(())
    }

    async fn swap<T: serde::Serialize>(&self, key: &str, rev: u64, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let (ok, _) = self
            .store
            .compare_and_swap(key, rev, bytes)
            .await
            .map_err(store_err)?;
        if ok {
            Ok(())
        } else {
            Err(NimbusError::Store(format!("concurrent modification of {key}")))
        }
    }

    async fn insert_job(&self, job: &Job) -> Result<()> {
        let key = format!("{JOBS_PREFIX}{}", job.name);
        let created = self
            .store
            .create_if_absent(&key, serde_json::to_vec(job)?)
            .await
            .map_err(store_err)?;
        if created {
            Ok(())
        } else {
            Err(NimbusError::CreationConflict {
                kind: "job",
                name: job.name.clone(),
            })
        }
    }
}

#[async_trait]
impl<S: MetaStore + 'static> ControlPlane for StoreControlPlane<S> {
    async fn list(&self, kind: ResourceKind, scope: Option<&str>) -> Result<Vec<Value>> {
        self.list_values(&kind_prefix(kind, scope)?).await
    }

    async fn get(&self, kind: ResourceKind, scope: Option<&str>, name: &str) -> Result<Value> {
        if kind.is_versioned() {
            return self
                .versions(kind, name)
                .await?
                .pop()
                .ok_or_else(|| NimbusError::not_found(kind.as_str(), name));
        }
        let key = format!("{}{}", kind_prefix(kind, scope)?, name);
        self.read::<Value>(&key)
            .await?
            .map(|(v, _)| v)
            .ok_or_else(|| NimbusError::not_found(kind.as_str(), name))
    }

    async fn create(
        &self,
        kind: ResourceKind,
        scope: Option<&str>,
        mut body: Value,
    ) -> Result<Value> {
        let name = body_str(&body, "name").unwrap_or_default().to_string();
        check_name(kind, "name", &name)?;

        let key = match kind {
            ResourceKind::Model | ResourceKind::Dataset => {
                let version = match body_str(&body, "version") {
                    Some(v) => {
                        check_name(kind, "version", v)?;
                        v.to_string()
                    }
                    None => {
                        let latest = self.versions(kind, &name).await?.pop();
                        let next = latest
                            .as_ref()
                            .and_then(|v| body_str(v, "version"))
                            .and_then(|v| v.parse::<u64>().ok())
                            .map_or(1, |v| v + 1);
                        next.to_string()
                    }
                };
                body["version"] = Value::String(version.clone());
                format!("/{}/{name}/{version}", kind.collection())
            }
            ResourceKind::Deployment => {
                let endpoint = body_str(&body, "endpoint_name").unwrap_or_default().to_string();
                check_name(ResourceKind::Endpoint, "name", &endpoint)?;
                if scope.is_some_and(|s| s != endpoint) {
                    return Err(NimbusError::InvalidReference(format!(
                        "deployment '{name}' belongs to '{endpoint}', not '{}'",
                        scope.unwrap_or_default()
                    )));
                }
                if self.store.get(&format!("/endpoints/{endpoint}")).await.map_err(store_err)?.is_none() {
                    return Err(NimbusError::not_found("endpoint", endpoint));
                }
                format!("/deployments/{endpoint}/{name}")
            }
            ResourceKind::Endpoint => {
                self.check_default_deployment(&body).await?;
                format!("/endpoints/{name}")
            }
            ResourceKind::Compute => format!("/computes/{name}"),
        };

        if !kind.is_versioned() {
            body["provisioning_state"] = serde_json::to_value(ProvisioningState::Creating)?;
        }
        body["created_at_ms"] = Value::from(now_ms());

        let created = self
            .store
            .create_if_absent(&key, serde_json::to_vec(&body)?)
            .await
            .map_err(store_err)?;
        if !created {
            return Err(NimbusError::CreationConflict {
                kind: kind.as_str(),
                name,
            });
        }
        Ok(body)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        scope: Option<&str>,
        name: &str,
        body: Value,
    ) -> Result<Value> {
        if kind.is_versioned() {
            return Err(NimbusError::InvalidReference(format!(
                "{kind} versions are immutable; register a new version instead"
            )));
        }
        if body_str(&body, "name") != Some(name) {
            return Err(NimbusError::InvalidReference(format!(
                "body name does not match {kind} '{name}'"
            )));
        }
        let key = format!("{}{}", kind_prefix(kind, scope)?, name);
        let (current, rev): (Value, u64) = self
            .read(&key)
            .await?
            .ok_or_else(|| NimbusError::not_found(kind.as_str(), name))?;
        if kind == ResourceKind::Endpoint {
            self.check_default_deployment(&body).await?;
        }
        // Server-owned fields survive client updates.
        let mut body = body;
        for field in ["provisioning_state", "created_at_ms"] {
            if let Some(v) = current.get(field) {
                body[field] = v.clone();
            }
        }
        self.swap(&key, rev, &body).await?;
        Ok(body)
    }

    async fn submit_job(&self, req: &JobRequest) -> Result<Job> {
        let (endpoint, _): (Value, u64) = self
            .read(&format!("/endpoints/{}", req.endpoint))
            .await?
            .ok_or_else(|| NimbusError::not_found("endpoint", req.endpoint.clone()))?;

        let deployment = match req.deployment.as_deref() {
            Some(d) => d.to_string(),
            None => body_str(&endpoint, "default_deployment")
                .ok_or_else(|| {
                    NimbusError::InvalidReference(format!(
                        "endpoint '{}' has no default deployment",
                        req.endpoint
                    ))
                })?
                .to_string(),
        };
        if !self.deployment_exists(&req.endpoint, &deployment).await? {
            return Err(NimbusError::not_found(
                "deployment",
                format!("{}/{deployment}", req.endpoint),
            ));
        }

        if let JobInput::Dataset { name, label } = &req.input {
            let versions = self.versions(ResourceKind::Dataset, name).await?;
            let found = match label.as_deref().map(Label::parse) {
                None | Some(Label::Latest) => !versions.is_empty(),
                Some(Label::Version(l)) => versions
                    .iter()
                    .any(|v| body_str(v, "version") == Some(l.as_str())),
            };
            if !found {
                return Err(NimbusError::not_found("dataset", req.input.to_string()));
            }
        }

        let now = now_ms();
        let parent = Job {
            name: format!("batchjob-{}", Uuid::new_v4()),
            endpoint: req.endpoint.clone(),
            deployment,
            input: req.input.clone(),
            status: JobStatus::Pending,
            parent: None,
            outputs: req.outputs.clone(),
            message: None,
            created_at_ms: now,
            updated_at_ms: now,
        };
        let scoring = Job {
            name: format!("{}-scoring", parent.name),
            parent: Some(parent.name.clone()),
            outputs: Vec::new(),
            ..parent.clone()
        };
        self.insert_job(&parent).await?;
        self.insert_job(&scoring).await?;

        tracing::info!(
            job = %parent.name,
            endpoint = %parent.endpoint,
            deployment = %parent.deployment,
            "job submitted"
        );
        Ok(parent)
    }

    async fn get_job(&self, name: &str) -> Result<Job> {
        Ok(self.load_job(name).await?.0)
    }

    async fn list_child_jobs(&self, parent: &str) -> Result<Vec<Job>> {
        self.load_job(parent).await?;
        Ok(self
            .all_jobs()
            .await?
            .into_iter()
            .filter(|j| j.parent.as_deref() == Some(parent))
            .collect())
    }

    async fn job_logs(&self, name: &str) -> Result<String> {
        self.load_job(name).await?;
        let logs = self
            .store
            .get(&format!("/job_logs/{name}"))
            .await
            .map_err(store_err)?;
        Ok(logs
            .map(|(bytes, _)| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default())
    }

    async fn list_output_files(&self, job: &str, output: &str) -> Result<Vec<String>> {
        let (job, _) = self.load_job(job).await?;
        if !job.outputs.iter().any(|o| o == output) {
            return Err(NimbusError::not_found("output", format!("{}/{output}", job.name)));
        }
        let prefix = format!("/outputs/{}/{output}/", job.name);
        let kvs = self.store.list_prefix(&prefix).await.map_err(store_err)?;
        Ok(kvs
            .into_iter()
            .filter_map(|(k, _, _)| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    async fn read_output_file(&self, job: &str, output: &str, path: &str) -> Result<Vec<u8>> {
        let key = format!("/outputs/{job}/{output}/{path}");
        self.store
            .get(&key)
            .await
            .map_err(store_err)?
            .map(|(bytes, _)| bytes)
            .ok_or_else(|| NimbusError::not_found("output file", format!("{job}/{output}/{path}")))
    }
}
