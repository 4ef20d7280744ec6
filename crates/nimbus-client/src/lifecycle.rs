use serde_json::Value;
use tokio_util::sync::CancellationToken;

use nimbus_common::{
    compare_versions, ComputeTarget, Dataset, Deployment, DeploymentDescriptor, Endpoint, Label,
    Model, NimbusError, ProvisioningState, Provisioned, Resource, ResourceRef, Result,
};

use crate::waiter::wait_until_terminal;
use crate::workspace::Workspace;

/// Result of an ensure call.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensured<R> {
    pub resource: R,
    /// False when the resource already existed and was left untouched.
    pub created: bool,
}

fn decode<R: Resource>(value: Value) -> Result<R> {
    Ok(serde_json::from_value(value)?)
}

/// Picks the entry matching `label` among all versions of one name.
fn select_version<R: Resource>(versions: Vec<R>, name: &str, label: Option<&Label>) -> Result<R> {
    let found = match label {
        None | Some(Label::Latest) => versions.into_iter().max_by(|a, b| {
            compare_versions(a.version().unwrap_or(""), b.version().unwrap_or(""))
        }),
        Some(Label::Version(v)) => versions
            .into_iter()
            .find(|r| r.version() == Some(v.as_str())),
    };
    found.ok_or_else(|| {
        let shown = match label {
            Some(l) => format!("{name}@{l}"),
            None => name.to_string(),
        };
        NimbusError::not_found(R::KIND.as_str(), shown)
    })
}

impl Workspace {
    pub async fn list<R: Resource>(&self, scope: Option<&str>) -> Result<Vec<R>> {
        self.control_plane()
            .list(R::KIND, scope)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Fetch an unversioned resource, or the latest version of a versioned one.
    pub async fn get<R: Resource>(&self, scope: Option<&str>, name: &str) -> Result<R> {
        decode(self.control_plane().get(R::KIND, scope, name).await?)
    }

    /// Fetch a versioned resource by label; `None` and `latest` pick the highest version.
    pub async fn get_versioned<R: Resource>(&self, name: &str, label: Option<&Label>) -> Result<R> {
        let versions: Vec<R> = self
            .list::<R>(None)
            .await?
            .into_iter()
            .filter(|r| r.name() == name)
            .collect();
        select_version(versions, name, label)
    }

    /// Create `spec` unless a resource with the same name already exists.
    ///
    /// Existing resources are returned untouched; drift is not reconciled.
    /// Listing and creating are separate calls, so a concurrent caller can win
    /// the race; the resulting conflict is resolved by re-reading the winner.
    pub async fn ensure<R: Resource>(&self, spec: &R) -> Result<Ensured<R>> {
        let kind = R::KIND;
        let scope = spec.scope();
        let name = spec.name();

        let existing: Vec<R> = self
            .list::<R>(scope)
            .await?
            .into_iter()
            .filter(|r| r.name() == name)
            .collect();
        if !existing.is_empty() {
            tracing::info!(%kind, name, "already present, leaving untouched");
            let resource = select_version(existing, name, None)?;
            return Ok(Ensured {
                resource,
                created: false,
            });
        }

        let body = serde_json::to_value(spec)?;
        match self.control_plane().create(kind, scope, body).await {
            Ok(created) => {
                tracing::info!(%kind, name, "created");
                Ok(Ensured {
                    resource: decode(created)?,
                    created: true,
                })
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(%kind, name, "created concurrently by another caller");
                Ok(Ensured {
                    resource: self.get(scope, name).await?,
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn ensure_compute(&self, spec: &ComputeTarget) -> Result<Ensured<ComputeTarget>> {
        self.ensure(spec).await
    }

    pub async fn ensure_model(&self, spec: &Model) -> Result<Ensured<Model>> {
        self.ensure(spec).await
    }

    pub async fn ensure_dataset(&self, spec: &Dataset) -> Result<Ensured<Dataset>> {
        self.ensure(spec).await
    }

    pub async fn ensure_endpoint(&self, spec: &Endpoint) -> Result<Ensured<Endpoint>> {
        self.ensure(spec).await
    }

    pub async fn ensure_deployment(&self, spec: &Deployment) -> Result<Ensured<Deployment>> {
        self.ensure(spec).await
    }

    /// Register a new model version unconditionally.
    pub async fn register_model(&self, spec: &Model) -> Result<Model> {
        let body = serde_json::to_value(spec)?;
        decode(self.control_plane().create(Model::KIND, None, body).await?)
    }

    pub async fn get_model(&self, name: &str, label: Option<&str>) -> Result<Model> {
        let label = label.map(Label::parse);
        self.get_versioned(name, label.as_ref()).await
    }

    pub async fn get_dataset(&self, name: &str, label: Option<&str>) -> Result<Dataset> {
        let label = label.map(Label::parse);
        self.get_versioned(name, label.as_ref()).await
    }

    /// Upsert: update when the endpoint exists, create otherwise.
    pub async fn create_or_update_endpoint(&self, endpoint: &Endpoint) -> Result<Endpoint> {
        let body = serde_json::to_value(endpoint)?;
        let cp = self.control_plane();
        match cp.update(Endpoint::KIND, None, &endpoint.name, body.clone()).await {
            Ok(v) => decode(v),
            Err(e) if e.is_not_found() => decode(cp.create(Endpoint::KIND, None, body).await?),
            Err(e) => Err(e),
        }
    }

    /// Point `endpoint` at `deployment` for invocations that name no deployment.
    ///
    /// Rejected with `InvalidReference` unless the deployment exists under
    /// that same endpoint.
    pub async fn set_default_deployment(
        &self,
        endpoint: &str,
        deployment: &str,
    ) -> Result<Endpoint> {
        let deployments = self.list::<Deployment>(Some(endpoint)).await?;
        if !deployments.iter().any(|d| d.name == deployment) {
            return Err(NimbusError::InvalidReference(format!(
                "deployment '{deployment}' does not exist under endpoint '{endpoint}'"
            )));
        }

        let mut ep: Endpoint = self.get(None, endpoint).await?;
        if ep.default_deployment.as_deref() == Some(deployment) {
            return Ok(ep);
        }
        ep.default_deployment = Some(deployment.to_string());
        let body = serde_json::to_value(&ep)?;
        let updated = decode(
            self.control_plane()
                .update(Endpoint::KIND, None, endpoint, body)
                .await?,
        )?;
        tracing::info!(endpoint, deployment, "default deployment updated");
        Ok(updated)
    }

    /// Resolve a descriptor model reference to a concrete registered version.
    pub async fn resolve_model_reference(&self, raw: &str) -> Result<Model> {
        let reference = ResourceRef::parse(raw)?;
        self.get_versioned(&reference.name, reference.label.as_ref())
            .await
    }

    /// Validate a descriptor, pin its model reference to a concrete version
    /// and ensure the deployment.
    pub async fn apply_descriptor(
        &self,
        descriptor: DeploymentDescriptor,
    ) -> Result<Ensured<Deployment>> {
        descriptor.validate()?;

        let compute_ref = ResourceRef::parse(&descriptor.compute)?;
        self.get::<ComputeTarget>(None, &compute_ref.name).await?;

        let model_ref = ResourceRef::parse(&descriptor.model)?;
        let model = self.resolve_model_reference(&descriptor.model).await?;
        let pinned = ResourceRef {
            label: model.version.clone().map(Label::Version),
            ..model_ref
        };

        let deployment = descriptor.into_deployment(pinned.to_string());
        self.ensure_deployment(&deployment).await
    }

    /// Block until a provisioned resource leaves `creating`.
    pub async fn wait_for_provisioning<R: Provisioned>(
        &self,
        scope: Option<&str>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<R> {
        let what = format!("{} '{}'", R::KIND, name);
        let resource: R = wait_until_terminal(
            &what,
            self.poll_policy(),
            cancel,
            || self.get::<R>(scope, name),
            |r: &R| r.provisioning_state().is_terminal(),
        )
        .await?;

        if resource.provisioning_state() == ProvisioningState::Failed {
            return Err(NimbusError::ProvisioningFailed {
                kind: R::KIND.as_str(),
                name: name.to_string(),
            });
        }
        Ok(resource)
    }

    pub async fn wait_for_compute(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ComputeTarget> {
        self.wait_for_provisioning(None, name, cancel).await
    }

    pub async fn wait_for_endpoint(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Endpoint> {
        self.wait_for_provisioning(None, name, cancel).await
    }

    pub async fn wait_for_deployment(
        &self,
        endpoint: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Deployment> {
        self.wait_for_provisioning(Some(endpoint), name, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use nimbus_common::{ModelType, ResourceKind};

    use super::*;
    use crate::testing::{deployment, memory_workspace, seed_endpoint, CountingPlane};

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (plane, _) = CountingPlane::memory();
        let ws = Workspace::new(plane.clone());
        let spec = ComputeTarget::new("batch-cluster", "STANDARD_DS3_V2").with_instances(0, 5);

        let first = ws.ensure_compute(&spec).await.unwrap();
        let second = ws.ensure_compute(&spec).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.resource.name, "batch-cluster");
        assert_eq!(plane.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_leaves_existing_untouched() {
        let (ws, _) = memory_workspace();
        ws.ensure_compute(&ComputeTarget::new("c", "small")).await.unwrap();

        let drifted = ComputeTarget::new("c", "huge").with_instances(2, 10);
        let again = ws.ensure_compute(&drifted).await.unwrap();
        assert_eq!(again.resource.size, "small");
        assert_eq!(again.resource.max_instances, 1);
    }

    #[tokio::test]
    async fn test_ensure_resolves_create_race() {
        let (plane, _) = CountingPlane::memory();
        let ws = Workspace::new(plane.clone());
        // Another caller creates between our list and create.
        plane.hide_next_list.store(true, Ordering::SeqCst);
        ws.control_plane()
            .create(
                ResourceKind::Endpoint,
                None,
                serde_json::to_value(Endpoint::new("ep")).unwrap(),
            )
            .await
            .unwrap();

        let out = ws.ensure_endpoint(&Endpoint::new("ep")).await.unwrap();
        assert!(!out.created);
        assert_eq!(out.resource.name, "ep");
    }

    #[tokio::test]
    async fn test_model_versions_and_labels() {
        let (ws, _) = memory_workspace();
        let spec = Model::new("heart-classifier", "model", ModelType::MlflowModel);
        let v1 = ws.ensure_model(&spec).await.unwrap();
        assert_eq!(v1.resource.version.as_deref(), Some("1"));

        // A second registration of the same name is a new version.
        for _ in 0..10 {
            ws.register_model(&spec).await.unwrap();
        }

        let latest = ws.get_model("heart-classifier", Some("latest")).await.unwrap();
        assert_eq!(latest.version.as_deref(), Some("11"));
        let pinned = ws.get_model("heart-classifier", Some("2")).await.unwrap();
        assert_eq!(pinned.version.as_deref(), Some("2"));

        let missing = ws.get_model("heart-classifier", Some("99")).await.unwrap_err();
        assert!(missing.is_not_found());
        let missing = ws.get_model("nope", None).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_default_deployment_must_live_under_endpoint() {
        let (ws, _) = memory_workspace();
        seed_endpoint(&ws, "endpoint-e").await;
        seed_endpoint(&ws, "endpoint-f").await;
        ws.ensure_deployment(&deployment("endpoint-f", "d2"))
            .await
            .unwrap();

        let err = ws
            .set_default_deployment("endpoint-e", "d2")
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::InvalidReference(_)));

        let e: Endpoint = ws.get(None, "endpoint-e").await.unwrap();
        assert_eq!(e.default_deployment, None);
    }

    #[tokio::test]
    async fn test_set_default_deployment() {
        let (ws, _) = memory_workspace();
        seed_endpoint(&ws, "ep").await;
        ws.ensure_deployment(&deployment("ep", "d1")).await.unwrap();

        let ep = ws.set_default_deployment("ep", "d1").await.unwrap();
        assert_eq!(ep.default_deployment.as_deref(), Some("d1"));
        let fetched: Endpoint = ws.get(None, "ep").await.unwrap();
        assert_eq!(fetched.default_deployment.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn test_create_or_update_endpoint_upserts() {
        let (ws, _) = memory_workspace();
        let mut ep = Endpoint::new("ep");
        ws.create_or_update_endpoint(&ep).await.unwrap();

        ep.description = Some("heart classifier".into());
        let updated = ws.create_or_update_endpoint(&ep).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("heart classifier"));
        assert_eq!(ws.list::<Endpoint>(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_descriptor_pins_model_version() {
        let (ws, _) = memory_workspace();
        seed_endpoint(&ws, "heart-classifier-batch").await;
        ws.ensure_compute(&ComputeTarget::new("batch-cluster", "STANDARD_DS3_V2"))
            .await
            .unwrap();
        let spec = Model::new("heart-classifier", "model", ModelType::MlflowModel);
        ws.register_model(&spec).await.unwrap();
        ws.register_model(&spec).await.unwrap();

        let descriptor = DeploymentDescriptor::from_yaml(
            "endpoint_name: heart-classifier-batch\nname: xgb\nmodel: azureml:heart-classifier@latest\ncompute: azureml:batch-cluster\n",
        )
        .unwrap();
        let out = ws.apply_descriptor(descriptor).await.unwrap();
        assert!(out.created);
        assert_eq!(out.resource.model, "azureml:heart-classifier:2");
    }

    #[tokio::test]
    async fn test_apply_descriptor_requires_compute() {
        let (ws, _) = memory_workspace();
        seed_endpoint(&ws, "e").await;
        let descriptor = DeploymentDescriptor::from_yaml(
            "endpoint_name: e\nname: d\nmodel: azureml:m@latest\ncompute: azureml:missing\n",
        )
        .unwrap();
        let err = ws.apply_descriptor(descriptor).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_compute_reports_failure() {
        let (ws, store) = memory_workspace();
        ws.ensure_compute(&ComputeTarget::new("c", "small")).await.unwrap();
        store
            .set_provisioning_state(ResourceKind::Compute, None, "c", ProvisioningState::Failed)
            .await
            .unwrap();

        let err = ws
            .wait_for_compute("c", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::ProvisioningFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_compute_until_succeeded() {
        let (ws, store) = memory_workspace();
        ws.ensure_compute(&ComputeTarget::new("c", "small")).await.unwrap();

        let executor = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(45)).await;
            executor
                .set_provisioning_state(
                    ResourceKind::Compute,
                    None,
                    "c",
                    ProvisioningState::Succeeded,
                )
                .await
                .unwrap();
        });

        let c = ws
            .wait_for_compute("c", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(c.provisioning_state, ProvisioningState::Succeeded);
    }
}
