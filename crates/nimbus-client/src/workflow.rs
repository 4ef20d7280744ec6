use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use nimbus_common::{
    ComputeTarget, Dataset, Deployment, Endpoint, Job, JobInput, JobRequest, Model, Result,
};

use crate::manifest::Manifest;
use crate::results::PredictionTable;
use crate::workspace::Workspace;

/// Everything a workflow run touched, in the order it was produced.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub compute: ComputeTarget,
    pub model: Model,
    pub dataset: Dataset,
    pub endpoint: Endpoint,
    pub deployment: Deployment,
    pub job: Job,
    pub scoring_job: Job,
    pub output_dir: PathBuf,
    pub predictions: PredictionTable,
}

/// Run the batch-scoring flow described by `manifest`: provision, register,
/// deploy, invoke, wait and fetch the parsed predictions.
///
/// The manifest's `poll` section, when present, replaces the workspace poll
/// policy for every wait. Every step propagates its error; nothing is rolled
/// back.
pub async fn run_workflow(
    ws: &Workspace,
    manifest: &Manifest,
    cancel: &CancellationToken,
) -> Result<WorkflowReport> {
    let ws = ws
        .clone()
        .with_poll_policy(manifest.poll_policy(ws.poll_policy()));

    let compute = ws.ensure_compute(&manifest.compute).await?.resource;
    let compute = ws.wait_for_compute(&compute.name, cancel).await?;

    let model = ws.ensure_model(&manifest.model).await?.resource;
    let dataset = ws.ensure_dataset(&manifest.dataset).await?.resource;

    let endpoint = manifest.endpoint.to_endpoint()?;
    let endpoint = ws.ensure_endpoint(&endpoint).await?.resource;
    let endpoint = ws.wait_for_endpoint(&endpoint.name, cancel).await?;

    let mut descriptor = manifest.load_descriptor()?;
    if descriptor.endpoint_name != endpoint.name {
        tracing::info!(
            from = %descriptor.endpoint_name,
            to = %endpoint.name,
            "binding descriptor to workflow endpoint"
        );
        descriptor.endpoint_name = endpoint.name.clone();
    }
    let deployment = ws.apply_descriptor(descriptor).await?.resource;
    let deployment = ws
        .wait_for_deployment(&endpoint.name, &deployment.name, cancel)
        .await?;

    let endpoint = if manifest.invocation.make_default {
        ws.set_default_deployment(&endpoint.name, &deployment.name)
            .await?
    } else {
        endpoint
    };

    let req = JobRequest {
        endpoint: endpoint.name.clone(),
        deployment: manifest
            .invocation
            .explicit_deployment
            .then(|| deployment.name.clone()),
        input: JobInput::Dataset {
            name: dataset.name.clone(),
            label: manifest.invocation.dataset_label.clone(),
        },
        outputs: vec![manifest.output.name.clone()],
    };
    let job = ws.submit(&req).await?;
    let job = ws.wait_for_job(&job.name, cancel).await?;

    let scoring_job = ws.first_child_job(&job.name).await?;
    let scoring_job = ws.wait_for_job(&scoring_job.name, cancel).await?;

    let destination = manifest.output_destination();
    let output_dir = ws
        .download_output(&job.name, &manifest.output.name, &destination)
        .await?;
    let predictions = crate::results::read_predictions(
        &output_dir.join(&deployment.output_file_name),
    )
    .await?;

    tracing::info!(
        job = %job.name,
        rows = predictions.len(),
        dir = %output_dir.display(),
        "workflow finished"
    );

    Ok(WorkflowReport {
        compute,
        model,
        dataset,
        endpoint,
        deployment,
        job,
        scoring_job,
        output_dir,
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use nimbus_common::{JobStatus, NimbusError, ProvisioningState, ResourceKind};

    use super::*;
    use crate::control_plane::ControlPlane;
    use crate::testing::{memory_workspace, MemoryPlane};

    const MANIFEST: &str = r#"
compute:
  name: batch-cluster
  size: STANDARD_DS3_V2
  max_instances: 5
model:
  name: heart-classifier
  path: model
  type: mlflow_model
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
  max_polls: 200
"#;

    const DESCRIPTOR: &str = r#"
endpoint_name: heart-classifier-batch
name: classifier-xgboost-mlflow
model: azureml:heart-classifier@latest
compute: azureml:batch-cluster
resources:
  instance_count: 2
mini_batch_size: 2
output_file_name: predictions.csv
"#;

    const PREDICTIONS: &[u8] = b"('heart-unlabeled-0.csv', 1)\n('heart-unlabeled-1.csv', 0)\n";

    fn is_creating(v: &serde_json::Value) -> bool {
        v["provisioning_state"] == "creating"
    }

    /// Plays the backend: finishes provisioning and runs jobs a few seconds
    /// at a time. Write races with the client are retried on the next tick.
    async fn executor(plane: Arc<MemoryPlane>, fail_scoring: bool, stop: CancellationToken) {
        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(7)) => {}
            }

            for kind in [ResourceKind::Compute, ResourceKind::Endpoint] {
                for v in plane.list(kind, None).await.unwrap_or_default() {
                    if is_creating(&v) {
                        let name = v["name"].as_str().unwrap_or_default();
                        let _ = plane
                            .set_provisioning_state(kind, None, name, ProvisioningState::Succeeded)
                            .await;
                    }
                }
            }
            for ep in plane.list(ResourceKind::Endpoint, None).await.unwrap_or_default() {
                let ep = ep["name"].as_str().unwrap_or_default().to_string();
                for d in plane
                    .list(ResourceKind::Deployment, Some(ep.as_str()))
                    .await
                    .unwrap_or_default()
                {
                    if is_creating(&d) {
                        let name = d["name"].as_str().unwrap_or_default();
                        let _ = plane
                            .set_provisioning_state(
                                ResourceKind::Deployment,
                                Some(ep.as_str()),
                                name,
                                ProvisioningState::Succeeded,
                            )
                            .await;
                    }
                }
            }

            for job in plane.list_jobs().await.unwrap_or_default() {
                match (job.status, job.parent.is_some()) {
                    (JobStatus::Pending, _) => {
                        let _ = plane.advance_job(&job.name, JobStatus::Running, None).await;
                    }
                    (JobStatus::Running, false) => {
                        let _ = plane
                            .put_output_file(&job.name, "score", "predictions.csv", PREDICTIONS.to_vec())
                            .await;
                        let _ = plane.advance_job(&job.name, JobStatus::Completed, None).await;
                    }
                    (JobStatus::Running, true) if fail_scoring => {
                        let _ = plane
                            .advance_job(&job.name, JobStatus::Failed, Some("2 mini-batches failed".into()))
                            .await;
                    }
                    (JobStatus::Running, true) => {
                        let _ = plane.advance_job(&job.name, JobStatus::Completed, None).await;
                    }
                    _ => {}
                }
            }
        }
    }

    fn write_inputs(dir: &Path) -> Manifest {
        std::fs::write(dir.join("deployment.yml"), DESCRIPTOR).unwrap();
        Manifest::from_yaml(MANIFEST, dir).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_workflow_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_inputs(dir.path());
        let (ws, plane) = memory_workspace();
        let stop = CancellationToken::new();
        tokio::spawn(executor(plane.clone(), false, stop.clone()));

        let report = run_workflow(&ws, &manifest, &CancellationToken::new())
            .await
            .unwrap();
        stop.cancel();

        assert_eq!(report.compute.provisioning_state, ProvisioningState::Succeeded);
        assert_eq!(report.model.version.as_deref(), Some("1"));
        assert!(report.endpoint.name.starts_with("heart-classifier-"));
        assert_eq!(
            report.endpoint.default_deployment.as_deref(),
            Some("classifier-xgboost-mlflow")
        );
        assert_eq!(report.deployment.endpoint_name, report.endpoint.name);
        assert_eq!(report.deployment.model, "azureml:heart-classifier:1");
        assert_eq!(report.job.deployment, "classifier-xgboost-mlflow");
        assert_eq!(report.scoring_job.parent.as_deref(), Some(report.job.name.as_str()));
        assert_eq!(
            report.output_dir,
            dir.path().join("downloads").join("named-outputs").join("score")
        );
        assert_eq!(report.predictions.len(), 2);
        assert_eq!(report.predictions.rows()[1].file, "heart-unlabeled-1.csv");
    }

    #[tokio::test(start_paused = true)]
    async fn test_workflow_surfaces_scoring_failure() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_inputs(dir.path());
        let (ws, plane) = memory_workspace();
        let stop = CancellationToken::new();
        tokio::spawn(executor(plane.clone(), true, stop.clone()));

        let err = run_workflow(&ws, &manifest, &CancellationToken::new())
            .await
            .unwrap_err();
        stop.cancel();

        match err {
            NimbusError::JobFailed { name, message } => {
                assert!(name.ends_with("-scoring"));
                assert_eq!(message, "2 mini-batches failed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_workflow_cancelled_while_provisioning() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_inputs(dir.path());
        let (ws, _) = memory_workspace();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let err = run_workflow(&ws, &manifest, &cancel).await.unwrap_err();
        assert!(matches!(err, NimbusError::Cancelled { .. }));
    }
}
