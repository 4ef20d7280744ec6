use tokio_util::sync::CancellationToken;

use nimbus_common::{Job, JobInput, JobRequest, JobStatus, NimbusError, Result};

use crate::waiter::{wait_until_terminal, PollPolicy};
use crate::workspace::Workspace;

impl Workspace {
    /// Submit a batch job against `endpoint`.
    ///
    /// Without `deployment` the backend routes to the endpoint's default.
    pub async fn submit_job(
        &self,
        endpoint: &str,
        deployment: Option<&str>,
        input: JobInput,
    ) -> Result<Job> {
        let mut req = JobRequest::new(endpoint, input);
        if let Some(d) = deployment {
            req = req.with_deployment(d);
        }
        self.submit(&req).await
    }

    pub async fn submit(&self, req: &JobRequest) -> Result<Job> {
        let job = self.control_plane().submit_job(req).await?;
        tracing::info!(
            job = %job.name,
            endpoint = %job.endpoint,
            deployment = %job.deployment,
            input = %job.input,
            "job submitted"
        );
        Ok(job)
    }

    pub async fn get_job(&self, name: &str) -> Result<Job> {
        self.control_plane().get_job(name).await
    }

    pub async fn job_status(&self, name: &str) -> Result<JobStatus> {
        Ok(self.get_job(name).await?.status)
    }

    /// Block until the job completes, with the workspace poll policy.
    pub async fn wait_for_job(&self, name: &str, cancel: &CancellationToken) -> Result<Job> {
        self.wait_for_job_with(name, self.poll_policy(), cancel)
            .await
    }

    /// Block until the job completes. A failed job yields `JobFailed`.
    pub async fn wait_for_job_with(
        &self,
        name: &str,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<Job> {
        let what = format!("job '{name}'");
        let job = wait_until_terminal(
            &what,
            policy,
            cancel,
            || self.get_job(name),
            |j: &Job| j.status.is_terminal(),
        )
        .await?;

        if job.status == JobStatus::Failed {
            return Err(NimbusError::JobFailed {
                name: job.name,
                message: job.message.unwrap_or_else(|| "no reason reported".to_string()),
            });
        }
        Ok(job)
    }

    pub async fn list_child_jobs(&self, parent: &str) -> Result<Vec<Job>> {
        self.control_plane().list_child_jobs(parent).await
    }

    /// The first sub-job of `parent`; for batch jobs this is the scoring run.
    pub async fn first_child_job(&self, parent: &str) -> Result<Job> {
        self.list_child_jobs(parent)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NimbusError::not_found("child job", format!("{parent}/*")))
    }

    pub async fn job_logs(&self, name: &str) -> Result<String> {
        self.control_plane().job_logs(name).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use nimbus_common::{Dataset, DatasetType, Endpoint};

    use super::*;
    use crate::testing::{deployment, memory_workspace, seed_routable_endpoint};

    fn heart_input() -> JobInput {
        JobInput::Dataset {
            name: "heart-dataset-unlabeled".into(),
            label: None,
        }
    }

    async fn seed_dataset(ws: &Workspace) {
        ws.ensure_dataset(&Dataset::new(
            "heart-dataset-unlabeled",
            "data",
            DatasetType::UriFolder,
        ))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_submit_routes_to_default_deployment() {
        let (ws, _) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;
        seed_dataset(&ws).await;

        let job = ws.submit_job("ep", None, heart_input()).await.unwrap();
        assert_eq!(job.deployment, "d1");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.name.starts_with("batchjob-"));
    }

    #[tokio::test]
    async fn test_explicit_deployment_overrides_default() {
        let (ws, _) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;
        ws.ensure_deployment(&deployment("ep", "d2")).await.unwrap();
        seed_dataset(&ws).await;

        let job = ws.submit_job("ep", Some("d2"), heart_input()).await.unwrap();
        assert_eq!(job.deployment, "d2");
        assert_eq!(ws.get_job(&job.name).await.unwrap().deployment, "d2");
    }

    #[tokio::test]
    async fn test_submit_without_default_is_rejected() {
        let (ws, _) = memory_workspace();
        ws.ensure_endpoint(&Endpoint::new("ep")).await.unwrap();
        seed_dataset(&ws).await;

        let err = ws.submit_job("ep", None, heart_input()).await.unwrap_err();
        assert!(matches!(err, NimbusError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_submit_unknown_deployment_or_dataset() {
        let (ws, _) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;

        let err = ws.submit_job("ep", None, heart_input()).await.unwrap_err();
        assert!(err.is_not_found());

        seed_dataset(&ws).await;
        let err = ws
            .submit_job("ep", Some("ghost"), heart_input())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let pinned = JobInput::Dataset {
            name: "heart-dataset-unlabeled".into(),
            label: Some("7".into()),
        };
        let err = ws.submit_job("ep", None, pinned).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_children_and_status_monotonic() {
        let (ws, store) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;
        let job = ws
            .submit_job("ep", None, JobInput::Uri { uri: "https://data/heart".into() })
            .await
            .unwrap();

        let child = ws.first_child_job(&job.name).await.unwrap();
        assert_eq!(child.parent.as_deref(), Some(job.name.as_str()));
        assert_eq!(ws.list_child_jobs(&job.name).await.unwrap().len(), 1);

        store.advance_job(&job.name, JobStatus::Running, None).await.unwrap();
        let err = store
            .advance_job(&job.name, JobStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::InvalidTransition { .. }));

        store.advance_job(&job.name, JobStatus::Completed, None).await.unwrap();
        let err = store
            .advance_job(&job.name, JobStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::InvalidTransition { .. }));
        assert_eq!(ws.job_status(&job.name).await.unwrap(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_first_child_of_childless_job() {
        let (ws, _) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;
        let job = ws
            .submit_job("ep", None, JobInput::Uri { uri: "file.csv".into() })
            .await
            .unwrap();
        let child = ws.first_child_job(&job.name).await.unwrap();

        let err = ws.first_child_job(&child.name).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_job_reports_failure_message() {
        let (ws, store) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;
        let job = ws
            .submit_job("ep", None, JobInput::Uri { uri: "file.csv".into() })
            .await
            .unwrap();

        let executor = store.clone();
        let name = job.name.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            executor.advance_job(&name, JobStatus::Running, None).await.unwrap();
            tokio::time::sleep(Duration::from_secs(20)).await;
            executor
                .advance_job(&name, JobStatus::Failed, Some("error threshold exceeded".into()))
                .await
                .unwrap();
        });

        let err = ws
            .wait_for_job(&job.name, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            NimbusError::JobFailed { name, message } => {
                assert_eq!(name, job.name);
                assert_eq!(message, "error threshold exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_logs_accumulate() {
        let (ws, store) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;
        let job = ws
            .submit_job("ep", None, JobInput::Uri { uri: "file.csv".into() })
            .await
            .unwrap();

        assert_eq!(ws.job_logs(&job.name).await.unwrap(), "");
        store.append_job_log(&job.name, "mini-batch 1 done").await.unwrap();
        store.append_job_log(&job.name, "mini-batch 2 done").await.unwrap();
        assert_eq!(
            ws.job_logs(&job.name).await.unwrap(),
            "mini-batch 1 done\nmini-batch 2 done\n"
        );
    }
}
