use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use nimbus_common::{compare_versions, Job, JobRequest, NimbusError, ResourceKind, Result};

use crate::control_plane::ControlPlane;

/// Job submission body; the endpoint travels in the path.
#[derive(Serialize)]
struct SubmitBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment: Option<&'a str>,
    input: &'a nimbus_common::JobInput,
    outputs: &'a [String],
}

/// REST binding to a remote control plane.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
    token: Option<String>,
}

fn seg(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

fn transport(e: reqwest::Error) -> NimbusError {
    NimbusError::Transport(e.to_string())
}

impl HttpControlPlane {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    fn auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    fn collection_path(kind: ResourceKind, scope: Option<&str>) -> Result<String> {
        match (kind, scope) {
            (ResourceKind::Deployment, Some(endpoint)) => {
                Ok(format!("/endpoints/{}/deployments", seg(endpoint)))
            }
            (ResourceKind::Deployment, None) => Err(NimbusError::InvalidReference(
                "deployment requires an owning endpoint".into(),
            )),
            (kind, _) => Ok(format!("/{}", kind.collection())),
        }
    }

    /// Map non-2xx responses onto the error taxonomy.
    async fn check(resp: Response, kind: &'static str, name: &str) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(%status, kind, name, body = %body, "control plane rejected request");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                NimbusError::Authentication(format!("{status}: {body}"))
            }
            StatusCode::NOT_FOUND => NimbusError::not_found(kind, name),
            StatusCode::CONFLICT => NimbusError::CreationConflict {
                kind,
                name: name.to_string(),
            },
            _ => NimbusError::Transport(format!("{status}: {body}")),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        kind: &'static str,
        name: &str,
    ) -> Result<T> {
        let resp = self.auth(builder).send().await.map_err(transport)?;
        let resp = Self::check(resp, kind, name).await?;
        resp.json().await.map_err(transport)
    }
}

fn body_name(body: &Value) -> String {
    body.get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn list(&self, kind: ResourceKind, scope: Option<&str>) -> Result<Vec<Value>> {
        let url = self.url(&Self::collection_path(kind, scope)?);
        self.send_json(self.client.get(&url), kind.as_str(), "*")
            .await
    }

    async fn get(&self, kind: ResourceKind, scope: Option<&str>, name: &str) -> Result<Value> {
        if kind.is_versioned() {
            // The REST surface only lists versions; pick the highest here.
            return self
                .list(kind, scope)
                .await?
                .into_iter()
                .filter(|v| v.get("name").and_then(|n| n.as_str()) == Some(name))
                .max_by(|a, b| {
                    compare_versions(
                        a.get("version").and_then(|v| v.as_str()).unwrap_or(""),
                        b.get("version").and_then(|v| v.as_str()).unwrap_or(""),
                    )
                })
                .ok_or_else(|| NimbusError::not_found(kind.as_str(), name));
        }
        let url = self.url(&format!("{}/{}", Self::collection_path(kind, scope)?, seg(name)));
        self.send_json(self.client.get(&url), kind.as_str(), name)
            .await
    }

    async fn create(&self, kind: ResourceKind, scope: Option<&str>, body: Value) -> Result<Value> {
        let name = body_name(&body);
        let url = self.url(&Self::collection_path(kind, scope)?);
        self.send_json(self.client.post(&url).json(&body), kind.as_str(), &name)
            .await
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
        let url = self.url(&format!("{}/{}", Self::collection_path(kind, scope)?, seg(name)));
        self.send_json(self.client.put(&url).json(&body), kind.as_str(), name)
            .await
    }

    async fn submit_job(&self, req: &JobRequest) -> Result<Job> {
        let url = self.url(&format!("/endpoints/{}/jobs", seg(&req.endpoint)));
        let body = SubmitBody {
            deployment: req.deployment.as_deref(),
            input: &req.input,
            outputs: &req.outputs,
        };
        self.send_json(self.client.post(&url).json(&body), "endpoint", &req.endpoint)
            .await
    }

    async fn get_job(&self, name: &str) -> Result<Job> {
        let url = self.url(&format!("/jobs/{}", seg(name)));
        self.send_json(self.client.get(&url), "job", name).await
    }

    async fn list_child_jobs(&self, parent: &str) -> Result<Vec<Job>> {
        let url = self.url("/jobs");
        self.send_json(
            self.client.get(&url).query(&[("parent", parent)]),
            "job",
            parent,
        )
        .await
    }

    async fn job_logs(&self, name: &str) -> Result<String> {
        let url = self.url(&format!("/jobs/{}/logs", seg(name)));
        let resp = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(transport)?;
        Self::check(resp, "job", name)
            .await?
            .text()
            .await
            .map_err(transport)
    }

    async fn list_output_files(&self, job: &str, output: &str) -> Result<Vec<String>> {
        let url = self.url(&format!("/jobs/{}/outputs/{}", seg(job), seg(output)));
        self.send_json(self.client.get(&url), "output", &format!("{job}/{output}"))
            .await
    }

    async fn read_output_file(&self, job: &str, output: &str, path: &str) -> Result<Vec<u8>> {
        // Keep `/` in nested paths, encode each segment.
        let encoded: Vec<String> = path.split('/').map(seg).collect();
        let url = self.url(&format!(
            "/jobs/{}/outputs/{}/files/{}",
            seg(job),
            seg(output),
            encoded.join("/")
        ));
        let resp = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(transport)?;
        let bytes = Self::check(resp, "output file", path)
            .await?
            .bytes()
            .await
            .map_err(transport)?;
        Ok(bytes.to_vec())
    }
}
