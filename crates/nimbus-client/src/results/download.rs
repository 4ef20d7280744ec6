use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use nimbus_common::{NimbusError, Result};

use super::parse::{parse_predictions, PredictionTable};
use crate::workspace::Workspace;

/// Directory under the download destination that holds named outputs.
pub const NAMED_OUTPUTS_DIR: &str = "named-outputs";

/// Accepts only plain relative paths: no root, no prefix, no `..`.
fn safe_relative(raw: &str) -> Result<PathBuf> {
    let path = Path::new(raw);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(NimbusError::InvalidReference(format!(
                    "artifact path '{raw}' escapes the output directory"
                )))
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(NimbusError::InvalidReference(format!(
            "empty artifact path '{raw}'"
        )));
    }
    Ok(out)
}

async fn write_file(target: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(target).await?;
    file.write_all(content).await?;
    file.flush().await?;
    Ok(())
}

/// Read and parse a downloaded predictions file.
pub async fn read_predictions(path: &Path) -> Result<PredictionTable> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut text = String::new();
    file.read_to_string(&mut text).await?;
    Ok(parse_predictions(&text)?)
}

impl Workspace {
    /// Fetch every file of a job output into
    /// `destination/named-outputs/<output>/`, returning that directory.
    pub async fn download_output(
        &self,
        job: &str,
        output: &str,
        destination: &Path,
    ) -> Result<PathBuf> {
        let root = destination
            .join(NAMED_OUTPUTS_DIR)
            .join(safe_relative(output)?);
        let files = self.control_plane().list_output_files(job, output).await?;

        tokio::fs::create_dir_all(&root).await?;
        for rel in &files {
            let target = root.join(safe_relative(rel)?);
            let content = self
                .control_plane()
                .read_output_file(job, output, rel)
                .await?;
            write_file(&target, &content).await?;
            tracing::debug!(job, output, file = %rel, bytes = content.len(), "downloaded");
        }

        tracing::info!(job, output, files = files.len(), dir = %root.display(), "output downloaded");
        Ok(root)
    }

    /// Download `output` and parse `file_name` from it.
    pub async fn fetch_predictions(
        &self,
        job: &str,
        output: &str,
        file_name: &str,
        destination: &Path,
    ) -> Result<PredictionTable> {
        let root = self.download_output(job, output, destination).await?;
        read_predictions(&root.join(safe_relative(file_name)?)).await
    }
}

#[cfg(test)]
mod tests {
    use nimbus_common::{JobInput, DEFAULT_OUTPUT_NAME};

    use super::*;
    use crate::testing::{memory_workspace, seed_routable_endpoint};

    #[test]
    fn test_safe_relative_rejects_escapes() {
        assert_eq!(
            safe_relative("a/./b.csv").unwrap(),
            PathBuf::from("a").join("b.csv")
        );
        for raw in ["../x", "a/../../x", "/etc/passwd", "", "."] {
            assert!(safe_relative(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[tokio::test]
    async fn test_download_and_parse_predictions() {
        let (ws, store) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;
        let job = ws
            .submit_job("ep", None, JobInput::Uri { uri: "data/".into() })
            .await
            .unwrap();
        store
            .put_output_file(
                &job.name,
                DEFAULT_OUTPUT_NAME,
                "predictions.csv",
                b"('heart-0.csv', 1)\n('heart-1.csv', 0)\n".to_vec(),
            )
            .await
            .unwrap();
        store
            .put_output_file(&job.name, DEFAULT_OUTPUT_NAME, "logs/summary.txt", b"ok".to_vec())
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = ws
            .download_output(&job.name, DEFAULT_OUTPUT_NAME, dir.path())
            .await
            .unwrap();
        assert_eq!(root, dir.path().join("named-outputs").join("score"));
        assert_eq!(
            std::fs::read_to_string(root.join("logs").join("summary.txt")).unwrap(),
            "ok"
        );

        let table = ws
            .fetch_predictions(&job.name, DEFAULT_OUTPUT_NAME, "predictions.csv", dir.path())
            .await
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].file, "heart-0.csv");
    }

    #[tokio::test]
    async fn test_unknown_output_is_not_found() {
        let (ws, _) = memory_workspace();
        seed_routable_endpoint(&ws, "ep", "d1").await;
        let job = ws
            .submit_job("ep", None, JobInput::Uri { uri: "data/".into() })
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = ws
            .download_output(&job.name, "metrics", dir.path())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_predictions_surfaces_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        std::fs::write(&path, "(a,1)(b,0)").unwrap();
        let err = read_predictions(&path).await.unwrap_err();
        assert!(matches!(err, NimbusError::Parse(_)));
    }
}
