use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use nimbus_client::{ControlPlane, HttpControlPlane, PollPolicy, StoreControlPlane, Workspace};
use nimbus_meta::EtcdMetaStore;

use crate::args::Args;

/// Poll policy from the global flags.
pub fn poll_policy(args: &Args) -> PollPolicy {
    let timeout = (args.wait_timeout_secs > 0).then(|| Duration::from_secs(args.wait_timeout_secs));
    let mut policy =
        PollPolicy::every(Duration::from_secs(args.poll_interval_secs.max(1))).with_timeout(timeout);
    if let Some(max) = args.max_polls {
        policy = policy.with_max_polls(max);
    }
    policy
}

/// Build the workspace: etcd-backed when an etcd endpoint is given, HTTP otherwise.
pub async fn connect(args: &Args) -> Result<Workspace> {
    let control_plane: Arc<dyn ControlPlane> = match &args.etcd_endpoint {
        Some(endpoint) => {
            let store = EtcdMetaStore::connect(&[endpoint.clone()])
                .await
                .with_context(|| format!("failed to connect to etcd at {endpoint}"))?
                .with_root(args.etcd_root.as_str());
            tracing::info!(%endpoint, root = %args.etcd_root, "using etcd control plane");
            Arc::new(StoreControlPlane::new(Arc::new(store)))
        }
        None => {
            tracing::debug!(url = %args.control_plane_url, "using HTTP control plane");
            Arc::new(HttpControlPlane::new(
                args.control_plane_url.clone(),
                args.token.clone(),
            ))
        }
    };
    Ok(Workspace::new(control_plane).with_poll_policy(poll_policy(args)))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_poll_policy_from_flags() {
        let args = Args::parse_from([
            "nimbus",
            "--poll-interval-secs",
            "5",
            "--max-polls",
            "3",
            "--wait-timeout-secs",
            "0",
            "job",
            "status",
            "j",
        ]);
        let policy = poll_policy(&args);
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_polls, Some(3));
        assert_eq!(policy.timeout, None);
    }
}
