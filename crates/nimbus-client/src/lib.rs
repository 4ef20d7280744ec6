//! Client for batch-scoring orchestration: resource lifecycle, provisioning
//! waits, job submission and tracking, and result retrieval.
//!
//! Every operation goes through a [`Workspace`], which wraps one
//! [`ControlPlane`] implementation ([`HttpControlPlane`] for a remote REST
//! control plane, [`StoreControlPlane`] for a metadata-store backed one).

pub mod control_plane;
pub mod http;
pub mod jobs;
pub mod lifecycle;
pub mod manifest;
pub mod results;
pub mod store;
pub mod waiter;
pub mod workflow;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use control_plane::ControlPlane;
pub use http::HttpControlPlane;
pub use lifecycle::Ensured;
pub use manifest::Manifest;
pub use results::{parse_predictions, read_predictions, PredictionRow, PredictionTable, Scalar};
pub use store::StoreControlPlane;
pub use waiter::{wait_until_terminal, PollPolicy, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};
pub use workflow::{run_workflow, WorkflowReport};
pub use workspace::Workspace;
