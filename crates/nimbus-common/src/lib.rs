pub mod asset;
pub mod compute;
pub mod deployment;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod ident;
pub mod job;
pub mod reference;
pub mod resource;
pub mod util;

pub use asset::{Dataset, DatasetType, Model, ModelType};
pub use compute::{ComputeTarget, ComputeTier, ProvisioningState};
pub use deployment::{
    CodeConfiguration, Deployment, DeploymentResources, Environment, LoggingLevel, OutputAction,
    RetrySettings,
};
pub use descriptor::DeploymentDescriptor;
pub use endpoint::{AuthMode, Endpoint};
pub use error::{NimbusError, ParseError, Result};
pub use ident::{generate_name, generate_name_with_rng};
pub use job::{Job, JobInput, JobRequest, JobStatus, DEFAULT_OUTPUT_NAME};
pub use reference::{Label, ResourceRef};
pub use resource::{check_name, compare_versions, Provisioned, Resource, ResourceKind};

pub mod telemetry;
