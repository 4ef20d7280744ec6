use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use nimbus_common::{AuthMode, ComputeTier, DatasetType, ModelType};

/// Parse a snake_case enum value the same way the YAML files spell it.
fn snake<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown value '{raw}'"))
}

#[derive(Debug, Parser)]
#[command(name = "nimbus")]
#[command(about = "Nimbus CLI for batch scoring orchestration", long_about = None)]
pub struct Args {
    /// Control plane URL
    #[arg(
        long,
        env = "NIMBUS_CONTROL_PLANE_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub control_plane_url: String,

    /// Control plane API token (Authorization: Bearer)
    #[arg(long, env = "NIMBUS_TOKEN")]
    pub token: Option<String>,

    /// Talk to an etcd-backed control plane instead of the HTTP one
    #[arg(long, env = "NIMBUS_ETCD_ENDPOINT")]
    pub etcd_endpoint: Option<String>,

    /// Key namespace inside etcd
    #[arg(long, env = "NIMBUS_ETCD_ROOT", default_value = nimbus_meta::etcd::DEFAULT_ROOT)]
    pub etcd_root: String,

    /// OTLP/HTTP collector for traces
    #[arg(long, env = "NIMBUS_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "NIMBUS_OTLP_TOKEN")]
    pub otlp_token: Option<String>,

    /// Seconds between status polls while waiting
    #[arg(long, env = "NIMBUS_POLL_INTERVAL_SECS", default_value_t = 10)]
    pub poll_interval_secs: u64,

    /// Give up after this many polls
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Give up after this many seconds per wait (0 = no deadline)
    #[arg(long, default_value_t = 6 * 3600)]
    pub wait_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compute clusters
    Compute {
        #[command(subcommand)]
        subcommand: ComputeCommand,
    },
    /// Registered models
    Model {
        #[command(subcommand)]
        subcommand: ModelCommand,
    },
    /// Registered datasets
    Dataset {
        #[command(subcommand)]
        subcommand: DatasetCommand,
    },
    /// Batch endpoints
    Endpoint {
        #[command(subcommand)]
        subcommand: EndpointCommand,
    },
    /// Deployments behind an endpoint
    Deployment {
        #[command(subcommand)]
        subcommand: DeploymentCommand,
    },
    /// Batch jobs
    Job {
        #[command(subcommand)]
        subcommand: JobCommand,
    },
    /// Run a complete workflow manifest
    Run {
        /// Path to the workflow manifest (YAML)
        manifest: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum ComputeCommand {
    /// Create the cluster unless it already exists
    Ensure {
        name: String,
        /// VM size, e.g. STANDARD_DS3_V2
        #[arg(long)]
        size: String,
        #[arg(long, default_value_t = 0)]
        min_instances: u32,
        #[arg(long, default_value_t = 1)]
        max_instances: u32,
        #[arg(long, value_parser = snake::<ComputeTier>, default_value = "dedicated")]
        tier: ComputeTier,
        /// Block until provisioning finishes
        #[arg(long)]
        wait: bool,
    },
    Get {
        name: String,
    },
    List,
    /// Wait until provisioning finishes
    Wait {
        name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ModelCommand {
    /// Register a new model version
    Register {
        name: String,
        /// Local or remote path of the files
        #[arg(long)]
        path: String,
        #[arg(long = "type", value_parser = snake::<ModelType>)]
        asset_type: Option<ModelType>,
        #[arg(long)]
        description: Option<String>,
    },
    Get {
        name: String,
        /// Version or "latest"
        #[arg(long)]
        label: Option<String>,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum DatasetCommand {
    /// Register the dataset unless it already exists
    Register {
        name: String,
        /// Local or remote path of the files
        #[arg(long)]
        path: String,
        #[arg(long = "type", value_parser = snake::<DatasetType>)]
        asset_type: Option<DatasetType>,
        #[arg(long)]
        description: Option<String>,
    },
    Get {
        name: String,
        /// Version or "latest"
        #[arg(long)]
        label: Option<String>,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum EndpointCommand {
    /// Create the endpoint unless it already exists
    Ensure {
        /// Endpoint name; omit to generate one from --prefix
        #[arg(required_unless_present = "prefix")]
        name: Option<String>,
        /// Prefix for a generated name (5-character random suffix)
        #[arg(long, conflicts_with = "name")]
        prefix: Option<String>,
        #[arg(long, value_parser = snake::<AuthMode>, default_value = "aad_token")]
        auth_mode: AuthMode,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        wait: bool,
    },
    Get {
        name: String,
    },
    List,
    Wait {
        name: String,
    },
    /// Route invocations without an explicit deployment to DEPLOYMENT
    SetDefault {
        endpoint: String,
        deployment: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum DeploymentCommand {
    /// Validate a descriptor, pin its model version and ensure the deployment
    Apply {
        descriptor: PathBuf,
        #[arg(long)]
        wait: bool,
        /// Make it the endpoint default afterwards
        #[arg(long)]
        make_default: bool,
    },
    Get {
        endpoint: String,
        name: String,
    },
    List {
        endpoint: String,
    },
    Wait {
        endpoint: String,
        name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// Submit a batch job
    Invoke {
        endpoint: String,
        /// Target deployment; omitted means the endpoint default
        #[arg(long)]
        deployment: Option<String>,
        /// Registered dataset to score
        #[arg(long, conflicts_with = "uri", required_unless_present = "uri")]
        dataset: Option<String>,
        /// Dataset version or "latest"
        #[arg(long, requires = "dataset")]
        label: Option<String>,
        /// Raw storage URI to score
        #[arg(long)]
        uri: Option<String>,
        /// Named output(s) to produce
        #[arg(long = "output", default_value = "score")]
        outputs: Vec<String>,
        #[arg(long)]
        wait: bool,
    },
    Status {
        name: String,
    },
    Wait {
        name: String,
    },
    /// List sub-jobs (the first one is the scoring run)
    Children {
        name: String,
    },
    Logs {
        name: String,
    },
    /// Download a named output
    Download {
        name: String,
        #[arg(long, default_value = "score")]
        output: String,
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
    /// Download and parse the predictions file
    Results {
        name: String,
        #[arg(long, default_value = "score")]
        output: String,
        #[arg(long, default_value = "predictions.csv")]
        file: String,
        #[arg(long, default_value = ".")]
        dest: PathBuf,
        /// Print CSV instead of a table
        #[arg(long)]
        csv: bool,
    },
}
