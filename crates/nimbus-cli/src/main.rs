mod args;
mod client;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use nimbus_client::manifest::ENDPOINT_SUFFIX_LEN;
use nimbus_client::{run_workflow, Manifest, Workspace};
use nimbus_common::telemetry::{init_tracing, TelemetryConfig};
use nimbus_common::{
    ComputeTarget, Dataset, DatasetType, Deployment, DeploymentDescriptor, Endpoint, JobInput,
    JobRequest, Model, ModelType,
};

use crate::args::{
    Args, Command, ComputeCommand, DatasetCommand, DeploymentCommand, EndpointCommand,
    JobCommand, ModelCommand,
};
use crate::client::connect;
use crate::output::{
    print_computes, print_datasets, print_deployment_detail, print_deployments, print_endpoints,
    print_job_detail, print_jobs, print_models, print_predictions, print_workflow_report,
};

fn created_or_existing(created: bool) -> &'static str {
    if created {
        "created"
    } else {
        "already exists"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::new("nimbus-cli");
    telemetry.otlp_endpoint = args.otlp_endpoint.clone();
    telemetry.otlp_token = args.otlp_token.clone();
    let provider = init_tracing(&telemetry);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let ws = connect(&args).await?;
    let result = run(args.command, &ws, &cancel).await;

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }
    result
}

async fn run(command: Command, ws: &Workspace, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Compute { subcommand } => match subcommand {
            ComputeCommand::Ensure {
                name,
                size,
                min_instances,
                max_instances,
                tier,
                wait,
            } => {
                let mut spec = ComputeTarget::new(&name, size).with_instances(min_instances, max_instances);
                spec.tier = tier;
                let out = ws
                    .ensure_compute(&spec)
                    .await
                    .with_context(|| format!("failed to ensure compute '{name}'"))?;
                println!("✓ Compute '{}' {}", name, created_or_existing(out.created));
                if wait {
                    ws.wait_for_compute(&name, cancel).await?;
                    println!("✓ Compute '{}' provisioned", name);
                }
            }
            ComputeCommand::Get { name } => {
                let c: ComputeTarget = ws.get(None, &name).await?;
                print_computes(&[c]);
            }
            ComputeCommand::List => {
                print_computes(&ws.list::<ComputeTarget>(None).await?);
            }
            ComputeCommand::Wait { name } => {
                ws.wait_for_compute(&name, cancel).await?;
                println!("✓ Compute '{}' provisioned", name);
            }
        },
        Command::Model { subcommand } => match subcommand {
            ModelCommand::Register {
                name,
                path,
                asset_type,
                description,
            } => {
                let mut spec = Model::new(&name, path, asset_type.unwrap_or(ModelType::MlflowModel));
                spec.description = description;
                let model = ws
                    .register_model(&spec)
                    .await
                    .with_context(|| format!("failed to register model '{name}'"))?;
                println!(
                    "✓ Model '{}' registered as version {}",
                    name,
                    model.version.as_deref().unwrap_or("?")
                );
            }
            ModelCommand::Get { name, label } => {
                print_models(&[ws.get_model(&name, label.as_deref()).await?]);
            }
            ModelCommand::List => {
                print_models(&ws.list::<Model>(None).await?);
            }
        },
        Command::Dataset { subcommand } => match subcommand {
            DatasetCommand::Register {
                name,
                path,
                asset_type,
                description,
            } => {
                let mut spec = Dataset::new(&name, path, asset_type.unwrap_or(DatasetType::UriFolder));
                spec.description = description;
                let out = ws
                    .ensure_dataset(&spec)
                    .await
                    .with_context(|| format!("failed to register dataset '{name}'"))?;
                println!(
                    "✓ Dataset '{}' {} (version {})",
                    name,
                    created_or_existing(out.created),
                    out.resource.version.as_deref().unwrap_or("?")
                );
            }
            DatasetCommand::Get { name, label } => {
                print_datasets(&[ws.get_dataset(&name, label.as_deref()).await?]);
            }
            DatasetCommand::List => {
                print_datasets(&ws.list::<Dataset>(None).await?);
            }
        },
        Command::Endpoint { subcommand } => match subcommand {
            EndpointCommand::Ensure {
                name,
                prefix,
                auth_mode,
                description,
                wait,
            } => {
                let name = match (name, prefix) {
                    (Some(name), _) => name,
                    (None, Some(prefix)) => nimbus_common::generate_name(&prefix, ENDPOINT_SUFFIX_LEN),
                    (None, None) => anyhow::bail!("either a name or --prefix is required"),
                };
                let mut spec = Endpoint::new(&name);
                spec.auth_mode = auth_mode;
                spec.description = description;
                let out = ws
                    .ensure_endpoint(&spec)
                    .await
                    .with_context(|| format!("failed to ensure endpoint '{name}'"))?;
                println!("✓ Endpoint '{}' {}", name, created_or_existing(out.created));
                if wait {
                    ws.wait_for_endpoint(&name, cancel).await?;
                    println!("✓ Endpoint '{}' provisioned", name);
                }
            }
            EndpointCommand::Get { name } => {
                let e: Endpoint = ws.get(None, &name).await?;
                print_endpoints(&[e]);
            }
            EndpointCommand::List => {
                print_endpoints(&ws.list::<Endpoint>(None).await?);
            }
            EndpointCommand::Wait { name } => {
                ws.wait_for_endpoint(&name, cancel).await?;
                println!("✓ Endpoint '{}' provisioned", name);
            }
            EndpointCommand::SetDefault {
                endpoint,
                deployment,
            } => {
                ws.set_default_deployment(&endpoint, &deployment)
                    .await
                    .with_context(|| format!("failed to set default deployment of '{endpoint}'"))?;
                println!("✓ Endpoint '{}' now defaults to '{}'", endpoint, deployment);
            }
        },
        Command::Deployment { subcommand } => match subcommand {
            DeploymentCommand::Apply {
                descriptor,
                wait,
                make_default,
            } => {
                let parsed = DeploymentDescriptor::load(&descriptor)
                    .with_context(|| format!("invalid descriptor {}", descriptor.display()))?;
                let out = ws.apply_descriptor(parsed).await?;
                let d = out.resource;
                println!(
                    "✓ Deployment '{}/{}' {} (model {})",
                    d.endpoint_name,
                    d.name,
                    created_or_existing(out.created),
                    d.model
                );
                if wait {
                    ws.wait_for_deployment(&d.endpoint_name, &d.name, cancel)
                        .await?;
                    println!("✓ Deployment '{}' provisioned", d.name);
                }
                if make_default {
                    ws.set_default_deployment(&d.endpoint_name, &d.name).await?;
                    println!("✓ Endpoint '{}' now defaults to '{}'", d.endpoint_name, d.name);
                }
            }
            DeploymentCommand::Get { endpoint, name } => {
                let d: Deployment = ws.get(Some(endpoint.as_str()), &name).await?;
                print_deployment_detail(&d);
            }
            DeploymentCommand::List { endpoint } => {
                let deployments = ws.list::<Deployment>(Some(endpoint.as_str())).await?;
                print_deployments(&endpoint, &deployments);
            }
            DeploymentCommand::Wait { endpoint, name } => {
                ws.wait_for_deployment(&endpoint, &name, cancel).await?;
                println!("✓ Deployment '{}' provisioned", name);
            }
        },
        Command::Job { subcommand } => match subcommand {
            JobCommand::Invoke {
                endpoint,
                deployment,
                dataset,
                label,
                uri,
                outputs,
                wait,
            } => {
                let input = match (dataset, uri) {
                    (Some(name), _) => JobInput::Dataset { name, label },
                    (None, Some(uri)) => JobInput::Uri { uri },
                    (None, None) => anyhow::bail!("either --dataset or --uri is required"),
                };
                let req = JobRequest {
                    endpoint: endpoint.clone(),
                    deployment,
                    input,
                    outputs,
                };
                let job = ws
                    .submit(&req)
                    .await
                    .with_context(|| format!("failed to invoke endpoint '{endpoint}'"))?;
                println!("✓ Job '{}' submitted (deployment {})", job.name, job.deployment);
                if wait {
                    let job = ws.wait_for_job(&job.name, cancel).await?;
                    print_job_detail(&job);
                }
            }
            JobCommand::Status { name } => {
                print_job_detail(&ws.get_job(&name).await?);
            }
            JobCommand::Wait { name } => {
                let job = ws.wait_for_job(&name, cancel).await?;
                println!("✓ Job '{}' completed", job.name);
            }
            JobCommand::Children { name } => {
                println!("\n=== Child jobs of '{}' ===\n", name);
                print_jobs(&ws.list_child_jobs(&name).await?);
                println!();
            }
            JobCommand::Logs { name } => {
                print!("{}", ws.job_logs(&name).await?);
            }
            JobCommand::Download { name, output, dest } => {
                let dir = ws
                    .download_output(&name, &output, &dest)
                    .await
                    .with_context(|| format!("failed to download output '{output}' of '{name}'"))?;
                println!("✓ Output '{}' downloaded to {}", output, dir.display());
            }
            JobCommand::Results {
                name,
                output,
                file,
                dest,
                csv,
            } => {
                let table = ws
                    .fetch_predictions(&name, &output, &file, &dest)
                    .await
                    .with_context(|| format!("failed to read results of '{name}'"))?;
                if csv {
                    print!("{}", table.to_csv());
                } else {
                    print_predictions(&table);
                }
            }
        },
        Command::Run { manifest } => {
            let parsed = Manifest::load(&manifest)
                .with_context(|| format!("invalid manifest {}", manifest.display()))?;
            let report = run_workflow(ws, &parsed, cancel)
                .await
                .context("workflow failed")?;
            print_workflow_report(&report);
        }
    }

    Ok(())
}
