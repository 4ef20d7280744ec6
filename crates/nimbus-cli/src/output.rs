use chrono::{TimeZone, Utc};

use nimbus_client::{PredictionTable, WorkflowReport};
use nimbus_common::{
    ComputeTarget, Dataset, Deployment, Endpoint, Job, JobStatus, Model, ProvisioningState,
};

fn timestamp(ms: u64) -> String {
    if ms == 0 {
        return "-".to_string();
    }
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn state_str(state: ProvisioningState) -> &'static str {
    match state {
        ProvisioningState::Creating => "CREATING",
        ProvisioningState::Succeeded => "SUCCEEDED",
        ProvisioningState::Failed => "FAILED",
    }
}

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "PENDING",
        JobStatus::Running => "RUNNING",
        JobStatus::Completed => "COMPLETED",
        JobStatus::Failed => "FAILED",
    }
}

pub fn print_computes(computes: &[ComputeTarget]) {
    println!("\n=== Compute Clusters ===\n");
    if computes.is_empty() {
        println!("No compute clusters found.");
        return;
    }
    println!(
        "{:<25} {:<20} {:<12} {:<10} {:<20}",
        "Name", "Size", "State", "Instances", "Created"
    );
    println!("{:-<90}", "");
    for c in computes {
        println!(
            "{:<25} {:<20} {:<12} {:<10} {:<20}",
            c.name,
            c.size,
            state_str(c.provisioning_state),
            format!("{}-{}", c.min_instances, c.max_instances),
            timestamp(c.created_at_ms)
        );
    }
    println!();
}

pub fn print_models(models: &[Model]) {
    println!("\n=== Models ===\n");
    if models.is_empty() {
        println!("No models found.");
        return;
    }
    println!("{:<30} {:<10} {:<15} {:<30}", "Name", "Version", "Type", "Path");
    println!("{:-<90}", "");
    for m in models {
        println!(
            "{:<30} {:<10} {:<15} {:<30}",
            m.name,
            m.version.as_deref().unwrap_or("-"),
            format!("{:?}", m.model_type),
            m.path
        );
    }
    println!();
}

pub fn print_datasets(datasets: &[Dataset]) {
    println!("\n=== Datasets ===\n");
    if datasets.is_empty() {
        println!("No datasets found.");
        return;
    }
    println!("{:<30} {:<10} {:<12} {:<30}", "Name", "Version", "Type", "Path");
    println!("{:-<85}", "");
    for d in datasets {
        println!(
            "{:<30} {:<10} {:<12} {:<30}",
            d.name,
            d.version.as_deref().unwrap_or("-"),
            format!("{:?}", d.data_type),
            d.path
        );
    }
    println!();
}

pub fn print_endpoints(endpoints: &[Endpoint]) {
    println!("\n=== Batch Endpoints ===\n");
    if endpoints.is_empty() {
        println!("No endpoints found.");
        return;
    }
    println!(
        "{:<35} {:<12} {:<30} {:<20}",
        "Name", "State", "Default Deployment", "Created"
    );
    println!("{:-<100}", "");
    for e in endpoints {
        println!(
            "{:<35} {:<12} {:<30} {:<20}",
            e.name,
            state_str(e.provisioning_state),
            e.default_deployment.as_deref().unwrap_or("(none)"),
            timestamp(e.created_at_ms)
        );
    }
    println!();
}

pub fn print_deployments(endpoint: &str, deployments: &[Deployment]) {
    println!("\n=== Deployments of '{}' ===\n", endpoint);
    if deployments.is_empty() {
        println!("No deployments found.");
        return;
    }
    println!(
        "{:<30} {:<12} {:<35} {:<25}",
        "Name", "State", "Model", "Compute"
    );
    println!("{:-<105}", "");
    for d in deployments {
        println!(
            "{:<30} {:<12} {:<35} {:<25}",
            d.name,
            state_str(d.provisioning_state),
            d.model,
            d.compute
        );
    }
    println!();
}

pub fn print_deployment_detail(d: &Deployment) {
    println!("\n=== Deployment Detail ===\n");
    println!("  Name:        {}", d.name);
    println!("  Endpoint:    {}", d.endpoint_name);
    println!("  State:       {}", state_str(d.provisioning_state));
    println!("  Model:       {}", d.model);
    println!("  Compute:     {}", d.compute);
    println!("  Instances:   {}", d.resources.instance_count);
    println!("  Concurrency: {}", d.max_concurrency_per_instance);
    println!("  Mini-batch:  {}", d.mini_batch_size);
    println!("  Output file: {}", d.output_file_name);
    println!(
        "  Retries:     {} (timeout {}s)",
        d.retry_settings.max_retries, d.retry_settings.timeout
    );
    match d.error_threshold {
        -1 => println!("  Errors:      unlimited"),
        n => println!("  Errors:      {}", n),
    }
    if let Some(code) = &d.code_configuration {
        println!("  Script:      {}/{}", code.code, code.scoring_script);
    }
    println!();
}

pub fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs found.");
        return;
    }
    println!(
        "{:<55} {:<11} {:<30} {:<20}",
        "Name", "Status", "Deployment", "Updated"
    );
    println!("{:-<120}", "");
    for j in jobs {
        println!(
            "{:<55} {:<11} {:<30} {:<20}",
            j.name,
            status_str(j.status),
            j.deployment,
            timestamp(j.updated_at_ms)
        );
    }
}

pub fn print_job_detail(job: &Job) {
    println!("\n=== Job Detail ===\n");
    println!("  Name:       {}", job.name);
    println!("  Status:     {}", status_str(job.status));
    println!("  Endpoint:   {}", job.endpoint);
    println!("  Deployment: {}", job.deployment);
    println!("  Input:      {}", job.input);
    if let Some(parent) = &job.parent {
        println!("  Parent:     {}", parent);
    }
    if !job.outputs.is_empty() {
        println!("  Outputs:    {}", job.outputs.join(", "));
    }
    if let Some(msg) = &job.message {
        println!("  Message:    {}", msg);
    }
    println!("  Created:    {}", timestamp(job.created_at_ms));
    println!("  Updated:    {}", timestamp(job.updated_at_ms));
    println!();
}

pub fn print_predictions(table: &PredictionTable) {
    println!("\n=== Predictions ({} rows) ===\n", table.len());
    println!("{:<50} {:<15}", "File", "Prediction");
    println!("{:-<65}", "");
    for row in table.rows() {
        println!("{:<50} {:<15}", row.file, row.prediction.to_string());
    }
    println!();
}

pub fn print_workflow_report(report: &WorkflowReport) {
    println!("\n=== Workflow Complete ===\n");
    println!("  ✓ Compute     {}", report.compute.name);
    println!(
        "  ✓ Model       {}:{}",
        report.model.name,
        report.model.version.as_deref().unwrap_or("-")
    );
    println!(
        "  ✓ Dataset     {}:{}",
        report.dataset.name,
        report.dataset.version.as_deref().unwrap_or("-")
    );
    println!("  ✓ Endpoint    {}", report.endpoint.name);
    println!("  ✓ Deployment  {} ({})", report.deployment.name, report.deployment.model);
    println!("  ✓ Job         {}", report.job.name);
    println!("  ✓ Scoring     {}", report.scoring_job.name);
    println!("  ✓ Output      {}", report.output_dir.display());
    print_predictions(&report.predictions);
}
