//! Subcommand handlers.
//!
//! Each handler does its work, prints a short human-readable summary to
//! stdout and logs the details through `tracing`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use featurize_cloud::container::ContainerTool;
use featurize_cloud::storage::{ObjectStore, SplitSummary};
use featurize_core::error::CoreError;
use featurize_core::image::ImageRef;
use featurize_core::job::{
    ComputeSizing, InputDeclaration, JobSpec, OutputDeclaration, CODE_MOUNT_PATH,
};
use featurize_core::layout::{OutputLayout, S3Uri};
use featurize_core::naming;
use featurize_core::script_args::FeaturizeArgs;
use featurize_core::status::JobStatus;
use featurize_core::types::{JobHandle, Timestamp};
use featurize_processing::api::{default_endpoint, ProcessingApi};
use featurize_processing::poll::{poll_until_terminal, PollConfig, WatchOutcome};
use featurize_processing::service::JobDescription;
use featurize_processing::signing::RequestSigner;
use featurize_processing::workflow::JobWorkflow;
use tokio_util::sync::CancellationToken;

use crate::args::{
    BuildArgs, Cli, Command, ImageArgs, JobArgs, OutputsArgs, PathsArgs, SubmitArgs, WatchArgs,
};

/// Exit status of `watch` when the job ended Failed or Stopped.
pub const EXIT_JOB_UNSUCCESSFUL: u8 = 2;

/// Dispatch the parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Build(args) => build(&cli, args).await?,
        Command::Paths(args) => paths(args)?,
        Command::Submit(args) => submit(&cli, args).await?,
        Command::Status(args) => status(&cli, args).await?,
        Command::Watch(args) => return watch(&cli, args).await,
        Command::Outputs(args) => outputs(&cli, args).await?,
    }
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn build(cli: &Cli, args: &BuildArgs) -> anyhow::Result<()> {
    let image = image_ref(&args.image, &cli.region)?;
    let tool = ContainerTool::new().with_docker(&args.docker);

    if tool
        .ensure_repository(image.repository(), &cli.region)
        .await
        .context("Failed to ensure registry repository")?
    {
        println!("created repository {}", image.repository());
    }
    tool.login(&image, &cli.region)
        .await
        .context("Registry login failed")?;
    tool.build(&image, &args.dockerfile, &args.context)
        .await
        .context("Image build failed")?;
    tool.push(&image).await.context("Image push failed")?;

    println!("{}", image.uri());
    Ok(())
}

fn paths(args: &PathsArgs) -> anyhow::Result<()> {
    let layout = resolve_layout(&args.bucket, args.prefix.as_deref(), chrono::Utc::now())?;
    print!("{}", render_layout(&layout));
    Ok(())
}

async fn submit(cli: &Cli, args: &SubmitArgs) -> anyhow::Result<()> {
    let plan = plan_submit(args, &cli.region, chrono::Utc::now())?;
    let workflow = JobWorkflow::new(processing_api(cli).await?);

    let store = ObjectStore::from_env(Some(&cli.region)).await;
    for (path, destination) in &plan.uploads {
        store
            .upload_file(path, destination)
            .await
            .with_context(|| format!("Failed to stage {}", path.display()))?;
    }

    let handle = workflow.submit(&plan.spec).await?;

    println!("job:    {}", handle.job_name);
    if let Some(arn) = &handle.job_arn {
        println!("arn:    {arn}");
    }
    print!("{}", render_layout(&plan.layout));
    Ok(())
}

async fn status(cli: &Cli, args: &JobArgs) -> anyhow::Result<()> {
    let workflow = JobWorkflow::new(processing_api(cli).await?);
    let description = workflow
        .describe(&JobHandle::from_name(&args.job_name))
        .await?;
    print!("{}", render_description(&description));
    Ok(())
}

async fn watch(cli: &Cli, args: &WatchArgs) -> anyhow::Result<ExitCode> {
    let workflow = JobWorkflow::new(processing_api(cli).await?);
    let handle = JobHandle::from_name(&args.job.job_name);
    let config = PollConfig {
        initial_interval: Duration::from_secs(args.interval_secs),
        max_interval: Duration::from_secs(args.max_interval_secs),
        max_polls: args.max_polls,
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; the job keeps running remotely");
            on_signal.cancel();
        }
    });

    let outcome = poll_until_terminal(&workflow, &handle, &config, &cancel).await?;
    match &outcome {
        WatchOutcome::Terminal(description) => print!("{}", render_description(description)),
        WatchOutcome::Cancelled { last } => {
            println!("{handle}: stopped watching (last status: {})", status_label(*last));
        }
        WatchOutcome::GaveUp { last, polls } => {
            println!(
                "{handle}: gave up after {polls} polls (last status: {})",
                status_label(*last)
            );
        }
    }
    Ok(ExitCode::from(watch_exit_code(&outcome)))
}

async fn outputs(cli: &Cli, args: &OutputsArgs) -> anyhow::Result<()> {
    let layout = OutputLayout::new(&args.bucket, &args.prefix)?;
    let store = ObjectStore::from_env(Some(&cli.region)).await;
    let summaries = store
        .summarize_outputs(&layout)
        .await
        .context("Failed to list job outputs")?;

    for summary in &summaries {
        if summary.is_empty() {
            tracing::warn!(split = summary.name, location = %summary.location, "Split has no objects");
        }
    }
    print!("{}", render_summaries(&summaries));
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The explicit endpoint, or the regional SageMaker API.
pub fn resolve_endpoint(endpoint: Option<&str>, region: &str) -> String {
    match endpoint {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => default_endpoint(region),
    }
}

/// Client for the processing endpoint. A bearer token replaces SigV4
/// signing; otherwise credentials come from the default AWS chain.
async fn processing_api(cli: &Cli) -> anyhow::Result<ProcessingApi> {
    let api = ProcessingApi::new(resolve_endpoint(cli.endpoint.as_deref(), &cli.region));
    match &cli.api_token {
        Some(token) => Ok(api.with_token(token)),
        None => {
            let signer = RequestSigner::from_env(&cli.region)
                .await
                .context("Failed to load AWS credentials for the processing API")?;
            Ok(api.with_signer(signer))
        }
    }
}

fn image_ref(args: &ImageArgs, region: &str) -> Result<ImageRef, CoreError> {
    ImageRef::ecr(&args.account, region, &args.repository, &args.tag)
}

/// Layout for `prefix`, or for a fresh run prefix derived from `now`.
pub fn resolve_layout(
    bucket: &str,
    prefix: Option<&str>,
    now: Timestamp,
) -> Result<OutputLayout, CoreError> {
    match prefix {
        Some(prefix) => OutputLayout::new(bucket, prefix),
        None => OutputLayout::new(bucket, &naming::run_prefix(now)),
    }
}

/// A validated submission: the spec plus the local files to stage.
#[derive(Debug)]
pub struct SubmitPlan {
    pub layout: OutputLayout,
    pub spec: JobSpec,
    pub uploads: Vec<(PathBuf, S3Uri)>,
}

/// Derive and validate everything `submit` needs before touching S3.
///
/// The raw input (if any) goes to the input prefix and the script to
/// the code prefix.
pub fn plan_submit(args: &SubmitArgs, region: &str, now: Timestamp) -> anyhow::Result<SubmitPlan> {
    let layout = resolve_layout(&args.bucket, args.prefix.as_deref(), now)?;
    let script_name = file_name(&args.script)?;
    let spec = build_job_spec(args, region, &layout, script_name, now)?;

    let mut uploads = Vec::with_capacity(2);
    if let Some(input) = &args.input {
        uploads.push((input.clone(), layout.input().join(file_name(input)?)?));
    }
    uploads.push((args.script.clone(), layout.code().join(script_name)?));

    Ok(SubmitPlan {
        layout,
        spec,
        uploads,
    })
}

/// Assemble the job spec for a run whose script was staged as
/// `script_name` under the layout's code prefix.
pub fn build_job_spec(
    args: &SubmitArgs,
    region: &str,
    layout: &OutputLayout,
    script_name: &str,
    now: Timestamp,
) -> Result<JobSpec, CoreError> {
    let job_name = naming::job_name(&args.base_job_name, now)?;
    let compute = ComputeSizing::new(args.instance_count, &args.instance_type)
        .with_volume_size_gb(args.volume_size_gb);

    let builder = args.env.iter().fold(
        JobSpec::builder(job_name),
        |builder, (key, value)| builder.env(key, value),
    );

    builder
        .image(image_ref(&args.image, region)?)
        .entrypoint(args.entrypoint.iter().cloned())
        .role_arn(&args.role_arn)
        .compute(compute)
        .max_runtime_secs(args.max_runtime_secs)
        .script_path(format!("{CODE_MOUNT_PATH}/{script_name}"))
        .arguments(FeaturizeArgs::for_layout(layout).to_args()?)
        .input(InputDeclaration::code(layout.code()))
        .ensure_platform_output(OutputDeclaration::placeholder(layout))
        .build()
}

/// `0` unless the job finished Failed or Stopped.
pub fn watch_exit_code(outcome: &WatchOutcome) -> u8 {
    match outcome {
        WatchOutcome::Terminal(d) if d.status != JobStatus::Completed => EXIT_JOB_UNSUCCESSFUL,
        _ => 0,
    }
}

fn file_name(path: &Path) -> anyhow::Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn status_label(status: Option<JobStatus>) -> String {
    status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
}

pub fn render_layout(layout: &OutputLayout) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "prefix: {}", layout.prefix());
    let _ = writeln!(out, "input:  {}", layout.input());
    let _ = writeln!(out, "code:   {}", layout.code());
    for (name, location) in layout.splits() {
        let _ = writeln!(out, "{:<11} {location}", format!("{name}:"));
    }
    out
}

pub fn render_description(description: &JobDescription) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", description.handle, description.status);
    if let Some(reason) = &description.failure_reason {
        let _ = writeln!(out, "  failure: {reason}");
    }
    if let Some(message) = &description.exit_message {
        let _ = writeln!(out, "  exit:    {message}");
    }
    if let (Some(started), Some(ended)) = (description.started_at, description.ended_at) {
        let _ = writeln!(out, "  runtime: {}s", (ended - started).num_seconds());
    }
    out
}

pub fn render_summaries(summaries: &[SplitSummary]) -> String {
    let mut out = String::new();
    for summary in summaries {
        let _ = writeln!(
            out,
            "{:<11} {:>5} objects {:>12} bytes  {}",
            format!("{}:", summary.name),
            summary.objects,
            summary.total_bytes,
            summary.location,
        );
    }
    out
}
