//! Command-line arguments.
//!
//! Every option that names an AWS resource falls back to an environment
//! variable, so a `.env` file can hold the per-account settings.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use featurize_core::job::{DEFAULT_MAX_RUNTIME_SECS, DEFAULT_VOLUME_SIZE_GB, MIN_INSTANCE_COUNT};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_REPOSITORY: &str = "featurize-tfidf";
pub const DEFAULT_BASE_JOB_NAME: &str = "tfidf-featurize";
pub const DEFAULT_INSTANCE_TYPE: &str = "ml.r5.xlarge";
pub const DEFAULT_ENTRYPOINT: &str = "smspark-submit";

/// Build, submit and inspect TF-IDF featurization jobs.
#[derive(Parser, Debug)]
#[command(name = "featurize")]
#[command(version, long_about = None)]
pub struct Cli {
    /// AWS region for the registry, the processing service and S3
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION, global = true)]
    pub region: String,

    /// Processing service endpoint (default: the regional SageMaker API, SigV4-signed)
    #[arg(long, env = "PROCESSING_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Bearer token for a gateway endpoint; replaces SigV4 signing
    #[arg(long, env = "PROCESSING_API_TOKEN", hide_env_values = true, global = true)]
    pub api_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the featurization image and push it to the registry
    Build(BuildArgs),
    /// Print the S3 layout of a run
    Paths(PathsArgs),
    /// Stage the script and submit a processing job (does not wait)
    Submit(SubmitArgs),
    /// Query a job's status once
    Status(JobArgs),
    /// Poll a job until it finishes (Ctrl-C stops watching, not the job)
    Watch(WatchArgs),
    /// List what a run wrote to its output prefixes
    Outputs(OutputsArgs),
}

/// Where the image lives in the registry.
#[derive(Args, Debug, Clone)]
pub struct ImageArgs {
    /// AWS account that owns the registry
    #[arg(long, env = "AWS_ACCOUNT_ID")]
    pub account: String,

    #[arg(long, env = "FEATURIZE_REPOSITORY", default_value = DEFAULT_REPOSITORY)]
    pub repository: String,

    #[arg(long, env = "FEATURIZE_IMAGE_TAG", default_value = "latest")]
    pub tag: String,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    /// Dockerfile to build
    #[arg(long, default_value = "container/Dockerfile")]
    pub dockerfile: PathBuf,

    /// Build context directory
    #[arg(long, default_value = "container")]
    pub context: PathBuf,

    /// Container CLI binary (e.g. podman)
    #[arg(long, env = "FEATURIZE_DOCKER", default_value = "docker")]
    pub docker: String,
}

#[derive(Args, Debug, Clone)]
pub struct PathsArgs {
    #[arg(long, env = "FEATURIZE_BUCKET")]
    pub bucket: String,

    /// Run prefix (default: a fresh `run-<timestamp>`)
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    #[arg(long, env = "FEATURIZE_BUCKET")]
    pub bucket: String,

    /// Execution role the job runs as
    #[arg(long, env = "FEATURIZE_ROLE_ARN")]
    pub role_arn: String,

    /// Run prefix (default: a fresh `run-<timestamp>`)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Featurization script, uploaded to the run's code prefix
    #[arg(long, default_value = "container/preprocess.py")]
    pub script: PathBuf,

    /// Raw input file to upload to the run's input prefix first
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Prefix of the generated job name
    #[arg(long, default_value = DEFAULT_BASE_JOB_NAME)]
    pub base_job_name: String,

    #[arg(long, default_value_t = MIN_INSTANCE_COUNT)]
    pub instance_count: u32,

    #[arg(long, default_value = DEFAULT_INSTANCE_TYPE)]
    pub instance_type: String,

    #[arg(long, default_value_t = DEFAULT_VOLUME_SIZE_GB)]
    pub volume_size_gb: u32,

    #[arg(long, default_value_t = DEFAULT_MAX_RUNTIME_SECS)]
    pub max_runtime_secs: u32,

    /// Container entrypoint; the script path is appended to it
    #[arg(long, default_value = DEFAULT_ENTRYPOINT, num_args = 1.., value_delimiter = ' ')]
    pub entrypoint: Vec<String>,

    /// Extra container environment, repeatable
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,
}

#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Processing job name
    pub job_name: String,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Seconds before the second poll
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: u64,

    /// Upper bound on seconds between polls
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_interval_secs: u64,

    /// Stop watching after this many polls
    #[arg(long)]
    pub max_polls: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct OutputsArgs {
    #[arg(long, env = "FEATURIZE_BUCKET")]
    pub bucket: String,

    /// Run prefix printed by `submit`
    #[arg(long)]
    pub prefix: String,
}

/// Parse `KEY=VALUE`.
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
