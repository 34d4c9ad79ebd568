//! Processing job specification and its builder.
//!
//! A [`JobSpec`] can only be obtained from [`JobSpecBuilder::build`],
//! which checks every field against the execution service's rules and
//! the cluster-mode requirement of at least two instances. Once built
//! the spec is immutable.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::image::ImageRef;
use crate::layout::{validate_disjoint, OutputLayout, S3Uri};
use crate::naming::validate_job_name;
use crate::script_args::ScriptArgs;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The distributed framework falls back to single-node mode below this.
pub const MIN_INSTANCE_COUNT: u32 = 2;

pub const MAX_INSTANCE_COUNT: u32 = 100;

pub const DEFAULT_VOLUME_SIZE_GB: u32 = 30;

pub const MAX_VOLUME_SIZE_GB: u32 = 16_384;

/// One day.
pub const DEFAULT_MAX_RUNTIME_SECS: u32 = 86_400;

pub const MAX_RUNTIME_SECS: u32 = 432_000;

pub const MAX_ENVIRONMENT_ENTRIES: usize = 100;

/// Container directory under which inputs and outputs are mounted.
pub const PROCESSING_ROOT: &str = "/opt/ml/processing";

/// Where the staged script prefix is mounted inside the container.
pub const CODE_MOUNT_PATH: &str = "/opt/ml/processing/input/code";

/// Container directory backing the placeholder output declaration.
pub const PLACEHOLDER_SOURCE: &str = "/opt/ml/processing/output";

pub const CODE_INPUT_NAME: &str = "code";

pub const PLACEHOLDER_OUTPUT_NAME: &str = "placeholder";

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// When the service uploads an output directory to S3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadMode {
    /// Once, after the job finishes.
    EndOfJob,
    /// Continuously while the job runs.
    Continuous,
}

impl UploadMode {
    pub fn as_service_str(self) -> &'static str {
        match self {
            Self::EndOfJob => "EndOfJob",
            Self::Continuous => "Continuous",
        }
    }
}

/// A container directory the service uploads to S3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDeclaration {
    pub name: String,
    /// Absolute path inside the container.
    pub source: String,
    pub destination: S3Uri,
    pub upload_mode: UploadMode,
}

impl OutputDeclaration {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        destination: S3Uri,
        upload_mode: UploadMode,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination,
            upload_mode,
        }
    }

    /// Declaration that carries no data.
    ///
    /// The service refuses jobs without at least one declared output,
    /// while the featurization script writes its splits straight to S3.
    /// This declaration only satisfies that minimum.
    pub fn placeholder(layout: &OutputLayout) -> Self {
        Self::new(
            PLACEHOLDER_OUTPUT_NAME,
            PLACEHOLDER_SOURCE,
            layout.placeholder(),
            UploadMode::EndOfJob,
        )
    }
}

/// An S3 prefix the service downloads into the container before start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDeclaration {
    pub name: String,
    pub source: S3Uri,
    /// Absolute path inside the container.
    pub destination: String,
}

impl InputDeclaration {
    pub fn new(name: impl Into<String>, source: S3Uri, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source,
            destination: destination.into(),
        }
    }

    /// Mount the staged script prefix at [`CODE_MOUNT_PATH`].
    pub fn code(source: S3Uri) -> Self {
        Self::new(CODE_INPUT_NAME, source, CODE_MOUNT_PATH)
    }
}

/// Cluster sizing for the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeSizing {
    pub instance_count: u32,
    pub instance_type: String,
    pub volume_size_gb: u32,
}

impl ComputeSizing {
    pub fn new(instance_count: u32, instance_type: impl Into<String>) -> Self {
        Self {
            instance_count,
            instance_type: instance_type.into(),
            volume_size_gb: DEFAULT_VOLUME_SIZE_GB,
        }
    }

    pub fn with_volume_size_gb(mut self, volume_size_gb: u32) -> Self {
        self.volume_size_gb = volume_size_gb;
        self
    }

    /// Check sizing limits, including the cluster-mode minimum.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.instance_count == 1 {
            return Err(CoreError::Validation(format!(
                "instance_count of 1 is unsupported: the distributed framework degrades to \
                 single-node mode. Use at least {MIN_INSTANCE_COUNT} instances"
            )));
        }
        if !(MIN_INSTANCE_COUNT..=MAX_INSTANCE_COUNT).contains(&self.instance_count) {
            return Err(CoreError::Validation(format!(
                "instance_count must be between {MIN_INSTANCE_COUNT} and {MAX_INSTANCE_COUNT}, got {}",
                self.instance_count
            )));
        }
        let family = self.instance_type.strip_prefix("ml.").unwrap_or_default();
        if family.is_empty() || family.contains(char::is_whitespace) {
            return Err(CoreError::Validation(format!(
                "instance_type '{}' must be an 'ml.' instance type",
                self.instance_type
            )));
        }
        if !(1..=MAX_VOLUME_SIZE_GB).contains(&self.volume_size_gb) {
            return Err(CoreError::Validation(format!(
                "volume_size_gb must be between 1 and {MAX_VOLUME_SIZE_GB}, got {}",
                self.volume_size_gb
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JobSpec
// ---------------------------------------------------------------------------

/// A validated, immutable processing job description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    job_name: String,
    image: ImageRef,
    entrypoint: Vec<String>,
    role_arn: String,
    compute: ComputeSizing,
    environment: BTreeMap<String, String>,
    script_path: String,
    arguments: Vec<String>,
    inputs: Vec<InputDeclaration>,
    outputs: Vec<OutputDeclaration>,
    max_runtime_secs: u32,
}

impl JobSpec {
    pub fn builder(job_name: impl Into<String>) -> JobSpecBuilder {
        JobSpecBuilder::new(job_name)
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn entrypoint(&self) -> &[String] {
        &self.entrypoint
    }

    /// Entrypoint command followed by the script path, as launched in
    /// the container.
    pub fn container_entrypoint(&self) -> Vec<String> {
        let mut command = self.entrypoint.clone();
        command.push(self.script_path.clone());
        command
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    pub fn compute(&self) -> &ComputeSizing {
        &self.compute
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    /// Flat `--key value` token list passed to the script.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn inputs(&self) -> &[InputDeclaration] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputDeclaration] {
        &self.outputs
    }

    pub fn max_runtime_secs(&self) -> u32 {
        self.max_runtime_secs
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects job fields and validates them in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    job_name: String,
    image: Option<ImageRef>,
    entrypoint: Vec<String>,
    role_arn: Option<String>,
    compute: Option<ComputeSizing>,
    environment: BTreeMap<String, String>,
    script_path: Option<String>,
    arguments: ScriptArgs,
    inputs: Vec<InputDeclaration>,
    outputs: Vec<OutputDeclaration>,
    max_runtime_secs: u32,
}

impl JobSpecBuilder {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            image: None,
            entrypoint: Vec::new(),
            role_arn: None,
            compute: None,
            environment: BTreeMap::new(),
            script_path: None,
            arguments: ScriptArgs::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            max_runtime_secs: DEFAULT_MAX_RUNTIME_SECS,
        }
    }

    pub fn image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn entrypoint<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    pub fn compute(mut self, compute: ComputeSizing) -> Self {
        self.compute = Some(compute);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn script_path(mut self, script_path: impl Into<String>) -> Self {
        self.script_path = Some(script_path.into());
        self
    }

    pub fn arguments(mut self, arguments: ScriptArgs) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn input(mut self, input: InputDeclaration) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: OutputDeclaration) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn max_runtime_secs(mut self, secs: u32) -> Self {
        self.max_runtime_secs = secs;
        self
    }

    /// Satisfy the service's minimum of one declared output.
    ///
    /// Adds `placeholder` only when no output has been declared, so a
    /// job with real outputs is left untouched.
    pub fn ensure_platform_output(mut self, placeholder: OutputDeclaration) -> Self {
        if self.outputs.is_empty() {
            self.outputs.push(placeholder);
        }
        self
    }

    /// Validate every field and produce the immutable spec.
    pub fn build(self) -> Result<JobSpec, CoreError> {
        validate_job_name(&self.job_name)?;

        let image = self.image.ok_or_else(|| missing("image"))?;

        if self.entrypoint.is_empty() || self.entrypoint.iter().any(|t| t.trim().is_empty()) {
            return Err(CoreError::Validation(
                "entrypoint must be a non-empty command with no blank tokens".into(),
            ));
        }

        let role_arn = self.role_arn.ok_or_else(|| missing("role_arn"))?;
        validate_role_arn(&role_arn)?;

        let compute = self.compute.ok_or_else(|| missing("compute"))?;
        compute.validate()?;

        validate_environment(&self.environment)?;

        let script_path = self.script_path.ok_or_else(|| missing("script_path"))?;
        validate_container_path("script_path", &script_path)?;

        validate_declarations(&self.inputs, &self.outputs)?;

        if !(1..=MAX_RUNTIME_SECS).contains(&self.max_runtime_secs) {
            return Err(CoreError::Validation(format!(
                "max_runtime_secs must be between 1 and {MAX_RUNTIME_SECS}, got {}",
                self.max_runtime_secs
            )));
        }

        Ok(JobSpec {
            job_name: self.job_name,
            image,
            entrypoint: self.entrypoint,
            role_arn,
            compute,
            environment: self.environment,
            script_path,
            arguments: self.arguments.to_tokens(),
            inputs: self.inputs,
            outputs: self.outputs,
            max_runtime_secs: self.max_runtime_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

fn missing(field: &str) -> CoreError {
    CoreError::Validation(format!("Job spec is missing required field '{field}'"))
}

/// Require an IAM role ARN, e.g. `arn:aws:iam::123456789012:role/Name`.
fn validate_role_arn(role_arn: &str) -> Result<(), CoreError> {
    let role_name = role_arn
        .strip_prefix("arn:")
        .and_then(|rest| rest.split_once(":role/"))
        .map(|(_, name)| name)
        .unwrap_or_default();
    if role_name.is_empty() || role_arn.contains(char::is_whitespace) {
        return Err(CoreError::Validation(format!(
            "role_arn '{role_arn}' is not an IAM role ARN"
        )));
    }
    Ok(())
}

fn validate_environment(environment: &BTreeMap<String, String>) -> Result<(), CoreError> {
    if environment.len() > MAX_ENVIRONMENT_ENTRIES {
        return Err(CoreError::Validation(format!(
            "At most {MAX_ENVIRONMENT_ENTRIES} environment variables are allowed, got {}",
            environment.len()
        )));
    }
    if let Some(key) = environment
        .keys()
        .find(|k| k.is_empty() || k.contains('=') || k.contains(char::is_whitespace))
    {
        return Err(CoreError::Validation(format!(
            "Invalid environment variable name '{key}'"
        )));
    }
    Ok(())
}

/// Container paths must be absolute and must not contain `..`.
fn validate_container_path(field: &str, path: &str) -> Result<(), CoreError> {
    if !path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
        return Err(CoreError::Validation(format!(
            "{field} '{path}' must be an absolute container path"
        )));
    }
    Ok(())
}

fn validate_declarations(
    inputs: &[InputDeclaration],
    outputs: &[OutputDeclaration],
) -> Result<(), CoreError> {
    if outputs.is_empty() {
        return Err(CoreError::Validation(
            "At least one output must be declared; use ensure_platform_output to add a \
             placeholder"
                .into(),
        ));
    }

    let mut names = HashSet::new();
    let all_names = inputs
        .iter()
        .map(|i| i.name.as_str())
        .chain(outputs.iter().map(|o| o.name.as_str()));
    for name in all_names {
        if name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Input and output names must not be empty".into(),
            ));
        }
        if !names.insert(name) {
            return Err(CoreError::Validation(format!(
                "Duplicate input/output name '{name}'"
            )));
        }
    }

    for input in inputs {
        validate_container_path("input destination", &input.destination)?;
    }
    for output in outputs {
        validate_container_path("output source", &output.source)?;
    }

    let destinations: Vec<S3Uri> = outputs.iter().map(|o| o.destination.clone()).collect();
    validate_disjoint(&destinations)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
