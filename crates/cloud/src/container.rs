//! Container image build, registry login and push.
//!
//! Shells out to `docker` and the `aws` CLI. Every command runs with a
//! timeout and is killed if it overruns. Failures here are fatal to the
//! run and need manual attention; nothing is retried.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use featurize_core::image::ImageRef;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default timeout for a single command. Image builds pull base layers
/// and install dependencies, so this is generous.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Username the ECR token is valid for.
const REGISTRY_USERNAME: &str = "AWS";

const REPOSITORY_NOT_FOUND: &str = "RepositoryNotFoundException";

/// Errors from the container tooling.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// The program could not be started at all.
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{command}` failed (exit {code}): {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The program did not finish within the timeout.
    #[error("`{command}` timed out after {secs}s")]
    TimedOut { command: String, secs: u64 },
}

/// Runs the `docker` and `aws` CLIs.
#[derive(Debug, Clone)]
pub struct ContainerTool {
    docker: String,
    aws: String,
    timeout: Duration,
}

impl Default for ContainerTool {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            aws: "aws".to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl ContainerTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different container CLI binary (e.g. `podman`).
    pub fn with_docker(mut self, program: impl Into<String>) -> Self {
        self.docker = program.into();
        self
    }

    pub fn with_aws(mut self, program: impl Into<String>) -> Self {
        self.aws = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build `image` from `dockerfile` with `context` as build context.
    pub async fn build(
        &self,
        image: &ImageRef,
        dockerfile: &Path,
        context: &Path,
    ) -> Result<(), ContainerError> {
        let args = build_args(image, dockerfile, context);
        tracing::info!(image = %image, context = %context.display(), "Building image");
        self.run(&self.docker, &args, None).await?;
        tracing::info!(image = %image, "Image built");
        Ok(())
    }

    /// Push `image` to its registry. Requires a prior [`login`](Self::login).
    pub async fn push(&self, image: &ImageRef) -> Result<(), ContainerError> {
        tracing::info!(image = %image, "Pushing image");
        self.run(&self.docker, &push_args(image), None).await?;
        tracing::info!(image = %image, "Image pushed");
        Ok(())
    }

    /// Authenticate the container CLI against the image's registry.
    ///
    /// Fetches a short-lived token with `aws ecr get-login-password` and
    /// feeds it to `docker login --password-stdin`, so the token never
    /// appears on a command line.
    pub async fn login(&self, image: &ImageRef, region: &str) -> Result<(), ContainerError> {
        let registry = image.registry();
        tracing::info!(registry = %registry, region, "Logging in to registry");

        let token = self
            .run(&self.aws, &login_password_args(region), None)
            .await?;

        self.run(&self.docker, &login_args(&registry), Some(token.trim()))
            .await?;
        tracing::info!(registry = %registry, "Registry login succeeded");
        Ok(())
    }

    /// Create the repository unless it already exists.
    ///
    /// Returns `true` when the repository was created.
    pub async fn ensure_repository(
        &self,
        repository: &str,
        region: &str,
    ) -> Result<bool, ContainerError> {
        let describe = [
            "ecr",
            "describe-repositories",
            "--repository-names",
            repository,
            "--region",
            region,
        ];
        match self.run(&self.aws, &describe, None).await {
            Ok(_) => {
                tracing::debug!(repository, "Repository exists");
                Ok(false)
            }
            Err(ContainerError::Failed { stderr, .. }) if stderr.contains(REPOSITORY_NOT_FOUND) => {
                let create = [
                    "ecr",
                    "create-repository",
                    "--repository-name",
                    repository,
                    "--region",
                    region,
                ];
                self.run(&self.aws, &create, None).await?;
                tracing::info!(repository, region, "Repository created");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    // ---- private helpers ----

    /// Run `program` with `args`, optionally writing `stdin`, and fail
    /// on a non-zero exit or timeout. Returns the captured stdout.
    async fn run<S: AsRef<str>>(
        &self,
        program: &str,
        args: &[S],
        stdin: Option<&str>,
    ) -> Result<String, ContainerError> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let command = format!("{program} {}", args.join(" "));
        let start = Instant::now();

        let mut child = Command::new(program)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ContainerError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|source| ContainerError::Spawn {
                    program: program.to_string(),
                    source,
                })?;
            // Dropping the pipe closes stdin so the program sees EOF.
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ContainerError::Spawn {
                program: program.to_string(),
                source,
            })?,
            Err(_) => {
                tracing::error!(command = %command, "Command timed out");
                return Err(ContainerError::TimedOut {
                    command,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::error!(command = %command, elapsed_ms, stderr = %stderr.trim(), "Command failed");
            return Err(ContainerError::Failed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        tracing::debug!(command = %command, elapsed_ms, "Command succeeded");
        Ok(stdout)
    }
}

// ---------------------------------------------------------------------------
// Argument builders
// ---------------------------------------------------------------------------

pub fn build_args(image: &ImageRef, dockerfile: &Path, context: &Path) -> Vec<String> {
    vec![
        "build".to_string(),
        "-t".to_string(),
        image.uri(),
        "-f".to_string(),
        dockerfile.display().to_string(),
        context.display().to_string(),
    ]
}

pub fn push_args(image: &ImageRef) -> Vec<String> {
    vec!["push".to_string(), image.uri()]
}

pub fn login_password_args(region: &str) -> Vec<String> {
    vec![
        "ecr".to_string(),
        "get-login-password".to_string(),
        "--region".to_string(),
        region.to_string(),
    ]
}

pub fn login_args(registry: &str) -> Vec<String> {
    vec![
        "login".to_string(),
        "--username".to_string(),
        REGISTRY_USERNAME.to_string(),
        "--password-stdin".to_string(),
        registry.to_string(),
    ]
}
