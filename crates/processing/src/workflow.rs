//! Job submission and status polling.
//!
//! [`JobWorkflow::submit`] is fire-and-forget: one request, returning
//! the handle as soon as the service accepts the job. [`JobWorkflow::poll`]
//! is one read of the remote record. Neither waits, sleeps or retries;
//! repeated polling is up to the caller (see [`crate::poll`] for an
//! optional helper).

use featurize_core::error::CoreError;
use featurize_core::job::JobSpec;
use featurize_core::status::JobStatus;
use featurize_core::types::JobHandle;

use crate::service::{JobDescription, ProcessingService, ServiceError};

/// Submits jobs to and reads status from a [`ProcessingService`].
pub struct JobWorkflow<S> {
    service: S,
}

/// Errors surfaced by the workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The service refused or could not receive the submission.
    #[error("Submission of job '{job_name}' failed: {source}")]
    Submit {
        job_name: String,
        #[source]
        source: ServiceError,
    },

    /// The service has no record of the job (yet).
    #[error("Processing job '{0}' not found")]
    NotFound(String),

    /// A status query failed for a reason other than a missing job.
    #[error("Status query for job '{job_name}' failed: {source}")]
    Poll {
        job_name: String,
        #[source]
        source: ServiceError,
    },

    /// The observed status sequence broke the job state machine, or the
    /// polling config was invalid.
    #[error(transparent)]
    Status(#[from] CoreError),
}

impl<S: ProcessingService> JobWorkflow<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Submit a validated spec. Returns without waiting for the job.
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, WorkflowError> {
        let compute = spec.compute();
        tracing::info!(
            job_name = spec.job_name(),
            image = %spec.image(),
            instance_count = compute.instance_count,
            instance_type = %compute.instance_type,
            outputs = spec.outputs().len(),
            "Submitting processing job",
        );

        let handle = self
            .service
            .create_job(spec)
            .await
            .map_err(|source| WorkflowError::Submit {
                job_name: spec.job_name().to_string(),
                source,
            })?;

        tracing::info!(
            job_name = %handle,
            job_arn = handle.job_arn.as_deref().unwrap_or("-"),
            "Processing job submitted",
        );
        Ok(handle)
    }

    /// Read the full remote record once.
    pub async fn describe(&self, handle: &JobHandle) -> Result<JobDescription, WorkflowError> {
        match self.service.describe_job(&handle.job_name).await {
            Ok(description) => {
                tracing::debug!(job_name = %handle, status = %description.status, "Polled job");
                Ok(description)
            }
            Err(ServiceError::NotFound(name)) => Err(WorkflowError::NotFound(name)),
            Err(source) => Err(WorkflowError::Poll {
                job_name: handle.job_name.clone(),
                source,
            }),
        }
    }

    /// Read the current status once.
    pub async fn poll(&self, handle: &JobHandle) -> Result<JobStatus, WorkflowError> {
        Ok(self.describe(handle).await?.status)
    }
}
