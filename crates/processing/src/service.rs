//! The seam between the workflow and the execution service.
//!
//! [`JobWorkflow`](crate::workflow::JobWorkflow) is written against
//! [`ProcessingService`] so it can be driven by [`ProcessingApi`] in
//! production and by an in-process fake in tests.

use async_trait::async_trait;
use featurize_core::job::JobSpec;
use featurize_core::status::JobStatus;
use featurize_core::types::{JobHandle, Timestamp};

use crate::api::{ProcessingApi, ProcessingApiError};
use crate::wire::{CreateProcessingJobRequest, DescribeProcessingJobResponse};

/// Read-only projection of the remote job record.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescription {
    pub handle: JobHandle,
    pub status: JobStatus,
    pub failure_reason: Option<String>,
    pub exit_message: Option<String>,
    pub created_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
}

impl JobDescription {
    /// Description carrying only a status, with no timing or failure data.
    pub fn new(handle: JobHandle, status: JobStatus) -> Self {
        Self {
            handle,
            status,
            failure_reason: None,
            exit_message: None,
            created_at: None,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Errors reported by a [`ProcessingService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service has no record of the job.
    #[error("Processing job '{0}' not found")]
    NotFound(String),

    /// The service refused the request (permissions, unresolvable
    /// image, duplicate name, ...).
    #[error("Request rejected by processing service: {0}")]
    Rejected(String),

    /// The service could not be reached.
    #[error("Processing service unreachable: {0}")]
    Transport(String),

    /// The service answered with something we cannot interpret.
    #[error("Unexpected processing service response: {0}")]
    Protocol(String),
}

impl From<ProcessingApiError> for ServiceError {
    fn from(err: ProcessingApiError) -> Self {
        let message = err.to_string();
        match err {
            ProcessingApiError::NotFound(name) => Self::NotFound(name),
            ProcessingApiError::Request(e) if e.is_decode() => Self::Protocol(message),
            ProcessingApiError::Request(_) => Self::Transport(message),
            ProcessingApiError::Encode(_) => Self::Protocol(message),
            ProcessingApiError::Signing(_) => Self::Transport(message),
            ProcessingApiError::ApiError { status, .. } if status >= 500 => Self::Transport(message),
            ProcessingApiError::ApiError { .. } => Self::Rejected(message),
        }
    }
}

/// Operations the workflow needs from the execution service.
#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Submit `spec` and return as soon as the service accepts it.
    async fn create_job(&self, spec: &JobSpec) -> Result<JobHandle, ServiceError>;

    /// Fetch the current record of the named job.
    async fn describe_job(&self, job_name: &str) -> Result<JobDescription, ServiceError>;
}

#[async_trait]
impl ProcessingService for ProcessingApi {
    async fn create_job(&self, spec: &JobSpec) -> Result<JobHandle, ServiceError> {
        let request = CreateProcessingJobRequest::from(spec);
        let response = self.create_processing_job(&request).await?;
        Ok(JobHandle::from_name(spec.job_name()).with_arn(response.processing_job_arn))
    }

    async fn describe_job(&self, job_name: &str) -> Result<JobDescription, ServiceError> {
        let response = self.describe_processing_job(job_name).await?;
        description_from_wire(response)
    }
}

/// Convert a describe response, rejecting unknown statuses.
pub fn description_from_wire(
    response: DescribeProcessingJobResponse,
) -> Result<JobDescription, ServiceError> {
    let status = JobStatus::from_service(&response.processing_job_status)
        .map_err(|e| ServiceError::Protocol(e.to_string()))?;

    let mut handle = JobHandle::from_name(response.processing_job_name);
    if let Some(arn) = response.processing_job_arn {
        handle = handle.with_arn(arn);
    }

    Ok(JobDescription {
        handle,
        status,
        failure_reason: response.failure_reason,
        exit_message: response.exit_message,
        created_at: response.creation_time.and_then(epoch_to_timestamp),
        started_at: response.processing_start_time.and_then(epoch_to_timestamp),
        ended_at: response.processing_end_time.and_then(epoch_to_timestamp),
    })
}

/// Fractional epoch seconds to a UTC timestamp.
fn epoch_to_timestamp(secs: f64) -> Option<Timestamp> {
    if !secs.is_finite() {
        return None;
    }
    chrono::DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}
