use std::fmt;

use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier for a submitted processing job.
///
/// The job name is what the execution service keys its record on; the
/// ARN is only known once the service has accepted the submission and
/// is carried for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_name: String,
    pub job_arn: Option<String>,
}

impl JobHandle {
    /// Handle for a job known only by name (e.g. passed on the command line).
    pub fn from_name(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            job_arn: None,
        }
    }

    pub fn with_arn(mut self, job_arn: impl Into<String>) -> Self {
        self.job_arn = Some(job_arn.into());
        self
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_name)
    }
}
