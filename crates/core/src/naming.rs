//! Run prefixes and processing job names.
//!
//! Both are derived from a UTC timestamp so that repeated runs never
//! collide in S3 or in the execution service's job namespace.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Timestamp format shared by run prefixes and job names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Maximum processing job name length accepted by the service.
pub const MAX_JOB_NAME_LEN: usize = 63;

const JOB_NAME_PATTERN: &str = r"^[a-zA-Z0-9](-*[a-zA-Z0-9])*$";

static JOB_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(JOB_NAME_PATTERN).expect("valid regex"));

/// Render `at` using [`TIMESTAMP_FORMAT`].
pub fn timestamp_suffix(at: Timestamp) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Per-run S3 prefix, e.g. `run-2024-01-01-00-00-00`.
pub fn run_prefix(at: Timestamp) -> String {
    format!("run-{}", timestamp_suffix(at))
}

/// Unique job name `{base}-{timestamp}`.
///
/// `base` is truncated so the result stays within
/// [`MAX_JOB_NAME_LEN`], and the result is validated.
pub fn job_name(base: &str, at: Timestamp) -> Result<String, CoreError> {
    let suffix = timestamp_suffix(at);
    let max_base = MAX_JOB_NAME_LEN - suffix.len() - 1;
    let base: String = base.chars().take(max_base).collect();
    let name = format!("{}-{suffix}", base.trim_end_matches('-'));
    validate_job_name(&name)?;
    Ok(name)
}

/// Validate a processing job name: 1-63 ASCII alphanumerics or `-`,
/// starting and ending with an alphanumeric.
pub fn validate_job_name(name: &str) -> Result<(), CoreError> {
    if name.len() > MAX_JOB_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Job name '{name}' exceeds {MAX_JOB_NAME_LEN} characters"
        )));
    }
    if !JOB_NAME_RE.is_match(name) {
        return Err(CoreError::Validation(format!(
            "Job name '{name}' must contain only letters, digits and '-', \
             and start and end with a letter or digit"
        )));
    }
    Ok(())
}
