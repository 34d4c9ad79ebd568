//! Caller-driven polling with exponential backoff.
//!
//! The workflow itself never waits. Callers that want to block until a
//! job finishes can use [`poll_until_terminal`], which repeatedly calls
//! [`JobWorkflow::describe`] with growing delays until a terminal status
//! is observed or the [`CancellationToken`] is triggered. Cancelling
//! stops local observation only; the remote job keeps running.

use std::time::Duration;

use featurize_core::error::CoreError;
use featurize_core::status::{JobStatus, StatusTracker};
use featurize_core::types::JobHandle;
use tokio_util::sync::CancellationToken;

use crate::service::{JobDescription, ProcessingService};
use crate::workflow::{JobWorkflow, WorkflowError};

/// Tunable parameters for the polling cadence.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay after the first poll.
    pub initial_interval: Duration,
    /// Upper bound on the delay between polls.
    pub max_interval: Duration,
    /// Factor by which the delay grows after each poll.
    pub multiplier: f64,
    /// How many `NotFound` answers to tolerate before the job has been
    /// seen at all. A freshly submitted job may not be visible yet.
    pub not_found_grace: u32,
    /// Stop after this many polls. `None` polls until terminal.
    pub max_polls: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            multiplier: 1.5,
            not_found_grace: 3,
            max_polls: None,
        }
    }
}

impl PollConfig {
    /// Reject cadences that would poll without pausing.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.initial_interval.is_zero() {
            return Err(CoreError::Validation(
                "initial poll interval must be greater than zero".into(),
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(CoreError::Validation(format!(
                "max poll interval {:?} is shorter than the initial interval {:?}",
                self.max_interval, self.initial_interval
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(CoreError::Validation(format!(
                "poll interval multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// How a call to [`poll_until_terminal`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// The job reached a terminal status.
    Terminal(JobDescription),
    /// The token was cancelled first.
    Cancelled { last: Option<JobStatus> },
    /// `max_polls` was exhausted first.
    GaveUp { last: Option<JobStatus>, polls: u32 },
}

/// Wait before the poll after one that waited `current`: grown by the
/// multiplier, never longer than [`PollConfig::max_interval`].
pub fn next_interval(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_interval)
}

/// Poll `handle` until it reaches a terminal status.
///
/// Every observed status is checked with a [`StatusTracker`]; a
/// regression is returned as [`WorkflowError::Status`], as is a config
/// that fails [`PollConfig::validate`]. Cancellation also interrupts a
/// describe call that is still in flight.
pub async fn poll_until_terminal<S: ProcessingService>(
    workflow: &JobWorkflow<S>,
    handle: &JobHandle,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<WatchOutcome, WorkflowError> {
    config.validate()?;

    let mut tracker = StatusTracker::new();
    let mut interval = config.initial_interval;
    let mut polls = 0u32;
    let mut not_found = 0u32;

    loop {
        if cancel.is_cancelled() {
            tracing::info!(job_name = %handle, "Polling cancelled");
            return Ok(WatchOutcome::Cancelled {
                last: tracker.current(),
            });
        }

        polls += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_name = %handle, "Polling cancelled during status query");
                return Ok(WatchOutcome::Cancelled { last: tracker.current() });
            }
            result = workflow.describe(handle) => result,
        };
        match result {
            Ok(description) => {
                if tracker.observe(description.status)? {
                    tracing::info!(
                        job_name = %handle,
                        status = %description.status,
                        polls,
                        "Job status changed",
                    );
                }
                if description.status.is_terminal() {
                    return Ok(WatchOutcome::Terminal(description));
                }
            }
            Err(WorkflowError::NotFound(name))
                if tracker.current().is_none() && not_found < config.not_found_grace =>
            {
                not_found += 1;
                tracing::warn!(
                    job_name = %name,
                    attempt = not_found,
                    "Job not visible yet, will poll again",
                );
            }
            Err(e) => return Err(e),
        }

        if config.max_polls.is_some_and(|max| polls >= max) {
            tracing::warn!(job_name = %handle, polls, "Giving up before job finished");
            return Ok(WatchOutcome::GaveUp {
                last: tracker.current(),
                polls,
            });
        }

        // Wait before the next poll, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_name = %handle, "Polling cancelled");
                return Ok(WatchOutcome::Cancelled { last: tracker.current() });
            }
            _ = tokio::time::sleep(interval) => {}
        }

        interval = next_interval(interval, config);
    }
}
