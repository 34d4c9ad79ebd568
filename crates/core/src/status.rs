//! Processing job status and its state machine.
//!
//! Status is owned by the execution service and only ever observed
//! through polling. The state machine here exists to check that what
//! we observe is consistent: statuses move forward and a terminal
//! status is final.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [JobStatus; 5] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
        Self::Stopped,
    ];

    /// Whether no further transition can occur from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Parse the `ProcessingJobStatus` string reported by the service.
    ///
    /// `Stopping` is reported while a stop request drains; the job has
    /// not reached a terminal state yet so it maps to `InProgress`.
    pub fn from_service(value: &str) -> Result<Self, CoreError> {
        match value {
            "Pending" => Ok(Self::Pending),
            "InProgress" | "Stopping" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Stopped" => Ok(Self::Stopped),
            other => Err(CoreError::Validation(format!(
                "Unknown processing job status '{other}'"
            ))),
        }
    }

    /// The service's spelling of this status.
    pub fn as_service_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_service_str())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::JobStatus;
    use crate::error::CoreError;

    /// Statuses reachable from `from` in a single observed step.
    ///
    /// A job may finish between two polls, so `Pending` can be followed
    /// directly by any terminal status.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        match from {
            JobStatus::Pending => &[
                JobStatus::InProgress,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Stopped,
            ],
            JobStatus::InProgress => &[
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Stopped,
            ],
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning a conflict for invalid ones.
    pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Invalid status transition: {from} -> {to}. Allowed: {:?}",
                valid_transitions(from)
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// StatusTracker
// ---------------------------------------------------------------------------

/// Records statuses observed across repeated polls of one job.
///
/// Re-observing the current status is a no-op. Any observation that
/// moves backwards, or away from a terminal status, is rejected.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    history: Vec<JobStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a polled status.
    ///
    /// Returns `true` when the status changed since the last
    /// observation. The first observation is always accepted since
    /// polling may begin at any point in the job's life.
    pub fn observe(&mut self, status: JobStatus) -> Result<bool, CoreError> {
        match self.current() {
            None => {
                self.history.push(status);
                Ok(true)
            }
            Some(current) if current == status => Ok(false),
            Some(current) => {
                state_machine::validate_transition(current, status)?;
                self.history.push(status);
                Ok(true)
            }
        }
    }

    /// The most recently observed status.
    pub fn current(&self) -> Option<JobStatus> {
        self.history.last().copied()
    }

    /// Distinct statuses in the order they were first observed.
    pub fn history(&self) -> &[JobStatus] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.current().is_some_and(JobStatus::is_terminal)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::state_machine::*;
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
    }

    #[test]
    fn parses_service_statuses() {
        assert_eq!(JobStatus::from_service("InProgress").unwrap(), JobStatus::InProgress);
        assert_eq!(JobStatus::from_service("Completed").unwrap(), JobStatus::Completed);
        assert_eq!(JobStatus::from_service("Failed").unwrap(), JobStatus::Failed);
        assert_eq!(JobStatus::from_service("Stopped").unwrap(), JobStatus::Stopped);
    }

    #[test]
    fn stopping_is_not_terminal() {
        let status = JobStatus::from_service("Stopping").unwrap();
        assert_eq!(status, JobStatus::InProgress);
        assert!(!status.is_terminal());
    }

    #[test]
    fn unknown_service_status_is_rejected() {
        assert_matches!(JobStatus::from_service("Exploded"), Err(CoreError::Validation(_)));
        assert_matches!(JobStatus::from_service(""), Err(CoreError::Validation(_)));
    }

    #[test]
    fn service_str_round_trips() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from_service(status.as_service_str()).unwrap(), status);
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_in_progress() {
        assert!(can_transition(JobStatus::Pending, JobStatus::InProgress));
    }

    #[test]
    fn pending_may_skip_to_terminal() {
        assert!(can_transition(JobStatus::Pending, JobStatus::Completed));
        assert!(can_transition(JobStatus::Pending, JobStatus::Failed));
    }

    #[test]
    fn in_progress_cannot_regress() {
        assert!(!can_transition(JobStatus::InProgress, JobStatus::Pending));
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(valid_transitions(JobStatus::Completed).is_empty());
        assert!(valid_transitions(JobStatus::Failed).is_empty());
        assert!(valid_transitions(JobStatus::Stopped).is_empty());
    }

    #[test]
    fn validate_transition_reports_conflict() {
        let err = validate_transition(JobStatus::Completed, JobStatus::InProgress).unwrap_err();
        assert_matches!(err, CoreError::Conflict(msg) if msg.contains("Completed -> InProgress"));
    }

    // -----------------------------------------------------------------------
    // StatusTracker
    // -----------------------------------------------------------------------

    #[test]
    fn tracker_accepts_forward_progress() {
        let mut tracker = StatusTracker::new();
        assert!(tracker.observe(JobStatus::Pending).unwrap());
        assert!(tracker.observe(JobStatus::InProgress).unwrap());
        assert!(!tracker.observe(JobStatus::InProgress).unwrap());
        assert!(tracker.observe(JobStatus::Completed).unwrap());

        assert!(tracker.is_terminal());
        assert_eq!(
            tracker.history(),
            &[JobStatus::Pending, JobStatus::InProgress, JobStatus::Completed]
        );
    }

    #[test]
    fn tracker_first_observation_may_be_mid_flight() {
        let mut tracker = StatusTracker::new();
        assert!(tracker.observe(JobStatus::InProgress).unwrap());
        assert_eq!(tracker.current(), Some(JobStatus::InProgress));
    }

    #[test]
    fn tracker_rejects_regression() {
        let mut tracker = StatusTracker::new();
        tracker.observe(JobStatus::InProgress).unwrap();
        assert_matches!(tracker.observe(JobStatus::Pending), Err(CoreError::Conflict(_)));
        assert_eq!(tracker.current(), Some(JobStatus::InProgress));
    }

    #[test]
    fn tracker_rejects_leaving_terminal() {
        let mut tracker = StatusTracker::new();
        tracker.observe(JobStatus::Failed).unwrap();
        assert!(!tracker.observe(JobStatus::Failed).unwrap());
        assert_matches!(tracker.observe(JobStatus::InProgress), Err(CoreError::Conflict(_)));
        assert_matches!(tracker.observe(JobStatus::Completed), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn empty_tracker_is_not_terminal() {
        let tracker = StatusTracker::new();
        assert!(!tracker.is_terminal());
        assert_eq!(tracker.current(), None);
    }
}
