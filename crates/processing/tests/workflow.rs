//! Integration tests for the submit/poll workflow against an
//! in-process scripted service.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{demo_spec, ScriptedService};
use featurize_core::status::{JobStatus, StatusTracker};
use featurize_core::types::JobHandle;
use featurize_processing::poll::{poll_until_terminal, PollConfig, WatchOutcome};
use featurize_processing::service::ServiceError;
use featurize_processing::workflow::{JobWorkflow, WorkflowError};
use tokio_util::sync::CancellationToken;

fn fast_config() -> PollConfig {
    PollConfig {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// submit
// ---------------------------------------------------------------------------

/// Submitting issues exactly one create call and no status reads.
#[tokio::test]
async fn submit_returns_handle_without_polling() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());
    let spec = demo_spec("tfidf-featurize-1");

    let handle = workflow.submit(&spec).await.unwrap();

    assert_eq!(handle.job_name, "tfidf-featurize-1");
    assert!(handle.job_arn.as_deref().unwrap().ends_with("/tfidf-featurize-1"));
    assert_eq!(workflow.service().describe_count(), 0);
    assert_eq!(workflow.service().submitted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_submission_is_submit_error() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path().rejecting());

    let err = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap_err();

    assert_matches!(
        err,
        WorkflowError::Submit { job_name, source: ServiceError::Rejected(_) } if job_name == "tfidf-featurize-1"
    );
}

#[tokio::test]
async fn duplicate_job_name_is_rejected() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());
    workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();

    let err = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap_err();
    assert_matches!(err, WorkflowError::Submit { .. });
}

// ---------------------------------------------------------------------------
// poll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_poll_is_non_terminal() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();

    let status = workflow.poll(&handle).await.unwrap();
    assert!(!status.is_terminal());
}

/// Repeated manual polls observe a monotone sequence ending in a
/// terminal status that then sticks.
#[tokio::test]
async fn repeated_polls_are_monotone() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();

    let mut tracker = StatusTracker::new();
    for _ in 0..8 {
        let status = workflow.poll(&handle).await.unwrap();
        tracker.observe(status).unwrap();
    }

    assert_eq!(
        tracker.history(),
        &[JobStatus::Pending, JobStatus::InProgress, JobStatus::Completed]
    );
    assert!(tracker.is_terminal());
}

#[tokio::test]
async fn poll_unknown_handle_is_not_found() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());

    let err = workflow
        .poll(&JobHandle::from_name("never-submitted"))
        .await
        .unwrap_err();

    assert_matches!(err, WorkflowError::NotFound(name) if name == "never-submitted");
}

#[tokio::test]
async fn describe_exposes_handle() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();

    let description = workflow.describe(&handle).await.unwrap();
    assert_eq!(description.handle.job_name, handle.job_name);
    assert_eq!(description.status, JobStatus::Pending);
}

// ---------------------------------------------------------------------------
// poll_until_terminal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watch_runs_to_completion() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();

    let outcome = poll_until_terminal(&workflow, &handle, &fast_config(), &CancellationToken::new())
        .await
        .unwrap();

    assert_matches!(outcome, WatchOutcome::Terminal(d) if d.status == JobStatus::Completed);
    assert_eq!(workflow.service().describe_count(), 4);
}

#[tokio::test]
async fn watch_reports_failed_job_as_terminal() {
    let service = ScriptedService::new(vec![JobStatus::InProgress, JobStatus::Failed]);
    let workflow = JobWorkflow::new(service);
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();

    let outcome = poll_until_terminal(&workflow, &handle, &fast_config(), &CancellationToken::new())
        .await
        .unwrap();

    assert_matches!(outcome, WatchOutcome::Terminal(d) if d.status == JobStatus::Failed);
}

#[tokio::test]
async fn watch_tolerates_brief_invisibility() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path().hidden_for(2));
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();

    let outcome = poll_until_terminal(&workflow, &handle, &fast_config(), &CancellationToken::new())
        .await
        .unwrap();

    assert_matches!(outcome, WatchOutcome::Terminal(_));
    assert_eq!(workflow.service().describe_count(), 6);
}

#[tokio::test]
async fn watch_surfaces_not_found_after_grace() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());
    let config = PollConfig {
        not_found_grace: 2,
        ..fast_config()
    };

    let err = poll_until_terminal(
        &workflow,
        &JobHandle::from_name("never-submitted"),
        &config,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_matches!(err, WorkflowError::NotFound(_));
    assert_eq!(workflow.service().describe_count(), 3);
}

#[tokio::test]
async fn watch_rejects_status_regression() {
    let service = ScriptedService::new(vec![
        JobStatus::InProgress,
        JobStatus::Pending,
        JobStatus::Completed,
    ]);
    let workflow = JobWorkflow::new(service);
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();

    let err = poll_until_terminal(&workflow, &handle, &fast_config(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_matches!(err, WorkflowError::Status(_));
}

#[tokio::test]
async fn watch_stops_when_cancelled() {
    let workflow = JobWorkflow::new(ScriptedService::new(vec![JobStatus::InProgress]));
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = poll_until_terminal(&workflow, &handle, &fast_config(), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, WatchOutcome::Cancelled { last: None });
    assert_eq!(workflow.service().describe_count(), 0);
}

#[tokio::test]
async fn cancel_interrupts_slow_status_query() {
    let service = ScriptedService::new(vec![JobStatus::InProgress]).slow(Duration::from_secs(30));
    let workflow = JobWorkflow::new(service);
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = poll_until_terminal(&workflow, &handle, &fast_config(), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, WatchOutcome::Cancelled { last: None });
    assert_eq!(workflow.service().describe_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn zero_interval_is_rejected_before_polling() {
    let workflow = JobWorkflow::new(ScriptedService::happy_path());
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();
    let config = PollConfig {
        initial_interval: Duration::ZERO,
        ..fast_config()
    };

    let err = poll_until_terminal(&workflow, &handle, &config, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_matches!(err, WorkflowError::Status(_));
    assert_eq!(workflow.service().describe_count(), 0);
}

#[tokio::test]
async fn watch_gives_up_after_max_polls() {
    let workflow = JobWorkflow::new(ScriptedService::new(vec![JobStatus::InProgress]));
    let handle = workflow.submit(&demo_spec("tfidf-featurize-1")).await.unwrap();
    let config = PollConfig {
        max_polls: Some(3),
        ..fast_config()
    };

    let outcome = poll_until_terminal(&workflow, &handle, &config, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WatchOutcome::GaveUp {
            last: Some(JobStatus::InProgress),
            polls: 3
        }
    );
}
