#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use featurize_core::image::ImageRef;
use featurize_core::job::{ComputeSizing, InputDeclaration, JobSpec, OutputDeclaration};
use featurize_core::layout::OutputLayout;
use featurize_core::script_args::FeaturizeArgs;
use featurize_core::status::JobStatus;
use featurize_core::types::JobHandle;
use featurize_processing::service::{JobDescription, ProcessingService, ServiceError};
use featurize_processing::signing::RequestSigner;
use serde_json::{json, Value};

pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/ProcessingRole";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn demo_layout() -> OutputLayout {
    OutputLayout::new("demo-bucket", "run-2024-01-01-00-00-00").unwrap()
}

/// A valid two-instance featurization spec named `job_name`.
pub fn demo_spec(job_name: &str) -> JobSpec {
    let layout = demo_layout();
    JobSpec::builder(job_name)
        .image(ImageRef::ecr("123456789012", "us-east-1", "featurize-tfidf", "latest").unwrap())
        .entrypoint(["smspark-submit"])
        .role_arn(ROLE_ARN)
        .compute(ComputeSizing::new(2, "ml.r5.xlarge"))
        .script_path("/opt/ml/processing/input/code/preprocess.py")
        .arguments(FeaturizeArgs::for_layout(&layout).to_args().unwrap())
        .input(InputDeclaration::code(layout.code()))
        .ensure_platform_output(OutputDeclaration::placeholder(&layout))
        .build()
        .unwrap()
}

/// Signer with fixed, fake credentials for `us-east-1`.
pub fn static_signer() -> RequestSigner {
    let credentials = Credentials::new(
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        None,
        None,
        "static",
    );
    RequestSigner::new(SharedCredentialsProvider::new(credentials), "us-east-1")
}

// ---------------------------------------------------------------------------
// ScriptedService
// ---------------------------------------------------------------------------

/// In-process service whose jobs walk through a fixed status script.
///
/// Each describe call pops the next status; the last one sticks.
pub struct ScriptedService {
    script: Vec<JobStatus>,
    jobs: Mutex<HashMap<String, VecDeque<JobStatus>>>,
    /// Jobs that answer `NotFound` for this many describes after submission.
    hidden_for: usize,
    hidden: Mutex<HashMap<String, usize>>,
    reject_submissions: bool,
    /// Delay before every describe answers.
    describe_delay: Option<Duration>,
    pub submitted: Mutex<Vec<JobSpec>>,
    pub describe_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new(script: Vec<JobStatus>) -> Self {
        Self {
            script,
            jobs: Mutex::new(HashMap::new()),
            hidden_for: 0,
            hidden: Mutex::new(HashMap::new()),
            reject_submissions: false,
            describe_delay: None,
            submitted: Mutex::new(Vec::new()),
            describe_calls: AtomicUsize::new(0),
        }
    }

    /// Pending, InProgress twice, then Completed.
    pub fn happy_path() -> Self {
        Self::new(vec![
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::InProgress,
            JobStatus::Completed,
        ])
    }

    pub fn hidden_for(mut self, polls: usize) -> Self {
        self.hidden_for = polls;
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.reject_submissions = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.describe_delay = Some(delay);
        self
    }

    pub fn describe_count(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessingService for ScriptedService {
    async fn create_job(&self, spec: &JobSpec) -> Result<JobHandle, ServiceError> {
        if self.reject_submissions {
            return Err(ServiceError::Rejected(
                "role is not authorized to pull the image".into(),
            ));
        }
        let name = spec.job_name().to_string();
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&name) {
            return Err(ServiceError::Rejected(format!("job {name} already exists")));
        }
        jobs.insert(name.clone(), self.script.iter().copied().collect());
        self.hidden.lock().unwrap().insert(name.clone(), self.hidden_for);
        self.submitted.lock().unwrap().push(spec.clone());
        Ok(JobHandle::from_name(&name)
            .with_arn(format!("arn:aws:sagemaker:us-east-1:123456789012:processing-job/{name}")))
    }

    async fn describe_job(&self, job_name: &str) -> Result<JobDescription, ServiceError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.describe_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(remaining) = self.hidden.lock().unwrap().get_mut(job_name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ServiceError::NotFound(job_name.to_string()));
            }
        }

        let mut jobs = self.jobs.lock().unwrap();
        let queue = jobs
            .get_mut(job_name)
            .ok_or_else(|| ServiceError::NotFound(job_name.to_string()))?;
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        }
        .ok_or_else(|| ServiceError::Protocol("empty status script".into()))?;

        Ok(JobDescription::new(JobHandle::from_name(job_name), status))
    }
}

// ---------------------------------------------------------------------------
// Fake HTTP endpoint
// ---------------------------------------------------------------------------

/// Requests seen by the fake endpoint and the jobs it knows about.
#[derive(Default)]
pub struct FakeEndpoint {
    pub jobs: Mutex<HashMap<String, Value>>,
    pub targets: Mutex<Vec<String>>,
    pub content_types: Mutex<Vec<String>>,
    pub authorizations: Mutex<Vec<String>>,
}

/// Serve a minimal JSON-1.1 processing endpoint on an ephemeral port.
///
/// Returns the base URL and the shared state for assertions.
pub async fn spawn_fake_endpoint() -> (String, Arc<FakeEndpoint>) {
    let state = Arc::new(FakeEndpoint::default());
    let app = Router::new()
        .route("/", post(handle_action))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

async fn handle_action(
    State(state): State<Arc<FakeEndpoint>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let target = header("x-amz-target");
    state.targets.lock().unwrap().push(target.clone());
    state.content_types.lock().unwrap().push(header("content-type"));
    state.authorizations.lock().unwrap().push(header("authorization"));

    let request: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => return error(StatusCode::BAD_REQUEST, "SerializationException", &e.to_string()),
    };
    let name = request["ProcessingJobName"].as_str().unwrap_or_default().to_string();

    match target.as_str() {
        "SageMaker.CreateProcessingJob" => {
            let mut jobs = state.jobs.lock().unwrap();
            if jobs.contains_key(&name) {
                return error(
                    StatusCode::BAD_REQUEST,
                    "ResourceInUse",
                    &format!("Job {name} already exists"),
                );
            }
            jobs.insert(name.clone(), request);
            let arn = format!("arn:aws:sagemaker:us-east-1:123456789012:processing-job/{name}");
            (StatusCode::OK, json!({ "ProcessingJobArn": arn }).to_string())
        }
        "SageMaker.DescribeProcessingJob" => {
            if !state.jobs.lock().unwrap().contains_key(&name) {
                return error(
                    StatusCode::BAD_REQUEST,
                    "ValidationException",
                    &format!("Could not find requested job with name {name}"),
                );
            }
            let body = json!({
                "ProcessingJobName": name,
                "ProcessingJobArn": format!("arn:aws:sagemaker:us-east-1:123456789012:processing-job/{name}"),
                "ProcessingJobStatus": "InProgress",
                "CreationTime": 1_704_067_200.0,
                "ProcessingStartTime": 1_704_067_260.0,
            });
            (StatusCode::OK, body.to_string())
        }
        other => error(
            StatusCode::BAD_REQUEST,
            "UnknownOperationException",
            &format!("Unknown target {other}"),
        ),
    }
}

fn error(status: StatusCode, code: &str, message: &str) -> (StatusCode, String) {
    (
        status,
        json!({ "__type": format!("com.amazonaws.sagemaker#{code}"), "message": message }).to_string(),
    )
}
