//! REST API client for the job-execution service.
//!
//! Wraps the service's JSON-1.1 endpoint (processing job creation and
//! description) using [`reqwest`]. Each operation is a single `POST` to
//! the endpoint root with the action named in the `X-Amz-Target`
//! header. Requests are SigV4-signed when a [`RequestSigner`] is set,
//! which the regional endpoint requires.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::signing::{RequestSigner, SigningError};

use crate::wire::{
    CreateProcessingJobRequest, CreateProcessingJobResponse, DescribeProcessingJobRequest,
    DescribeProcessingJobResponse, ErrorBody,
};

/// Content type of every request body.
pub const CONTENT_TYPE_AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Header naming the action to invoke.
pub const TARGET_HEADER: &str = "X-Amz-Target";

pub const TARGET_CREATE_PROCESSING_JOB: &str = "SageMaker.CreateProcessingJob";

pub const TARGET_DESCRIBE_PROCESSING_JOB: &str = "SageMaker.DescribeProcessingJob";

/// Timeout for a single API request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default regional endpoint.
pub fn default_endpoint(region: &str) -> String {
    format!("https://api.sagemaker.{region}.amazonaws.com")
}

/// HTTP client for one execution service endpoint.
pub struct ProcessingApi {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    signer: Option<RequestSigner>,
}

/// Errors from the execution service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The request body could not be encoded.
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The service returned a non-2xx status code.
    #[error("Processing API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Service error code, e.g. `ValidationException`.
        code: Option<String>,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service has no record of the named job.
    #[error("Processing job '{0}' not found")]
    NotFound(String),

    /// The request could not be signed; nothing was sent.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl ProcessingApi {
    /// Create a new API client.
    ///
    /// * `endpoint` - Base URL, e.g. `https://api.sagemaker.us-east-1.amazonaws.com`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self::with_client(client, endpoint)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: None,
            signer: None,
        }
    }

    /// Send `Authorization: Bearer {token}` with every request, for
    /// endpoints fronted by an authenticating gateway. Takes precedence
    /// over a signer.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// SigV4-sign every request.
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit a processing job. Returns as soon as the service has
    /// accepted the request.
    pub async fn create_processing_job(
        &self,
        request: &CreateProcessingJobRequest,
    ) -> Result<CreateProcessingJobResponse, ProcessingApiError> {
        self.call(TARGET_CREATE_PROCESSING_JOB, request, None).await
    }

    /// Fetch the current record of a processing job.
    pub async fn describe_processing_job(
        &self,
        job_name: &str,
    ) -> Result<DescribeProcessingJobResponse, ProcessingApiError> {
        let request = DescribeProcessingJobRequest {
            processing_job_name: job_name.to_string(),
        };
        self.call(TARGET_DESCRIBE_PROCESSING_JOB, &request, Some(job_name))
            .await
    }

    // ---- private helpers ----

    /// POST `body` for `target` and decode the JSON response.
    ///
    /// `job_name` is set for lookups so that a missing job can be
    /// reported as [`ProcessingApiError::NotFound`].
    async fn call<Req, Resp>(
        &self,
        target: &str,
        body: &Req,
        job_name: Option<&str>,
    ) -> Result<Resp, ProcessingApiError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let url = format!("{}/", self.endpoint);

        let mut request = self
            .client
            .post(&url)
            .header(TARGET_HEADER, target)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_AMZ_JSON);
        match (&self.token, &self.signer) {
            (Some(token), _) => request = request.bearer_auth(token),
            (None, Some(signer)) => {
                let signed = signer
                    .sign(
                        "POST",
                        &url,
                        &[
                            ("content-type", CONTENT_TYPE_AMZ_JSON),
                            ("x-amz-target", target),
                        ],
                        &payload,
                    )
                    .await?;
                for (name, value) in signed {
                    request = request.header(name, value);
                }
            }
            (None, None) => {}
        }
        let request = request.body(payload);

        tracing::debug!(target_action = target, endpoint = %self.endpoint, "Calling processing API");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(classify_error(status.as_u16(), body, job_name));
        }

        Ok(response.json::<Resp>().await?)
    }
}

/// Turn a non-2xx response into an error.
///
/// A lookup that fails with 404, or with a validation error whose
/// message says the job could not be found, is a
/// [`ProcessingApiError::NotFound`].
pub fn classify_error(status: u16, body: String, job_name: Option<&str>) -> ProcessingApiError {
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let code = parsed.code().map(str::to_string);

    if let Some(job_name) = job_name {
        let message = parsed.message.as_deref().unwrap_or_default().to_ascii_lowercase();
        let missing = status == 404
            || code.as_deref() == Some("ResourceNotFound")
            || (status == 400 && (message.contains("could not find") || message.contains("not found")));
        if missing {
            return ProcessingApiError::NotFound(job_name.to_string());
        }
    }

    ProcessingApiError::ApiError { status, code, body }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn default_endpoint_is_regional() {
        assert_eq!(
            default_endpoint("eu-west-1"),
            "https://api.sagemaker.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn endpoint_trailing_slash_trimmed() {
        let api = ProcessingApi::new("http://localhost:9000/");
        assert_eq!(api.endpoint(), "http://localhost:9000");
    }

    #[test]
    fn missing_job_message_is_not_found() {
        let body = r#"{"__type":"ValidationException","message":"Could not find requested job with name job-1"}"#;
        let err = classify_error(400, body.to_string(), Some("job-1"));
        assert_matches!(err, ProcessingApiError::NotFound(name) if name == "job-1");
    }

    #[test]
    fn http_404_is_not_found_for_lookups() {
        let err = classify_error(404, String::new(), Some("job-1"));
        assert_matches!(err, ProcessingApiError::NotFound(_));
    }

    #[test]
    fn other_validation_errors_pass_through() {
        let body = r#"{"__type":"ValidationException","message":"Role is not authorized"}"#;
        let err = classify_error(400, body.to_string(), Some("job-1"));
        assert_matches!(
            err,
            ProcessingApiError::ApiError { status: 400, code: Some(code), .. } if code == "ValidationException"
        );
    }

    #[test]
    fn submissions_never_report_not_found() {
        let body = r#"{"__type":"ValidationException","message":"Could not find image"}"#;
        let err = classify_error(400, body.to_string(), None);
        assert_matches!(err, ProcessingApiError::ApiError { status: 400, .. });
    }

    #[test]
    fn unparseable_body_kept_verbatim() {
        let err = classify_error(500, "upstream exploded".to_string(), Some("job-1"));
        assert_matches!(
            err,
            ProcessingApiError::ApiError { status: 500, code: None, body } if body == "upstream exploded"
        );
    }
}
