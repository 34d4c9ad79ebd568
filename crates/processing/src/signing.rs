//! AWS Signature Version 4 for processing API requests.
//!
//! The regional endpoint rejects unsigned calls. [`RequestSigner`] pulls
//! credentials from the standard provider chain on every request (the
//! chain caches and refreshes them) and returns the headers to attach.

use std::time::SystemTime;

use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;

/// Service name the endpoint expects in the credential scope.
pub const SIGNING_NAME: &str = "sagemaker";

/// Errors produced while signing a request.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// No credentials were configured or the provider failed.
    #[error("No AWS credentials available: {0}")]
    Credentials(String),

    /// The request could not be signed.
    #[error("Failed to sign request: {0}")]
    Sign(String),
}

/// Signs requests for one region with a shared credentials provider.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: SharedCredentialsProvider,
    region: String,
}

impl RequestSigner {
    pub fn new(credentials: SharedCredentialsProvider, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Signer backed by the default AWS provider chain (environment,
    /// profile, SSO, instance metadata) for `region`.
    pub async fn from_env(region: &str) -> Result<Self, SigningError> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        let credentials = config.credentials_provider().ok_or_else(|| {
            SigningError::Credentials("no credentials provider configured".into())
        })?;
        Ok(Self::new(credentials, region))
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Compute the signature headers (`authorization`, `x-amz-date` and,
    /// for temporary credentials, `x-amz-security-token`) for a request.
    ///
    /// `headers` must hold every header that is sent with the request
    /// and should be covered by the signature.
    pub async fn sign(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, SigningError> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| SigningError::Credentials(e.to_string()))?;
        let identity = credentials.into();

        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SIGNING_NAME)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| SigningError::Sign(e.to_string()))?
            .into();

        let signable = SignableRequest::new(
            method,
            uri,
            headers.iter().copied(),
            SignableBody::Bytes(body),
        )
        .map_err(|e| SigningError::Sign(e.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| SigningError::Sign(e.to_string()))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}
