//! Container image references of the form
//! `{account}.{registry-host}/{repository}:{tag}`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const DEFAULT_TAG: &str = "latest";

static REPOSITORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$")
        .expect("valid regex")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid regex"));

/// A pushed (or to-be-pushed) image in an account-scoped registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    account: String,
    registry_host: String,
    repository: String,
    tag: String,
}

impl ImageRef {
    pub fn new(
        account: impl Into<String>,
        registry_host: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let image = Self {
            account: account.into(),
            registry_host: registry_host.into(),
            repository: repository.into(),
            tag: tag.into(),
        };
        image.validate()?;
        Ok(image)
    }

    /// Image in the regional ECR registry of `account`.
    pub fn ecr(
        account: impl Into<String>,
        region: &str,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, CoreError> {
        Self::new(account, ecr_host(region), repository, tag)
    }

    /// Parse a full image URI. A missing tag defaults to [`DEFAULT_TAG`].
    pub fn parse(uri: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::Validation(format!("Invalid image URI '{uri}'"));

        let (registry, path) = uri.split_once('/').ok_or_else(invalid)?;
        let (account, registry_host) = registry.split_once('.').ok_or_else(invalid)?;
        let (repository, tag) = match path.rsplit_once(':') {
            Some((repository, tag)) => (repository, tag),
            None => (path, DEFAULT_TAG),
        };

        Self::new(account, registry_host, repository, tag)
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Registry endpoint used for login: `{account}.{registry-host}`.
    pub fn registry(&self) -> String {
        format!("{}.{}", self.account, self.registry_host)
    }

    /// Fully-qualified image URI.
    pub fn uri(&self) -> String {
        format!("{}/{}:{}", self.registry(), self.repository, self.tag)
    }

    /// Same image under a different tag.
    pub fn with_tag(&self, tag: impl Into<String>) -> Result<Self, CoreError> {
        Self::new(
            self.account.clone(),
            self.registry_host.clone(),
            self.repository.clone(),
            tag,
        )
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.account.is_empty() || !self.account.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::Validation(format!(
                "Invalid registry account '{}'",
                self.account
            )));
        }
        if self.registry_host.is_empty() || self.registry_host.contains('/') {
            return Err(CoreError::Validation(format!(
                "Invalid registry host '{}'",
                self.registry_host
            )));
        }
        if self.repository.len() > 256 || !REPOSITORY_RE.is_match(&self.repository) {
            return Err(CoreError::Validation(format!(
                "Invalid repository name '{}'",
                self.repository
            )));
        }
        if !TAG_RE.is_match(&self.tag) {
            return Err(CoreError::Validation(format!(
                "Invalid image tag '{}'",
                self.tag
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Registry host of the ECR registry in `region`.
pub fn ecr_host(region: &str) -> String {
    format!("dkr.ecr.{region}.amazonaws.com")
}
