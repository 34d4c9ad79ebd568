//! S3 locations and the per-run output layout.
//!
//! Every run writes under a single `s3://{bucket}/{prefix}/` root. The
//! featurization script writes the three splits directly; this module
//! only derives where they land so the workflow can pass them to the
//! script and inspect them afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const S3_SCHEME: &str = "s3://";

/// Sub-prefix under the run root holding everything the job writes.
pub const OUTPUT_DIR: &str = "output";

/// Sub-prefix under the run root holding the raw review input.
pub const INPUT_DIR: &str = "input/raw";

/// Sub-prefix under the run root holding the staged featurization script.
pub const CODE_DIR: &str = "code";

pub const TRAIN_SUFFIX: &str = "tfidf-train";
pub const VALIDATION_SUFFIX: &str = "tfidf-validation";
pub const TEST_SUFFIX: &str = "tfidf-test";

/// Destination of the output declaration that only exists to satisfy
/// the service's minimum of one declared output.
pub const PLACEHOLDER_SUFFIX: &str = "platform-placeholder";

// ---------------------------------------------------------------------------
// S3Uri
// ---------------------------------------------------------------------------

/// A parsed `s3://bucket/key` location. The key never has a leading
/// or trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S3Uri {
    bucket: String,
    key: String,
}

impl S3Uri {
    /// Build a location from its parts, validating the bucket name.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, CoreError> {
        let bucket = bucket.into();
        validate_bucket_name(&bucket)?;
        let key = normalize_key(&key.into())?;
        Ok(Self { bucket, key })
    }

    /// Parse an `s3://bucket/key` string.
    pub fn parse(uri: &str) -> Result<Self, CoreError> {
        let rest = uri.strip_prefix(S3_SCHEME).ok_or_else(|| {
            CoreError::Validation(format!("S3 URI '{uri}' must start with '{S3_SCHEME}'"))
        })?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        Self::new(bucket, key)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append one or more `/`-separated segments to the key.
    pub fn join(&self, segment: &str) -> Result<Self, CoreError> {
        let segment = normalize_key(segment)?;
        let key = match (self.key.is_empty(), segment.is_empty()) {
            (true, _) => segment,
            (false, true) => self.key.clone(),
            (false, false) => format!("{}/{}", self.key, segment),
        };
        Ok(Self {
            bucket: self.bucket.clone(),
            key,
        })
    }

    /// Whether `self` is `other` or lies underneath it.
    pub fn is_within(&self, other: &S3Uri) -> bool {
        if self.bucket != other.bucket {
            return false;
        }
        other.key.is_empty()
            || self.key == other.key
            || self
                .key
                .strip_prefix(other.key.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{S3_SCHEME}{}/{}", self.bucket, self.key)
    }
}

impl FromStr for S3Uri {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Bucket naming rules: 3-63 chars of lowercase letters, digits, `.`
/// and `-`, starting and ending with a letter or digit.
pub fn validate_bucket_name(bucket: &str) -> Result<(), CoreError> {
    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    let valid_ends = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if (3..=63).contains(&bucket.len()) && valid_chars && valid_ends {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid S3 bucket name '{bucket}'"
        )))
    }
}

/// Trim surrounding slashes and reject empty path segments.
fn normalize_key(key: &str) -> Result<String, CoreError> {
    let trimmed = key.trim_matches('/');
    if trimmed.split('/').any(|segment| segment.is_empty()) && !trimmed.is_empty() {
        return Err(CoreError::Validation(format!(
            "S3 key '{key}' contains an empty path segment"
        )));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Overlap checks
// ---------------------------------------------------------------------------

/// Whether writing to one location could clobber the other.
pub fn paths_overlap(a: &S3Uri, b: &S3Uri) -> bool {
    a.is_within(b) || b.is_within(a)
}

/// Ensure no two locations in `paths` overlap.
pub fn validate_disjoint(paths: &[S3Uri]) -> Result<(), CoreError> {
    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            if paths_overlap(a, b) {
                return Err(CoreError::Validation(format!(
                    "Output locations overlap: {a} and {b}"
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// OutputLayout
// ---------------------------------------------------------------------------

/// All locations used by one featurization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: S3Uri,
}

impl OutputLayout {
    /// Layout rooted at `s3://{bucket}/{prefix}/`.
    pub fn new(bucket: &str, prefix: &str) -> Result<Self, CoreError> {
        let root = S3Uri::new(bucket, prefix)?;
        if root.key().is_empty() {
            return Err(CoreError::Validation(
                "Output prefix must not be empty".into(),
            ));
        }
        Ok(Self { root })
    }

    pub fn bucket(&self) -> &str {
        self.root.bucket()
    }

    /// The run prefix, without surrounding slashes.
    pub fn prefix(&self) -> &str {
        self.root.key()
    }

    pub fn root(&self) -> &S3Uri {
        &self.root
    }

    /// `s3://{bucket}/{prefix}/output`, the common parent of every split.
    pub fn output_root(&self) -> S3Uri {
        self.child(OUTPUT_DIR)
    }

    pub fn input(&self) -> S3Uri {
        self.child(INPUT_DIR)
    }

    pub fn code(&self) -> S3Uri {
        self.child(CODE_DIR)
    }

    pub fn train(&self) -> S3Uri {
        self.output(TRAIN_SUFFIX)
    }

    pub fn validation(&self) -> S3Uri {
        self.output(VALIDATION_SUFFIX)
    }

    pub fn test(&self) -> S3Uri {
        self.output(TEST_SUFFIX)
    }

    pub fn placeholder(&self) -> S3Uri {
        self.output(PLACEHOLDER_SUFFIX)
    }

    /// The three featurized splits, labelled.
    pub fn splits(&self) -> [(&'static str, S3Uri); 3] {
        [
            ("train", self.train()),
            ("validation", self.validation()),
            ("test", self.test()),
        ]
    }

    fn output(&self, suffix: &str) -> S3Uri {
        self.child(&format!("{OUTPUT_DIR}/{suffix}"))
    }

    // Segments are compile-time constants with no empty parts, so the
    // join cannot fail.
    fn child(&self, segment: &str) -> S3Uri {
        S3Uri {
            bucket: self.root.bucket.clone(),
            key: format!("{}/{}", self.root.key, segment),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
