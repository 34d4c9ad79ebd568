//! S3 access for staging inputs and inspecting job outputs.
//!
//! The job writes its splits directly; this module never copies them.
//! It uploads the featurization script (and optionally raw input) before
//! submission and lists the output prefixes afterwards.

use std::path::Path;

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use featurize_core::layout::{OutputLayout, S3Uri};
use serde::Serialize;

/// Errors from the object store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An S3 request failed.
    #[error("S3 request failed: {0}")]
    Request(String),

    /// A local file could not be read.
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },
}

/// One object under a listed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
}

/// Totals for one output split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitSummary {
    pub name: &'static str,
    pub location: S3Uri,
    pub objects: usize,
    pub total_bytes: i64,
}

impl SplitSummary {
    pub fn from_objects(name: &'static str, location: S3Uri, objects: &[ObjectSummary]) -> Self {
        Self {
            name,
            location,
            objects: objects.len(),
            total_bytes: objects.iter().map(|o| o.size).sum(),
        }
    }

    /// A split with no objects was not written by the job.
    pub fn is_empty(&self) -> bool {
        self.objects == 0
    }
}

/// Thin wrapper around an S3 client.
pub struct ObjectStore {
    client: aws_sdk_s3::Client,
}

impl ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from the standard AWS environment (credentials
    /// chain, profile, `AWS_REGION`), optionally overriding the region.
    pub async fn from_env(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_sdk_s3::config::Region::new(region.to_string()));
        }
        let config = loader.load().await;
        Self::new(aws_sdk_s3::Client::new(&config))
    }

    /// Upload a local file to `destination`.
    pub async fn upload_file(&self, path: &Path, destination: &S3Uri) -> Result<(), StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(destination.bucket())
            .key(destination.key())
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Request(DisplayErrorContext(&e).to_string()))?;

        tracing::info!(path = %path.display(), destination = %destination, "Uploaded file");
        Ok(())
    }

    /// List every object under `prefix`, following continuation tokens.
    pub async fn list(&self, prefix: &S3Uri) -> Result<Vec<ObjectSummary>, StorageError> {
        let key_prefix = list_prefix(prefix);
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(prefix.bucket())
                .prefix(&key_prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let page = request
                .send()
                .await
                .map_err(|e| StorageError::Request(DisplayErrorContext(&e).to_string()))?;

            objects.extend(page.contents().iter().filter_map(|object| {
                object.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default(),
                })
            }));

            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        tracing::debug!(prefix = %prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    /// List the train, validation and test prefixes of a run.
    pub async fn summarize_outputs(
        &self,
        layout: &OutputLayout,
    ) -> Result<Vec<SplitSummary>, StorageError> {
        let mut summaries = Vec::with_capacity(3);
        for (name, location) in layout.splits() {
            let objects = self.list(&location).await?;
            summaries.push(SplitSummary::from_objects(name, location, &objects));
        }
        Ok(summaries)
    }
}

/// Key prefix to list for `uri`. A trailing `/` keeps `tfidf-train`
/// from matching a sibling such as `tfidf-train-old`.
pub fn list_prefix(uri: &S3Uri) -> String {
    if uri.key().is_empty() {
        String::new()
    } else {
        format!("{}/", uri.key())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn list_prefix_adds_trailing_slash() {
        let uri = S3Uri::parse("s3://demo-bucket/run/output/tfidf-train").unwrap();
        assert_eq!(list_prefix(&uri), "run/output/tfidf-train/");
    }

    #[test]
    fn list_prefix_of_bucket_root_is_empty() {
        let uri = S3Uri::parse("s3://demo-bucket").unwrap();
        assert_eq!(list_prefix(&uri), "");
    }

    #[test]
    fn split_summary_totals() {
        let location = S3Uri::parse("s3://demo-bucket/run/output/tfidf-train").unwrap();
        let objects = vec![
            ObjectSummary { key: "run/output/tfidf-train/part-00000".into(), size: 100 },
            ObjectSummary { key: "run/output/tfidf-train/part-00001".into(), size: 250 },
        ];
        let summary = SplitSummary::from_objects("train", location, &objects);
        assert_eq!(summary.objects, 2);
        assert_eq!(summary.total_bytes, 350);
        assert!(!summary.is_empty());
    }

    #[test]
    fn empty_split_is_reported() {
        let location = S3Uri::parse("s3://demo-bucket/run/output/tfidf-test").unwrap();
        assert!(SplitSummary::from_objects("test", location, &[]).is_empty());
    }

    #[tokio::test]
    async fn missing_local_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();

        // The file read fails before any request is made.
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        let store = ObjectStore::new(aws_sdk_s3::Client::from_conf(config));

        let missing = dir.path().join("does-not-exist.py");
        let destination = S3Uri::parse("s3://demo-bucket/run/code/preprocess.py").unwrap();
        let err = store.upload_file(&missing, &destination).await.unwrap_err();
        assert_matches!(err, StorageError::Io { .. });
    }
}
