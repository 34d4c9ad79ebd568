//! JSON bodies exchanged with the execution service.
//!
//! Field names follow the service's PascalCase wire format.

use std::collections::BTreeMap;

use featurize_core::job::JobSpec;
use serde::{Deserialize, Serialize};

/// `S3DataType` for every input: download everything under the prefix.
pub const S3_DATA_TYPE_PREFIX: &str = "S3Prefix";

/// `S3InputMode` for every input: copy to local disk before start.
pub const S3_INPUT_MODE_FILE: &str = "File";

// ---------------------------------------------------------------------------
// CreateProcessingJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateProcessingJobRequest {
    pub processing_job_name: String,
    pub role_arn: String,
    pub app_specification: AppSpecification,
    pub processing_resources: ProcessingResources,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processing_inputs: Vec<ProcessingInput>,
    pub processing_output_config: ProcessingOutputConfig,
    pub stopping_condition: StoppingCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppSpecification {
    pub image_uri: String,
    pub container_entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessingResources {
    pub cluster_config: ClusterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterConfig {
    pub instance_count: u32,
    pub instance_type: String,
    #[serde(rename = "VolumeSizeInGB")]
    pub volume_size_in_gb: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessingInput {
    pub input_name: String,
    pub s3_input: S3Input,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Input {
    pub s3_uri: String,
    pub local_path: String,
    pub s3_data_type: String,
    pub s3_input_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessingOutputConfig {
    pub outputs: Vec<ProcessingOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessingOutput {
    pub output_name: String,
    pub s3_output: S3Output,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Output {
    pub s3_uri: String,
    pub local_path: String,
    pub s3_upload_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoppingCondition {
    pub max_runtime_in_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateProcessingJobResponse {
    pub processing_job_arn: String,
}

impl From<&JobSpec> for CreateProcessingJobRequest {
    fn from(spec: &JobSpec) -> Self {
        let compute = spec.compute();
        Self {
            processing_job_name: spec.job_name().to_string(),
            role_arn: spec.role_arn().to_string(),
            app_specification: AppSpecification {
                image_uri: spec.image().uri(),
                container_entrypoint: spec.container_entrypoint(),
                container_arguments: spec.arguments().to_vec(),
            },
            processing_resources: ProcessingResources {
                cluster_config: ClusterConfig {
                    instance_count: compute.instance_count,
                    instance_type: compute.instance_type.clone(),
                    volume_size_in_gb: compute.volume_size_gb,
                },
            },
            environment: spec.environment().clone(),
            processing_inputs: spec
                .inputs()
                .iter()
                .map(|input| ProcessingInput {
                    input_name: input.name.clone(),
                    s3_input: S3Input {
                        s3_uri: input.source.to_string(),
                        local_path: input.destination.clone(),
                        s3_data_type: S3_DATA_TYPE_PREFIX.to_string(),
                        s3_input_mode: S3_INPUT_MODE_FILE.to_string(),
                    },
                })
                .collect(),
            processing_output_config: ProcessingOutputConfig {
                outputs: spec
                    .outputs()
                    .iter()
                    .map(|output| ProcessingOutput {
                        output_name: output.name.clone(),
                        s3_output: S3Output {
                            s3_uri: output.destination.to_string(),
                            local_path: output.source.clone(),
                            s3_upload_mode: output.upload_mode.as_service_str().to_string(),
                        },
                    })
                    .collect(),
            },
            stopping_condition: StoppingCondition {
                max_runtime_in_seconds: spec.max_runtime_secs(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// DescribeProcessingJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeProcessingJobRequest {
    pub processing_job_name: String,
}

/// The subset of the job record the workflow reads. Times are epoch
/// seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeProcessingJobResponse {
    pub processing_job_name: String,
    pub processing_job_arn: Option<String>,
    pub processing_job_status: String,
    pub failure_reason: Option<String>,
    pub exit_message: Option<String>,
    pub creation_time: Option<f64>,
    pub processing_start_time: Option<f64>,
    pub processing_end_time: Option<f64>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "__type")]
    pub error_type: Option<String>,
    #[serde(alias = "Message")]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Error code without the namespace, e.g. `ValidationException`
    /// from `com.amazonaws.sagemaker#ValidationException`.
    pub fn code(&self) -> Option<&str> {
        self.error_type
            .as_deref()
            .map(|t| t.rsplit('#').next().unwrap_or(t))
    }
}
