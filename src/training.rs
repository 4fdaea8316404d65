//! Declaration of the external training job that produces model artifacts.
//!
//! The service never trains or submits anything. This module only validates
//! the job declared in configuration and renders it as a JSON document that
//! deployment tooling can hand to the managed training service.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Managed training job as declared in the `[training]` config section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingJobSpec {
    /// Training script run by the managed framework container
    pub entry_point: String,
    /// Execution role the job assumes
    pub role: String,
    /// Number of training instances
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    /// Compute instance shape
    pub instance_type: String,
    /// Framework container version
    pub framework_version: String,
    /// Input channels: channel name -> data URI
    pub inputs: BTreeMap<String, String>,
    /// Where the produced artifact should be written
    #[serde(default)]
    pub output_path: Option<String>,
    /// Prefix for generated job names
    #[serde(default = "default_job_name_prefix")]
    pub job_name_prefix: String,
}

fn default_instance_count() -> u32 {
    1
}

fn default_job_name_prefix() -> String {
    "predict-model".to_string()
}

/// Rendered job document
#[derive(Debug, Clone, Serialize)]
pub struct TrainingJobDocument {
    pub job_name: String,
    pub entry_point: String,
    pub role: String,
    pub resources: ResourceSpec,
    pub framework_version: String,
    pub input_channels: Vec<InputChannel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceSpec {
    pub instance_count: u32,
    pub instance_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputChannel {
    pub name: String,
    pub uri: String,
}

impl TrainingJobSpec {
    /// Check the declaration is complete enough to submit
    pub fn validate(&self) -> Result<()> {
        if self.entry_point.trim().is_empty() {
            bail!("training.entry_point must not be empty");
        }
        if self.role.trim().is_empty() {
            bail!("training.role must not be empty");
        }
        if self.instance_type.trim().is_empty() {
            bail!("training.instance_type must not be empty");
        }
        if self.instance_count == 0 {
            bail!("training.instance_count must be at least 1");
        }
        if self.inputs.is_empty() {
            bail!("training.inputs must declare at least one channel");
        }
        for (channel, uri) in &self.inputs {
            if !is_data_uri(uri) {
                bail!(
                    "training input '{}' must be an s3:// or https:// URI, got '{}'",
                    channel,
                    uri
                );
            }
        }
        if let Some(output) = &self.output_path {
            if !is_data_uri(output) {
                bail!("training.output_path must be an s3:// or https:// URI, got '{}'", output);
            }
        }
        Ok(())
    }

    /// Job name unique to the second, e.g. `predict-model-2026-10-18-12-00-00`
    pub fn job_name(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}", self.job_name_prefix, at.format("%Y-%m-%d-%H-%M-%S"))
    }

    /// Validate and render the job document
    pub fn render(&self, at: DateTime<Utc>) -> Result<TrainingJobDocument> {
        self.validate()?;

        Ok(TrainingJobDocument {
            job_name: self.job_name(at),
            entry_point: self.entry_point.clone(),
            role: self.role.clone(),
            resources: ResourceSpec {
                instance_count: self.instance_count,
                instance_type: self.instance_type.clone(),
            },
            framework_version: self.framework_version.clone(),
            input_channels: self
                .inputs
                .iter()
                .map(|(name, uri)| InputChannel {
                    name: name.clone(),
                    uri: uri.clone(),
                })
                .collect(),
            output_path: self.output_path.clone(),
            created_at: at,
        })
    }
}

fn is_data_uri(uri: &str) -> bool {
    uri.strip_prefix("s3://")
        .or_else(|| uri.strip_prefix("https://"))
        .is_some_and(|rest| !rest.is_empty())
}
