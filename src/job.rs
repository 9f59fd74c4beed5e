//! Job input as delivered by the hosting queue, and the structured result
//! handed back for every invocation.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub input: JobInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub workflow_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Job {
    /// Validate a raw job document, collecting every problem rather than
    /// stopping at the first one.
    pub fn from_value(raw: &Value) -> AppResult<Job> {
        let mut errors = Vec::new();

        let id = match raw.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::String(_)) => {
                errors.push("'id' must not be empty".to_string());
                None
            }
            Some(_) => {
                errors.push("'id' must be a string".to_string());
                None
            }
            None => {
                errors.push("'id' is required".to_string());
                None
            }
        };

        let (workflow_name, params) = match raw.get("input") {
            Some(Value::Object(input)) => (read_workflow_name(input, &mut errors), read_params(input, &mut errors)),
            Some(_) => {
                errors.push("'input' must be an object".to_string());
                (None, None)
            }
            None => {
                errors.push("'input' is required".to_string());
                (None, None)
            }
        };

        match (id, workflow_name, params) {
            (Some(id), Some(workflow_name), Some(params)) if errors.is_empty() => Ok(Job {
                id,
                input: JobInput { workflow_name, params },
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

fn read_workflow_name(input: &Map<String, Value>, errors: &mut Vec<String>) -> Option<String> {
    match input.get("workflow_name") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            errors.push("'workflow_name' must not be empty".to_string());
            None
        }
        Some(_) => {
            errors.push("'workflow_name' must be a string".to_string());
            None
        }
        None => {
            errors.push("'workflow_name' is required".to_string());
            None
        }
    }
}

fn read_params(input: &Map<String, Value>, errors: &mut Vec<String>) -> Option<Map<String, Value>> {
    match input.get("params") {
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            errors.push("'params' must be an object".to_string());
            None
        }
        None => {
            errors.push("'params' is required".to_string());
            None
        }
    }
}

/// Exactly one of these is produced per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Success { image_pod_path: String },
    Failure(JobFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
}

impl JobResult {
    pub fn success(path: impl Into<String>) -> Self {
        JobResult::Success { image_pod_path: path.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }
}

impl From<AppError> for JobFailure {
    fn from(err: AppError) -> Self {
        let error = err.to_string();
        match err {
            AppError::SubmissionRejected { status, body } => JobFailure {
                error,
                status_code: Some(status),
                details: Some(body),
                raw_output: None,
            },
            AppError::UnexpectedResult { raw, .. } => JobFailure {
                error,
                status_code: None,
                details: None,
                raw_output: Some(raw),
            },
            _ => JobFailure { error, status_code: None, details: None, raw_output: None },
        }
    }
}

impl From<AppError> for JobResult {
    fn from(err: AppError) -> Self {
        JobResult::Failure(err.into())
    }
}
