//! Common error type and result alias.
//!
//! Every failure a job can hit maps to one `AppError` variant. The handler
//! turns these into a structured [`JobFailure`](crate::job::JobFailure)
//! instead of letting them escape.
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid job input: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("workflow template '{}' was not found", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("workflow template '{}' is not valid JSON: {source}", .path.display())]
    TemplateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to prepare ComfyUI prompt: {0}")]
    PromptConstruction(String),

    #[error("ComfyUI rejected the prompt with status {status}")]
    SubmissionRejected { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("unexpected ComfyUI response: {0}")]
    ComfyUI(String),

    #[error("ComfyUI reported an execution error: {0}")]
    EngineFailed(String),

    #[error("no output appeared in {location} within {waited:?}")]
    OutputTimeout { waited: Duration, location: String },

    #[error("ComfyUI reported output '{}' but the file is missing on disk", .0.display())]
    OutputMissing(PathBuf),

    #[error("ComfyUI finished without producing an image")]
    NoImageProduced,

    #[error("unexpected engine result type: {kind}")]
    UnexpectedResult { kind: &'static str, raw: Value },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Name of a JSON value's type as used in `UnexpectedResult`.
    pub fn json_kind(v: &Value) -> &'static str {
        match v {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}
