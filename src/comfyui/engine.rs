//! Engine seam: anything that can accept a resolved prompt graph and report
//! when it is done. [`ComfyUIClient`](super::client::ComfyUIClient) talks to a
//! ComfyUI server; tests and embedders can plug in their own implementation.
use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppResult;

/// Accepted submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub prompt_id: String,
    /// Engine response body, kept for logging.
    pub raw: Value,
}

/// Where a submitted prompt stands. `Completed` is the terminal success event;
/// callers never infer completion from the last of a stream of partial results.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    Pending,
    Completed { outputs: Value },
    Failed { message: String },
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Submit a resolved prompt graph. Never retried by callers.
    async fn submit(&self, prompt: &Value) -> AppResult<Submission>;

    /// Current status of a previously submitted prompt.
    async fn status(&self, prompt_id: &str) -> AppResult<EngineStatus>;

    /// Whether the engine is reachable. In-process engines are always up.
    async fn health(&self) -> bool {
        true
    }
}
