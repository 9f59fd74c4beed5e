//! ComfyUI job adapter library
//!
//! Turns a generic image job (`workflow_name` + flat `params`) into a ComfyUI
//! prompt graph, submits it and reports where the produced image landed.
//!
//! Modules:
//! - `job`: Job input validation and the `JobResult` wire shape.
//! - `handler`: `JobHandler`, which runs one job end to end.
//! - `workflow`: Loading named templates from the workflows directory.
//! - `prompt`: `__param:<key>__` substitution.
//! - `comfyui`: The `Engine` seam and the HTTP client for ComfyUI.
//! - `output`: Waiting for, resolving and placing output artifacts.
//! - `api`: Axum HTTP handlers and router used by the service binary.
//! - `utils`: Small prompt graph helpers.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
pub mod api;
pub mod comfyui;
pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod output;
pub mod prompt;
pub mod utils;
pub mod workflow;

pub use comfyui::client::ComfyUIClient;
pub use comfyui::engine::{Engine, EngineStatus, Submission};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use handler::JobHandler;
pub use job::{Job, JobResult};
pub use prompt::constructor::PromptConstructor;
pub use workflow::store::WorkflowStore;
