//! One job in, one structured result out.
//!
//! `JobHandler` loads the named template, substitutes the caller's params,
//! submits the resolved graph to the engine, waits for the artifact and
//! reports where it ended up. Every failure becomes a `JobResult::Failure`;
//! nothing escapes as a panic or an `Err`.
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::Instrument;

use crate::comfyui::engine::{Engine, EngineStatus};
use crate::config::{CompletionMode, Config};
use crate::error::{AppError, AppResult};
use crate::job::{Job, JobResult};
use crate::output::adapter::adapt_outputs;
use crate::output::locator::{poll_until, split_prefix, OutputLocator, PollPolicy};
use crate::output::placement::Placement;
use crate::prompt::constructor::PromptConstructor;
use crate::utils::prompt_ops::{ensure_filename_prefix, is_probably_graph, save_image_prefix, unwrap_prompt_root};
use crate::workflow::store::WorkflowStore;

pub const FILENAME_PREFIX_PARAM: &str = "filename_prefix";

/// A template resolved for one job, ready to submit.
#[derive(Debug, Clone)]
pub struct ResolvedPrompt {
    pub graph: Value,
    pub filename_prefix: String,
}

pub struct JobHandler {
    store: WorkflowStore,
    constructor: PromptConstructor,
    engine: Arc<dyn Engine>,
    completion: CompletionMode,
    engine_output_dir: PathBuf,
    placement: Placement,
    policy: PollPolicy,
}

impl JobHandler {
    pub fn new(config: &Config, engine: Arc<dyn Engine>) -> Self {
        JobHandler {
            store: WorkflowStore::new(config.workflows_dir.clone()),
            constructor: PromptConstructor::new()
                .with_strategy(config.substitution)
                .with_aliases(config.param_aliases.clone()),
            engine,
            completion: config.completion_mode,
            engine_output_dir: config.engine_output_dir.clone(),
            placement: Placement::from_config(config.persistent_output_dir.as_deref()),
            policy: PollPolicy::new(config.poll_interval, config.output_timeout),
        }
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    pub async fn engine_healthy(&self) -> bool {
        self.engine.health().await
    }

    /// Validate a raw job document and run it.
    pub async fn handle(&self, raw: &Value) -> JobResult {
        match Job::from_value(raw) {
            Ok(job) => self.handle_job(job).await,
            Err(e) => {
                tracing::warn!("Rejected job input: {}", e);
                e.into()
            }
        }
    }

    pub async fn handle_job(&self, job: Job) -> JobResult {
        let span = tracing::info_span!("job", id = %job.id, workflow = %job.input.workflow_name);
        async {
            match self.run(&job).await {
                Ok(path) => {
                    tracing::info!(image_pod_path = %path, "Job finished");
                    JobResult::success(path)
                }
                Err(e) => {
                    tracing::error!("Job failed: {}", e);
                    e.into()
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Load and substitute a template without submitting it.
    pub async fn resolve(&self, job_id: &str, workflow_name: &str, params: &Map<String, Value>) -> AppResult<ResolvedPrompt> {
        let template = self.store.load(workflow_name).await?;

        let mut params = params.clone();
        let filename_prefix = match params.get(FILENAME_PREFIX_PARAM) {
            Some(Value::String(p)) => p.clone(),
            Some(other) => {
                return Err(AppError::Validation(vec![format!(
                    "'{}' must be a string, got {}",
                    FILENAME_PREFIX_PARAM,
                    AppError::json_kind(other)
                )]))
            }
            None => default_prefix(job_id),
        };
        split_prefix(&self.engine_output_dir, &filename_prefix)?;
        params.insert(FILENAME_PREFIX_PARAM.to_string(), Value::String(filename_prefix.clone()));

        let resolved = self.constructor.construct_prompt(&template.text, &params)?;
        let mut graph = unwrap_prompt_root(resolved);
        let touched = ensure_filename_prefix(&mut graph, &filename_prefix);
        if !is_probably_graph(&graph) {
            tracing::warn!("Resolved workflow '{}' has no nodes with class_type", workflow_name);
        }

        // A template may hard-code its own prefix; the artifact lands wherever
        // the submitted graph says.
        let filename_prefix = match save_image_prefix(&graph) {
            Some(submitted) if submitted != filename_prefix => {
                split_prefix(&self.engine_output_dir, submitted)?;
                tracing::debug!(template_prefix = submitted, "Template sets its own filename_prefix");
                submitted.to_string()
            }
            _ => filename_prefix,
        };
        tracing::debug!(save_nodes_prefixed = touched, filename_prefix = %filename_prefix, "Resolved prompt graph");

        Ok(ResolvedPrompt { graph, filename_prefix })
    }

    async fn run(&self, job: &Job) -> AppResult<String> {
        let resolved = self.resolve(&job.id, &job.input.workflow_name, &job.input.params).await?;

        let submission = self.engine.submit(&resolved.graph).await?;
        tracing::info!(prompt_id = %submission.prompt_id, response = %submission.raw, "Prompt accepted by engine");

        let artifact = match self.completion {
            CompletionMode::History => {
                let outputs = self.await_outputs(&submission.prompt_id).await?;
                adapt_outputs(&outputs, &self.engine_output_dir)?
            }
            CompletionMode::Filesystem => {
                OutputLocator::new(&self.engine_output_dir, self.policy)
                    .locate(&resolved.filename_prefix)
                    .await?
            }
        };

        self.placement.place(&artifact, &self.engine_output_dir).await
    }

    async fn await_outputs(&self, prompt_id: &str) -> AppResult<Value> {
        let engine = &self.engine;
        let location = format!("history of prompt {}", prompt_id);
        poll_until(self.policy, &location, move || async move {
            match engine.status(prompt_id).await? {
                EngineStatus::Pending => Ok(None),
                EngineStatus::Completed { outputs } => Ok(Some(outputs)),
                EngineStatus::Failed { message } => Err(AppError::EngineFailed(message)),
            }
        })
        .await
    }
}

/// `<id>/<id>` with anything outside `[A-Za-z0-9_-]` replaced.
fn default_prefix(job_id: &str) -> String {
    let safe: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}/{}", safe, safe)
}
