//! Shared fixtures: an in-process engine and a config pointing at temp dirs.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use comfyui_job_adapter::config::{CompletionMode, Substitution};
use comfyui_job_adapter::{AppResult, Config, Engine, EngineStatus, Submission};
use serde_json::{json, Value};

pub const TXT2IMG: &str = r#"{
    "3": { "class_type": "KSampler", "inputs": { "seed": "__param:seed__", "steps": "__param:steps__", "cfg": 7 } },
    "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "__param:prompt__" } },
    "9": { "class_type": "SaveImage", "inputs": { "images": ["8", 0] } }
}"#;

pub fn config(workflows: &Path, output: &Path) -> Config {
    Config {
        comfyui_url: "http://127.0.0.1:1".to_string(),
        workflows_dir: workflows.to_path_buf(),
        engine_output_dir: output.to_path_buf(),
        persistent_output_dir: None,
        completion_mode: CompletionMode::History,
        substitution: Substitution::Tree,
        param_aliases: HashMap::new(),
        poll_interval: Duration::from_millis(10),
        output_timeout: Duration::from_millis(500),
        api_host: "127.0.0.1".to_string(),
        api_port: "0".to_string(),
    }
}

pub fn write_template(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(format!("{}.json", name)), body).expect("write template");
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// Write `<prefix>_00001_.png` on submit and report it when complete.
    WriteImage,
    /// Complete with outputs that hold no images.
    NoImages,
    /// Complete with `outputs` set to this value as-is.
    Outputs(Value),
    /// Report an execution error.
    Fail(String),
    /// Never finish and never write anything.
    Silent,
}

pub struct FakeEngine {
    output_dir: PathBuf,
    outcome: Outcome,
    pending_rounds: AtomicUsize,
    pub submitted: Mutex<Vec<Value>>,
    pub status_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new(output_dir: &Path, outcome: Outcome) -> Self {
        FakeEngine {
            output_dir: output_dir.to_path_buf(),
            outcome,
            pending_rounds: AtomicUsize::new(2),
            submitted: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn last_submitted(&self) -> Value {
        self.submitted.lock().unwrap().last().cloned().expect("nothing submitted")
    }

    fn save_prefix(graph: &Value) -> Option<(String, String)> {
        let prefix = graph
            .as_object()?
            .values()
            .find(|n| n["class_type"] == "SaveImage")?["inputs"]["filename_prefix"]
            .as_str()?
            .to_string();
        match prefix.rsplit_once('/') {
            Some((dir, stem)) => Some((dir.to_string(), stem.to_string())),
            None => Some((String::new(), prefix)),
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn submit(&self, prompt: &Value) -> AppResult<Submission> {
        self.submitted.lock().unwrap().push(prompt.clone());
        if let Outcome::WriteImage = self.outcome {
            if let Some((sub, stem)) = Self::save_prefix(prompt) {
                let dir = self.output_dir.join(&sub);
                std::fs::create_dir_all(&dir)?;
                std::fs::write(dir.join(format!("{}_00001_.png", stem)), b"\x89PNG")?;
            }
        }
        Ok(Submission { prompt_id: "p-1".to_string(), raw: json!({ "prompt_id": "p-1", "number": 0 }) })
    }

    async fn status(&self, _prompt_id: &str) -> AppResult<EngineStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.pending_rounds.load(Ordering::SeqCst) > 0 {
            self.pending_rounds.fetch_sub(1, Ordering::SeqCst);
            return Ok(EngineStatus::Pending);
        }
        let graph = self.last_submitted();
        Ok(match &self.outcome {
            Outcome::WriteImage => {
                let (sub, stem) = Self::save_prefix(&graph).unwrap_or_default();
                EngineStatus::Completed {
                    outputs: json!({
                        "9": { "images": [{ "filename": format!("{}_00001_.png", stem), "subfolder": sub, "type": "output" }] }
                    }),
                }
            }
            Outcome::NoImages => EngineStatus::Completed { outputs: json!({ "9": { "text": ["done"] } }) },
            Outcome::Outputs(outputs) => EngineStatus::Completed { outputs: outputs.clone() },
            Outcome::Fail(message) => EngineStatus::Failed { message: message.clone() },
            Outcome::Silent => EngineStatus::Pending,
        })
    }
}
