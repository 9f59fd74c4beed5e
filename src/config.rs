//! Env-driven configuration for the handler, the HTTP service and the CLI.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Defaults are relative development paths: the shared
//! volume layout of a deployment is always supplied through the environment.
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

const VARS: &[&str] = &[
    "COMFYUI_URL",
    "WORKFLOWS_DIR",
    "COMFYUI_OUTPUT_DIR",
    "PERSISTENT_OUTPUT_DIR",
    "COMPLETION_MODE",
    "SUBSTITUTION_STRATEGY",
    "PARAM_ALIASES",
    "POLL_INTERVAL_SECS",
    "OUTPUT_TIMEOUT_SECS",
    "API_HOST",
    "API_PORT",
];

/// How the handler learns that ComfyUI finished a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Poll the engine's status for the submitted prompt id.
    History,
    /// Poll the output directory for an artifact with the job's prefix.
    Filesystem,
}

impl FromStr for CompletionMode {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "history" => Ok(CompletionMode::History),
            "filesystem" | "fs" => Ok(CompletionMode::Filesystem),
            other => Err(AppError::Config(format!("unknown COMPLETION_MODE '{}'", other))),
        }
    }
}

/// Placeholder substitution strategy, see [`PromptConstructor`](crate::PromptConstructor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Substitution {
    #[default]
    Tree,
    Text,
}

impl FromStr for Substitution {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tree" => Ok(Substitution::Tree),
            "text" => Ok(Substitution::Text),
            other => Err(AppError::Config(format!("unknown SUBSTITUTION_STRATEGY '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub comfyui_url: String,
    pub workflows_dir: PathBuf,
    pub engine_output_dir: PathBuf,
    pub persistent_output_dir: Option<PathBuf>,
    pub completion_mode: CompletionMode,
    pub substitution: Substitution,
    pub param_aliases: HashMap<String, String>,
    pub poll_interval: Duration,
    pub output_timeout: Duration,
    pub api_host: String,
    pub api_port: String,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> AppResult<Self> {
        Ok(Config {
            comfyui_url: var_or("COMFYUI_URL", "http://127.0.0.1:8188"),
            workflows_dir: PathBuf::from(var_or("WORKFLOWS_DIR", "./workflows")),
            engine_output_dir: PathBuf::from(var_or("COMFYUI_OUTPUT_DIR", "./output")),
            persistent_output_dir: env::var("PERSISTENT_OUTPUT_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            completion_mode: var_or("COMPLETION_MODE", "history").parse()?,
            substitution: var_or("SUBSTITUTION_STRATEGY", "tree").parse()?,
            param_aliases: parse_aliases(&var_or("PARAM_ALIASES", ""))?,
            poll_interval: secs_var("POLL_INTERVAL_SECS", 2, 1)?,
            output_timeout: secs_var("OUTPUT_TIMEOUT_SECS", 180, 0)?,
            api_host: var_or("API_HOST", "127.0.0.1"),
            api_port: var_or("API_PORT", "8189"),
        })
    }

    pub fn print_env_vars() {
        for name in VARS {
            let shown = env::var(name).unwrap_or_else(|_| "<unset>".to_string());
            tracing::info!("{}: {}", name, shown);
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn secs_var(name: &str, default: u64, min: u64) -> AppResult<Duration> {
    match env::var(name) {
        Ok(raw) => parse_secs(name, &raw, min),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

fn parse_secs(name: &str, raw: &str, min: u64) -> AppResult<Duration> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| AppError::Config(format!("{} must be a whole number of seconds, got '{}'", name, raw)))?;
    if secs < min {
        return Err(AppError::Config(format!("{} must be at least {}, got {}", name, min, secs)));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse `from:to,from:to` into a rename map. Blank input yields an empty map.
pub fn parse_aliases(raw: &str) -> AppResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((from, to)) = pair.split_once(':') else {
            return Err(AppError::Config(format!("invalid PARAM_ALIASES entry '{}', expected from:to", pair)));
        };
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() {
            return Err(AppError::Config(format!("invalid PARAM_ALIASES entry '{}'", pair)));
        }
        out.insert(from.to_string(), to.to_string());
    }
    Ok(out)
}
