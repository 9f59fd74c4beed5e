//! Read-only lookup of workflow templates stored as `<dir>/<name>.json`.
//!
//! Templates are loaded fresh for every job; nothing is cached.
use std::path::PathBuf;

use tokio::fs;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub name: String,
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        WorkflowStore { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> AppResult<PathBuf> {
        if name.contains('/') || name.contains('\\') || name.contains("..") || name.trim().is_empty() {
            return Err(AppError::Validation(vec![format!("invalid workflow name '{}'", name)]));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    /// Load a template by name. The text is checked to be JSON so that a broken
    /// file is reported against its path rather than as a substitution error.
    pub async fn load(&self, name: &str) -> AppResult<WorkflowTemplate> {
        let path = self.path_for(name)?;
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::TemplateNotFound(path));
            }
            Err(e) => return Err(AppError::Io(e)),
        };
        if let Err(source) = serde_json::from_str::<serde_json::Value>(&text) {
            return Err(AppError::TemplateParse { path, source });
        }
        tracing::debug!(workflow = name, path = %path.display(), "Loaded workflow template");
        Ok(WorkflowTemplate { name: name.to_string(), path, text })
    }

    /// Names of all `*.json` templates in the store, sorted.
    pub async fn list(&self) -> AppResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(AppError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
