//! Turns the engine's raw outputs into a single artifact path.
//!
//! The raw result is a map of node id to node output. The first node, in
//! document order, whose `images` list holds a non-temporary descriptor wins.
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub node_id: String,
    pub filename: String,
    pub subfolder: String,
}

impl ImageRef {
    pub fn path_under(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        if !self.subfolder.is_empty() {
            path.push(&self.subfolder);
        }
        path.push(&self.filename);
        path
    }
}

pub fn first_image(raw: &Value) -> AppResult<ImageRef> {
    let nodes = match raw {
        Value::Object(nodes) => nodes,
        other => {
            return Err(AppError::UnexpectedResult { kind: AppError::json_kind(other), raw: other.clone() });
        }
    };
    for (node_id, output) in nodes {
        let Some(images) = output.get("images").and_then(|v| v.as_array()) else { continue };
        for img in images {
            // Previews land in ComfyUI's temp dir, not the output dir.
            if img.get("type").and_then(|t| t.as_str()) == Some("temp") {
                continue;
            }
            let Some(filename) = img.get("filename").and_then(|f| f.as_str()) else { continue };
            let subfolder = img.get("subfolder").and_then(|s| s.as_str()).unwrap_or_default();
            return Ok(ImageRef {
                node_id: node_id.clone(),
                filename: filename.to_string(),
                subfolder: subfolder.to_string(),
            });
        }
    }
    Err(AppError::NoImageProduced)
}

/// Resolve the produced image under `base` and make sure it is on disk.
pub fn adapt_outputs(raw: &Value, base: &Path) -> AppResult<PathBuf> {
    let image = first_image(raw)?;
    let path = image.path_under(base);
    tracing::debug!(node = %image.node_id, path = %path.display(), "Engine reported image");
    if !path.is_file() {
        return Err(AppError::OutputMissing(path));
    }
    Ok(path)
}
