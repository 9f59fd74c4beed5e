//! Where a found artifact ends up, and the path reported back for it.
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Leave the file in the engine's output dir and report its full path.
    InPlace,
    /// Move the file under this persistent root and report the path relative to it.
    MoveTo(PathBuf),
}

impl Placement {
    pub fn from_config(persistent_root: Option<&Path>) -> Self {
        match persistent_root {
            Some(root) => Placement::MoveTo(root.to_path_buf()),
            None => Placement::InPlace,
        }
    }

    pub async fn place(&self, artifact: &Path, engine_root: &Path) -> AppResult<String> {
        match self {
            Placement::InPlace => Ok(artifact.to_string_lossy().into_owned()),
            Placement::MoveTo(root) => {
                let rel = relative_to(artifact, engine_root);
                let dest = root.join(&rel);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).await?;
                }
                move_file(artifact, &dest).await?;
                tracing::info!(from = %artifact.display(), to = %dest.display(), "Moved artifact to persistent storage");
                Ok(rel.to_string_lossy().into_owned())
            }
        }
    }
}

fn relative_to(artifact: &Path, root: &Path) -> PathBuf {
    match artifact.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => artifact.file_name().map(PathBuf::from).unwrap_or_else(|| artifact.to_path_buf()),
    }
}

// rename fails across mount points; fall back to copy + remove.
async fn move_file(from: &Path, to: &Path) -> AppResult<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    fs::copy(from, to).await?;
    fs::remove_file(from).await?;
    Ok(())
}
