//! Bounded sleep-and-poll waiting.
//!
//! [`poll_until`] is the single wait loop used both for engine status polling
//! and for watching the output directory. There is no file watching: each
//! round is a plain check followed by a fixed sleep, and one last check is made
//! at the deadline.
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::time::{sleep, Instant};

use crate::error::{AppError, AppResult};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Floor applied to the poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        PollPolicy { interval: interval.max(MIN_POLL_INTERVAL), timeout }
    }
}

/// Run `check` until it yields a value or `policy.timeout` elapses.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, location: &str, mut check: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<Option<T>>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut rounds = 0u32;
    loop {
        rounds += 1;
        if let Some(found) = check().await? {
            tracing::debug!(location, rounds, "Poll satisfied");
            return Ok(found);
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(location, rounds, "Gave up waiting after {:?}", now - started);
            return Err(AppError::OutputTimeout { waited: now - started, location: location.to_string() });
        }
        sleep(policy.interval.max(MIN_POLL_INTERVAL).min(deadline - now)).await;
    }
}

/// Waits for an artifact written under a ComfyUI-style `filename_prefix`.
#[derive(Debug, Clone)]
pub struct OutputLocator {
    root: PathBuf,
    policy: PollPolicy,
}

impl OutputLocator {
    pub fn new(root: impl Into<PathBuf>, policy: PollPolicy) -> Self {
        OutputLocator { root: root.into(), policy }
    }

    /// Wait for `<root>/<prefix dir>/<stem>_*.{png,jpg,...}` to appear.
    pub async fn locate(&self, prefix: &str) -> AppResult<PathBuf> {
        let (dir, stem) = split_prefix(&self.root, prefix)?;
        let location = dir.join(format!("{}*", stem)).display().to_string();
        tracing::info!(location = %location, "Waiting for output artifact");
        let (dir, stem) = (&dir, &stem);
        poll_until(self.policy, &location, move || async move {
            find_artifact(dir, stem).await.map_err(AppError::Io)
        })
        .await
    }
}

/// Split `a/b/stem` into (`root/a/b`, `stem`). Absolute prefixes and `..` are rejected.
pub fn split_prefix(root: &Path, prefix: &str) -> AppResult<(PathBuf, String)> {
    let rel = Path::new(prefix);
    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(AppError::Validation(vec![format!(
                    "filename_prefix '{}' must be a relative path without '..'",
                    prefix
                )]))
            }
        }
    }
    let Some(stem) = parts.pop() else {
        return Err(AppError::Validation(vec!["filename_prefix must not be empty".to_string()]));
    };
    let dir = parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p));
    Ok((dir, stem))
}

/// Newest-numbered image in `dir` named `<stem>_...` or `<stem>.<ext>`.
/// Empty files are skipped as still being written.
pub async fn find_artifact(dir: &Path, stem: &str) -> io::Result<Option<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut best: Option<PathBuf> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        let Some(rest) = name.strip_prefix(stem) else { continue };
        if !(rest.starts_with('_') || rest.starts_with('.')) {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() || meta.len() == 0 {
            continue;
        }
        if best.as_ref().map_or(true, |b| b.file_name() < path.file_name()) {
            best = Some(path);
        }
    }
    Ok(best)
}
