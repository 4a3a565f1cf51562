use crate::action::split_script_args;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Background executor for custom actions. Enqueueing never blocks.
pub trait TaskQueue: Send + Sync {
    fn enqueue_http(&self, delay: Duration, url: &str, label: &str);

    /// `args` is the raw argument string, split with
    /// [`split_script_args`](crate::action::split_script_args) before exec.
    fn enqueue_script(&self, delay: Duration, executable: &Path, args: &str);
}

/// Runs queued actions as detached tokio tasks.
///
/// Must be used from within a tokio runtime.
pub struct TokioTaskQueue {
    client: reqwest::Client,
}

impl TokioTaskQueue {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for TokioTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue for TokioTaskQueue {
    fn enqueue_http(&self, delay: Duration, url: &str, label: &str) {
        let client = self.client.clone();
        let url = url.to_string();
        let label = label.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match client.get(url.as_str()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(label = %label, url = %url, "HTTP task completed");
                }
                Ok(resp) => {
                    tracing::warn!(label = %label, url = %url, status = %resp.status(), "HTTP task returned non-success status");
                }
                Err(e) => {
                    tracing::error!(label = %label, url = %url, error = %e, "HTTP task failed");
                }
            }
        });
    }

    fn enqueue_script(&self, delay: Duration, executable: &Path, args: &str) {
        let executable: PathBuf = executable.to_path_buf();
        let args = split_script_args(args);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match tokio::process::Command::new(&executable).args(&args).status().await {
                Ok(status) if status.success() => {
                    tracing::debug!(script = %executable.display(), "Script task completed");
                }
                Ok(status) => {
                    tracing::warn!(script = %executable.display(), status = %status, "Script task exited with failure");
                }
                Err(e) => {
                    tracing::error!(script = %executable.display(), error = %e, "Script task failed to start");
                }
            }
        });
    }
}
