//! Run history kept in a JSON file between invocations.

use std::path::Path;

use anyhow::Context;
use convlab_core::history::RunHistory;

/// History file used when `--history` is not given.
pub const DEFAULT_HISTORY_FILE: &str = "convlab-history.json";

/// Load the history at `path`; a missing file is an empty history.
pub async fn load(path: &Path) -> anyhow::Result<RunHistory> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("History file {} is not valid", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RunHistory::new()),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read history file {}", path.display()))
        }
    }
}

/// Write the history to `path` through a temporary file and a rename.
pub async fn save(path: &Path, history: &RunHistory) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(history)?;
    let tmp_path = path.with_extension("json.tmp");

    tokio::fs::write(&tmp_path, body)
        .await
        .with_context(|| format!("Failed to write history file {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to replace history file {}", path.display()))?;

    tracing::debug!(path = %path.display(), runs = history.len(), "History saved");
    Ok(())
}
