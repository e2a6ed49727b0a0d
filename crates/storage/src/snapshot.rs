use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tabrelay_core::{Error, Result};

use crate::tabs::{TrackedTab, TrackedWindow};

/// On-disk mirror of the tab store. Rewritten whole on every save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    #[serde(default)]
    pub opened_tabs: Vec<TrackedTab>,
    #[serde(default)]
    pub opened_windows: Vec<TrackedWindow>,
}

/// Read a snapshot synchronously. A missing file is an empty snapshot.
pub fn read_snapshot(path: &Path) -> Result<TabSnapshot> {
    if !path.exists() {
        return Ok(TabSnapshot::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| storage_error(path, e))
}

/// Write via a sibling temp file and rename, so readers never see a torn file.
pub async fn write_snapshot(path: &Path, snapshot: &TabSnapshot) -> Result<()> {
    let content = serde_json::to_string_pretty(snapshot)?;
    replace_file(path, content)
        .await
        .map_err(|e| storage_error(path, e))
}

async fn replace_file(path: &Path, content: String) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, content).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {}", path.display(), e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}
