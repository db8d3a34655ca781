//! Session document persistence
//!
//! One JSON document per session, written exactly once on freeze. The
//! filename embeds a sortable UTC timestamp plus the session id so a
//! directory listing orders runs chronologically.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::AppResult;
use crate::models::SessionDocument;

/// Write a frozen session document under `output_dir`
pub async fn persist_session(
    document: &SessionDocument,
    output_dir: &Path,
) -> AppResult<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let stamp = document.start_time.format("%Y%m%d_%H%M%S");
    let filename = format!("session_{stamp}_{}.json", document.session_id);
    let path = output_dir.join(filename);
    let contents = serde_json::to_string_pretty(document)?;
    tokio::fs::write(&path, contents).await?;
    info!("Session {} persisted to {}", document.session_id, path.display());
    Ok(path)
}

/// Reload a persisted session document
pub async fn load_session(path: &Path) -> AppResult<SessionDocument> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&contents)?)
}
