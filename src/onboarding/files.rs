//! Directory-backed `DocumentSink` for uploaded partner files.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::error::PortError;

use super::notify::{DocumentMetadata, DocumentSink};

/// Stores files under `<root>/<partner>/<stage>/<document>-<file name>`.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a file with this metadata is written to.
    pub fn resolve_path(&self, metadata: &DocumentMetadata) -> PathBuf {
        self.root
            .join(sanitize(&metadata.partner_id))
            .join(metadata.stage.as_str())
            .join(format!(
                "{}-{}",
                sanitize(&metadata.document_id),
                sanitize(&metadata.file_name)
            ))
    }
}

#[async_trait]
impl DocumentSink for DirectorySink {
    async fn persist(&self, file: &[u8], metadata: &DocumentMetadata) -> Result<String, PortError> {
        let path = self.resolve_path(metadata);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Storage(format!("{}: {e}", parent.display())))?;
        }
        fs::write(&path, file)
            .await
            .map_err(|e| PortError::Storage(format!("{}: {e}", path.display())))?;
        Ok(path.display().to_string())
    }
}

/// Keep a single safe path component.
fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
