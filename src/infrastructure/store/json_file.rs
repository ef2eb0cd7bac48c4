use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::domain::error::{EngineError, Result};
use crate::domain::ports::{RawRow, SheetBackend, SheetOp};
use crate::infrastructure::store::memory::{MemoryWorkbook, WorkbookData};

/// [`SheetBackend`] persisted to a JSON file of `{ sheet: [[cell, ..], ..] }`.
///
/// Reads are served from memory; every batch rewrites the file, including
/// one that failed partway.
pub struct JsonWorkbook {
    path: PathBuf,
    inner: MemoryWorkbook,
}

impl JsonWorkbook {
    /// Open `path`, starting from an empty workbook when the file does not exist.
    pub async fn open(path: impl AsRef<Path>, store_id: impl Into<String>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data: WorkbookData = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse workbook: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "workbook not found, starting empty");
                WorkbookData::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read workbook: {}", path.display()))
            }
        };
        Ok(Self {
            path,
            inner: MemoryWorkbook::from_data(store_id, data),
        })
    }

    async fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.inner.snapshot())
            .map_err(|e| EngineError::backend(format!("failed to encode workbook: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| EngineError::backend(format!("failed to create {}: {}", dir.display(), e)))?;
        }
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| EngineError::backend(format!("failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| EngineError::backend(format!("failed to replace {}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), "workbook saved");
        Ok(())
    }
}

#[async_trait]
impl SheetBackend for JsonWorkbook {
    fn store_id(&self) -> &str {
        self.inner.store_id()
    }

    async fn ready(&self) -> Result<()> {
        self.inner.ready().await
    }

    async fn read(&self, sheet: &str) -> Result<Vec<RawRow>> {
        self.inner.read(sheet).await
    }

    async fn apply(&self, ops: Vec<SheetOp>) -> Result<()> {
        let applied = self.inner.apply(ops).await;
        // Persist even on failure: a partial batch is still the current state.
        if let Err(e) = self.persist().await {
            if applied.is_err() {
                warn!(error = %e, "workbook not saved after failed batch");
                return applied;
            }
            return Err(e);
        }
        applied
    }
}
