//! On-disk cache of the rendered schema text

use crate::graph::{GraphConnector, StoreError};
use crate::schema::{introspect, SchemaSnapshot};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SchemaCacheError {
    #[error("Schema file not found: {0}. Regenerate the schema first")]
    Missing(PathBuf),
    #[error("Schema file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Schema introspection failed: {0}")]
    Store(#[from] StoreError),
}

pub type SchemaCacheResult<T> = Result<T, SchemaCacheError>;

// Temp names must be unique per call, not just per process
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Rendered schema text persisted at a fixed path.
///
/// Readers never see a partial file: [`SchemaCache::store`] writes a sibling
/// temp file and renames it into place. There is no staleness tracking; the
/// text is whatever the last regeneration wrote.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    path: PathBuf,
}

impl SchemaCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the cached text, trimmed
    pub fn load(&self) -> SchemaCacheResult<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SchemaCacheError::Missing(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the cached text atomically: write .tmp, fsync, rename
    pub fn store(&self, text: &str) -> SchemaCacheResult<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "graph_schema.txt".to_string());
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp_path = dir.join(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq));

        let result = (|| {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &self.path)
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        Ok(result?)
    }

    /// Introspect the store, render the snapshot and replace the cached text
    pub async fn regenerate(&self, connector: &dyn GraphConnector) -> SchemaCacheResult<SchemaSnapshot> {
        let mut session = connector.session().await?;
        let snapshot = introspect(session.as_mut()).await?;
        drop(session);

        if snapshot.labels.is_empty() {
            warn!("No labels found in the database, schema will be empty");
        }

        self.store(&snapshot.render())?;
        info!("Schema written to {}", self.path.display());
        Ok(snapshot)
    }
}
