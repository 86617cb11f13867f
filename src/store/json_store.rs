use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use super::{CatalogStore, Database};
use crate::error::{StoreError, StoreResult};

/// Write `value` as pretty JSON to `path` without ever exposing a partial file.
///
/// The document goes to a temporary file in the same directory, is synced,
/// then renamed over the target.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// The catalog as a single JSON document on disk
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    path: PathBuf,
}

impl DatabaseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load_sync(&self) -> StoreResult<Database> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptDatabase {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    pub fn save_sync(&self, db: &Database) -> StoreResult<()> {
        write_json_atomic(&self.path, db)?;
        tracing::debug!(path = %self.path.display(), sorries = db.sorries().len(), "database saved");
        Ok(())
    }
}

impl CatalogStore for DatabaseStore {
    async fn load(&self) -> StoreResult<Database> {
        self.load_sync()
    }

    async fn save(&self, db: &Database) -> StoreResult<()> {
        self.save_sync(db)
    }
}
