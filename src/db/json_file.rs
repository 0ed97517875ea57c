use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::db::models::Snapshot;
use crate::db::store::SnapshotBackend;
use crate::error::AppError;

const TEMP_SUFFIX: &str = ".tmp";

/// Keeps the snapshot as one JSON document on disk.
///
/// Writes go to a sibling temp file which is then renamed over the target, so
/// a reader never observes a half-written snapshot. A temp file that is not
/// persisted is deleted when it drops; ones left by a crashed process are
/// swept on bootstrap.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonFileBackend {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn temp_prefix(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(".{}.", name)
    }

    async fn write_atomically(&self, payload: Vec<u8>) -> Result<(), AppError> {
        let path = self.path.clone();
        let directory = self.directory();
        let prefix = self.temp_prefix();

        tokio::task::spawn_blocking(move || replace_file(&path, &directory, &prefix, &payload))
            .await
            .map_err(|e| AppError::Storage(format!("snapshot write task failed: {}", e)))?
    }

    async fn sweep_stale_temp_files(&self) -> Result<(), AppError> {
        let directory = self.directory();
        let prefix = self.temp_prefix();

        let mut entries = match tokio::fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "failed to list {}: {}",
                    directory.display(),
                    e
                )))
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(TEMP_SUFFIX) {
                tracing::warn!(file = %entry.path().display(), "removing stale snapshot temp file");
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

fn replace_file(path: &Path, directory: &Path, prefix: &str, payload: &[u8]) -> Result<(), AppError> {
    std::fs::create_dir_all(directory).map_err(|e| {
        AppError::Storage(format!("failed to prepare {}: {}", directory.display(), e))
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(directory)
        .map_err(|e| AppError::Storage(format!("failed to create temp file: {}", e)))?;

    temp.write_all(payload)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| {
            AppError::Storage(format!("failed to write {}: {}", temp.path().display(), e))
        })?;

    temp.persist(path).map_err(|e| {
        AppError::Storage(format!("failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

#[async_trait]
impl SnapshotBackend for JsonFileBackend {
    async fn bootstrap(&self) -> Result<(), AppError> {
        self.sweep_stale_temp_files().await?;

        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "creating empty snapshot");
                let payload = serde_json::to_vec(&Snapshot::default())?;
                self.write_atomically(payload).await
            }
            Err(e) => Err(AppError::Storage(format!(
                "failed to stat {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn load(&self) -> Result<Snapshot, AppError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::Storage(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        // A zero-length file is a valid, empty store.
        if raw.trim().is_empty() {
            return Ok(Snapshot::default());
        }

        serde_json::from_str(&raw).map_err(|e| {
            AppError::Storage(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        let payload = serde_json::to_vec(snapshot)?;
        self.write_atomically(payload).await
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
