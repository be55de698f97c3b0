use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::StorageError;

/// Local filesystem storage rooted at the data directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// Write `data` to `key` atomically: write a temp file, fsync, rename over the target.
    pub async fn upload_bytes(&self, data: &[u8], key: &str) -> Result<u64, StorageError> {
        let path = self.resolve_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_name = format!(
            ".{}.tmp-{}",
            path.file_name().unwrap_or_default().to_string_lossy(),
            uuid::Uuid::new_v4().as_hyphenated()
        );
        let tmp_path = path.parent().unwrap_or(Path::new(".")).join(&tmp_name);

        let write = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &path).await
        };
        if let Err(e) = write.await {
            debug!("Failed to write {}: {e}", path.display());
            fs::remove_file(&tmp_path).await.ok();
            return Err(StorageError::Io(e));
        }

        Ok(data.len() as u64)
    }

    /// Read the file stored at `key`.
    pub async fn download_file(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve_path(key);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Remove the file at `key`. A missing file is not an error.
    pub async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.resolve_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.resolve_path(key)).await.unwrap_or(false)
    }
}
