pub mod local;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {key}")]
    NotFound { key: String },
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}
