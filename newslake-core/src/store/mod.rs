//! Bronze/silver/gold storage layers.
//!
//! All writes go to a temporary path and are renamed into place, so a crash
//! mid-write never leaves a truncated file visible.

pub mod bronze;
pub mod gold;
pub mod silver;

pub use bronze::{BronzeStatus, BronzeStore, LatestPointer};
pub use gold::{GoldMeta, GoldStore};
pub use silver::{SilverStore, SilverWriteReport};

use std::fs;
use std::path::Path;
use thiserror::Error;

/// Structured error types for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("csv error: {0}")]
    Csv(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, e: impl std::fmt::Display) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

/// Write bytes to `path` atomically: write a `.tmp` sibling, then rename.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::io(path, e)
    })?;
    Ok(())
}
