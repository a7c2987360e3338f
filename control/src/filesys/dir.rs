//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::ControlError;

/// A directory on disk, addressed by path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory and any missing parents
    pub async fn create(&self) -> Result<(), ControlError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }
}
