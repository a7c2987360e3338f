//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::ControlError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout under one data directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Snapshot of nodes and deployments
    pub fn records_file(&self) -> File {
        File::new(self.base_dir.join("records.json"))
    }

    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Create the directories the control plane writes to
    pub async fn setup(&self) -> Result<(), ControlError> {
        Dir::new(&self.base_dir).create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/var/lib/fleetctl")
    }
}
