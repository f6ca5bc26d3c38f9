//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the agent
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Agent tuning, written by the operator
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Key-value preferences: gate states and device identity
    pub fn prefs_file(&self) -> File {
        File::new(self.base_dir.join("prefs.json"))
    }

    /// Last known good configuration snapshot
    pub fn config_file(&self) -> File {
        File::new(self.base_dir.join("config.json"))
    }

    /// Table of provisioned files
    pub fn file_records_file(&self) -> File {
        File::new(self.base_dir.join("file_records.json"))
    }

    /// Root of the managed files
    pub fn files_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("files"))
    }

    /// Scratch space for in-flight downloads
    pub fn downloads_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("downloads"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), crate::errors::AgentError> {
        Dir::new(&self.base_dir).create().await?;
        self.files_dir().create().await?;
        self.downloads_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/mdmagent");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mdmagent");

        Self::new(base_dir)
    }
}
