//! Directory operations

use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::errors::AgentError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), AgentError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Resolve a server supplied path inside this directory.
    ///
    /// A leading `/` is relative to the managed root. Parent components are
    /// rejected so a config can never address anything outside of it.
    pub fn resolve(&self, relative: &str) -> Result<File, AgentError> {
        let relative = relative.trim_start_matches("./");
        if relative.is_empty() {
            return Err(AgentError::ValidationError("empty file path".to_string()));
        }

        let mut resolved = self.path.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                _ => {
                    return Err(AgentError::ValidationError(format!(
                        "path escapes managed root: {}",
                        relative
                    )))
                }
            }
        }
        if resolved == self.path {
            return Err(AgentError::ValidationError(format!("no file name in path: {}", relative)));
        }
        Ok(File::new(resolved))
    }
}
