//! Last-known-good configuration snapshot

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::models::config::DeviceConfig;

/// A configuration snapshot and when it was fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConfig {
    pub config: DeviceConfig,
    pub fetched_at: DateTime<Utc>,
}

impl StoredConfig {
    pub fn age(&self) -> Duration {
        (Utc::now() - self.fetched_at).to_std().unwrap_or_default()
    }
}

/// Single writer, many readers. Snapshots are immutable and swapped whole.
pub struct ConfigStore {
    file: File,
    current: RwLock<Option<Arc<StoredConfig>>>,
}

impl ConfigStore {
    /// Load the persisted snapshot, if any
    pub async fn load(file: File) -> Result<Self, AgentError> {
        let current = file.read_json_opt::<StoredConfig>().await?.map(Arc::new);
        Ok(Self {
            file,
            current: RwLock::new(current),
        })
    }

    pub async fn current(&self) -> Option<Arc<StoredConfig>> {
        self.current.read().await.clone()
    }

    pub async fn has_config(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Install a freshly fetched configuration
    pub async fn replace(&self, config: DeviceConfig) -> Result<Arc<StoredConfig>, AgentError> {
        let stored = StoredConfig {
            config,
            fetched_at: Utc::now(),
        };
        info!(
            "Storing configuration: {} applications, {} files",
            stored.config.applications.len(),
            stored.config.files.len()
        );
        self.swap(stored).await
    }

    /// Derive a new snapshot from the current one, keeping its fetch time
    pub async fn rewrite(
        &self,
        derive: impl FnOnce(&DeviceConfig) -> DeviceConfig,
    ) -> Result<Option<Arc<StoredConfig>>, AgentError> {
        let mut current = self.current.write().await;
        let Some(existing) = current.as_ref() else {
            return Ok(None);
        };
        let next = Arc::new(StoredConfig {
            config: derive(&existing.config),
            fetched_at: existing.fetched_at,
        });
        self.file.write_json(next.as_ref()).await?;
        *current = Some(next.clone());
        Ok(Some(next))
    }

    async fn swap(&self, stored: StoredConfig) -> Result<Arc<StoredConfig>, AgentError> {
        let mut current = self.current.write().await;
        self.file.write_json(&stored).await?;
        let stored = Arc::new(stored);
        *current = Some(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ApplicationSpec;

    #[tokio::test]
    async fn test_replace_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = File::new(dir.path().join("config.json"));

        let store = ConfigStore::load(file.clone()).await.unwrap();
        assert!(!store.has_config().await);

        let config = DeviceConfig {
            title: Some("Lobby".to_string()),
            ..Default::default()
        };
        let before = store.replace(config.clone()).await.unwrap();

        let reloaded = ConfigStore::load(file).await.unwrap();
        let current = reloaded.current().await.unwrap();
        assert_eq!(current.config, config);
        assert_eq!(current.fetched_at, before.fetched_at);
    }

    #[tokio::test]
    async fn test_rewrite_keeps_readers_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::load(File::new(dir.path().join("config.json"))).await.unwrap();
        assert!(store.rewrite(|c| c.clone()).await.unwrap().is_none());

        store
            .replace(DeviceConfig {
                applications: vec![ApplicationSpec {
                    pkg: "com.foo".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .await
            .unwrap();

        let held = store.current().await.unwrap();
        let next = store
            .rewrite(|c| c.without_application("com.foo"))
            .await
            .unwrap()
            .unwrap();

        assert!(next.config.applications.is_empty());
        assert_eq!(next.fetched_at, held.fetched_at);
        assert_eq!(held.config.applications.len(), 1);
    }
}
