//! Table of provisioned files

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::platform::{FileRecord, FileRecordStore};

/// File records kept in a single JSON document, rewritten on every change
pub struct JsonFileRecords {
    file: File,
    records: Mutex<BTreeMap<String, FileRecord>>,
}

impl JsonFileRecords {
    pub async fn load(file: File) -> Result<Self, AgentError> {
        let records = file
            .read_json_opt::<BTreeMap<String, FileRecord>>()
            .await?
            .unwrap_or_default();
        Ok(Self {
            file,
            records: Mutex::new(records),
        })
    }
}

#[async_trait]
impl FileRecordStore for JsonFileRecords {
    async fn persist(&self, path: &str, record: FileRecord) -> Result<(), AgentError> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        next.insert(path.to_string(), record);
        self.file.write_json(&next).await?;
        *records = next;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), AgentError> {
        let mut records = self.records.lock().await;
        if !records.contains_key(path) {
            return Ok(());
        }
        let mut next = records.clone();
        next.remove(path);
        self.file.write_json(&next).await?;
        *records = next;
        Ok(())
    }

    async fn query(&self, path: &str) -> Result<Option<FileRecord>, AgentError> {
        Ok(self.records.lock().await.get(path).cloned())
    }

    async fn all(&self) -> Result<BTreeMap<String, FileRecord>, AgentError> {
        Ok(self.records.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_persist_across_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = File::new(dir.path().join("file_records.json"));

        let records = JsonFileRecords::load(file.clone()).await.unwrap();
        records
            .persist(
                "a.txt",
                FileRecord {
                    url: Some("http://x/a".to_string()),
                    checksum: None,
                    installed_at: 10,
                },
            )
            .await
            .unwrap();
        records.delete("missing.txt").await.unwrap();

        let reloaded = JsonFileRecords::load(file).await.unwrap();
        let record = reloaded.query("a.txt").await.unwrap().unwrap();
        assert_eq!(record.url.as_deref(), Some("http://x/a"));

        reloaded.delete("a.txt").await.unwrap();
        assert!(reloaded.all().await.unwrap().is_empty());
    }
}
