//! Capability interfaces consumed by the reconciliation engine.
//!
//! The engine never talks to the platform directly: every side effect goes
//! through one of these traits so that the surrounding device integration can
//! be swapped (shell hooks in production, in-memory fakes in tests).

pub mod capabilities;
pub mod notify;
pub mod packages;
pub mod shell;
pub mod system;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::gates::GateId;
use crate::models::config::DeviceConfig;

pub use system::{SettingKind, SettingValue};

/// Device capability queries backing the gate chain
#[async_trait]
pub trait Capabilities: Send + Sync {
    async fn is_device_owner(&self) -> bool;

    /// Check (and if possible request) a capability, `true` when granted
    async fn request_capability(&self, gate: GateId) -> bool;
}

/// Package install state and install/uninstall primitives
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn installed_packages(&self) -> Result<BTreeSet<String>, AgentError>;

    async fn package_version(&self, package: &str) -> Result<Option<String>, AgentError>;

    /// Device-owner path, no user consent
    async fn install_silently(&self, file: &Path, package: &str) -> Result<(), AgentError>;

    /// User-consent path
    async fn install_interactive(&self, file: &Path, package: &str) -> Result<(), AgentError>;

    async fn uninstall_silently(&self, package: &str) -> Result<(), AgentError>;

    async fn uninstall_interactive(&self, package: &str) -> Result<(), AgentError>;

    /// Hand a marketplace URI over to the platform store
    async fn install_from_marketplace(&self, uri: &str, package: &str) -> Result<(), AgentError>;

    async fn launch(&self, package: &str) -> Result<(), AgentError>;
}

/// Download progress, advisory only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// 0-100
    pub pct: u8,
    pub total: u64,
    pub current: u64,
}

impl DownloadProgress {
    pub fn new(total: u64, current: u64) -> Self {
        let pct = if total > 0 {
            ((current.min(total) * 100) / total) as u8
        } else {
            0
        };
        Self { pct, total, current }
    }
}

/// Progress callback handed to downloads
pub type ProgressFn<'a> = &'a (dyn Fn(DownloadProgress) + Send + Sync);

/// Fetches remote content into a temporary local file
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download_to_temp(
        &self,
        url: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, AgentError>;
}

/// A provisioned file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub url: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    /// Unix timestamp (seconds)
    pub installed_at: u64,
}

/// Table of provisioned files keyed by path
#[async_trait]
pub trait FileRecordStore: Send + Sync {
    async fn persist(&self, path: &str, record: FileRecord) -> Result<(), AgentError>;

    async fn delete(&self, path: &str) -> Result<(), AgentError>;

    async fn query(&self, path: &str) -> Result<Option<FileRecord>, AgentError>;

    async fn all(&self) -> Result<BTreeMap<String, FileRecord>, AgentError>;
}

/// Raw answer of a configuration endpoint
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, when it could be read
    pub body: Option<String>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport to the management server configuration endpoint
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Errors are transport failures (connect, timeout, 5xx)
    async fn fetch_config(
        &self,
        base_url: &str,
        project: &str,
        device_id: &str,
    ) -> Result<RawResponse, AgentError>;
}

/// Radios, display and policy switches of the device
#[async_trait]
pub trait SystemSettings: Send + Sync {
    /// Current platform state, `None` when unknown
    async fn current(&self, kind: SettingKind) -> Result<Option<SettingValue>, AgentError>;

    async fn apply(&self, kind: SettingKind, value: &SettingValue) -> Result<(), AgentError>;

    async fn factory_reset(&self) -> Result<(), AgentError>;
}

/// Events rendered by the UI collaborator. The engine never renders anything.
pub trait NotificationSink: Send + Sync {
    fn on_ready(&self, config: &DeviceConfig);

    fn on_gate_blocked(&self, gate: GateId);

    fn on_provisioning_progress(&self, message: &str, pct: Option<u8>);

    fn on_item_failed(&self, item: &str, is_file: bool, error: &AgentError);

    /// The pipeline stopped and needs an operator retry (or identity reset)
    fn on_fatal(&self, error: &AgentError);

    /// Cached configuration older than the staleness threshold is in use
    fn on_config_stale(&self, age: Duration);
}

/// Severity of a remote log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteLogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Fire-and-forget log shipping to the management server
pub trait RemoteLog: Send + Sync {
    fn log(&self, level: RemoteLogLevel, message: String);
}

/// Drops every entry
pub struct NullRemoteLog;

impl RemoteLog for NullRemoteLog {
    fn log(&self, _level: RemoteLogLevel, _message: String) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_progress_pct() {
        assert_eq!(DownloadProgress::new(200, 50).pct, 25);
        assert_eq!(DownloadProgress::new(200, 200).pct, 100);
        assert_eq!(DownloadProgress::new(0, 10).pct, 0);
        assert_eq!(DownloadProgress::new(10, 20).pct, 100);
    }
}
