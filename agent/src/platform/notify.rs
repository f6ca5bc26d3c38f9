//! Notification sink keeping the latest user facing status

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::errors::AgentError;
use crate::gates::GateId;
use crate::models::config::DeviceConfig;
use crate::platform::NotificationSink;

/// An item waiting for the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub item: String,
    pub is_file: bool,
    pub error: String,
}

/// What a UI would currently display
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub message: Option<String>,
    pub progress_pct: Option<u8>,
    pub blocked_gate: Option<GateId>,
    pub failed_item: Option<FailedItem>,
    pub fatal: Option<String>,
    pub config_age_secs: Option<u64>,
    pub ready_at: Option<DateTime<Utc>>,
    pub ready_title: Option<String>,
}

/// Logs every event and keeps a snapshot for the operator API
#[derive(Default)]
pub struct StatusBoard {
    snapshot: Mutex<StatusSnapshot>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        // a poisoned snapshot is still a valid snapshot
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NotificationSink for StatusBoard {
    fn on_ready(&self, config: &DeviceConfig) {
        info!(
            "Device ready: {} applications, {} files",
            config.applications.len(),
            config.files.len()
        );
        let mut snapshot = self.lock();
        snapshot.message = Some("Ready".to_string());
        snapshot.progress_pct = None;
        snapshot.blocked_gate = None;
        snapshot.failed_item = None;
        snapshot.fatal = None;
        snapshot.ready_at = Some(Utc::now());
        snapshot.ready_title = config.title.clone();
    }

    fn on_gate_blocked(&self, gate: GateId) {
        warn!("Waiting for capability: {}", gate);
        let mut snapshot = self.lock();
        snapshot.blocked_gate = Some(gate);
        snapshot.message = Some(format!("Waiting for {}", gate));
    }

    fn on_provisioning_progress(&self, message: &str, pct: Option<u8>) {
        info!("{}", message);
        let mut snapshot = self.lock();
        snapshot.message = Some(message.to_string());
        snapshot.progress_pct = pct;
        snapshot.blocked_gate = None;
        snapshot.fatal = None;
    }

    fn on_item_failed(&self, item: &str, is_file: bool, error: &AgentError) {
        error!("Provisioning of {} failed: {}", item, error);
        self.lock().failed_item = Some(FailedItem {
            item: item.to_string(),
            is_file,
            error: error.to_string(),
        });
    }

    fn on_fatal(&self, error: &AgentError) {
        error!("Reconciliation stopped: {}", error);
        let mut snapshot = self.lock();
        snapshot.fatal = Some(error.to_string());
        snapshot.progress_pct = None;
    }

    fn on_config_stale(&self, age: Duration) {
        warn!("Using cached configuration, {}s old", age.as_secs());
        self.lock().config_age_secs = Some(age.as_secs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_follows_events() {
        let board = StatusBoard::new();
        board.on_gate_blocked(GateId::Overlay);
        assert_eq!(board.snapshot().blocked_gate, Some(GateId::Overlay));

        board.on_provisioning_progress("Downloading a.txt", Some(40));
        let snapshot = board.snapshot();
        assert_eq!(snapshot.blocked_gate, None);
        assert_eq!(snapshot.progress_pct, Some(40));

        board.on_item_failed("a.txt", true, &AgentError::item_failed("a.txt", "404"));
        assert!(board.snapshot().failed_item.unwrap().is_file);

        board.on_ready(&DeviceConfig::default());
        let snapshot = board.snapshot();
        assert!(snapshot.ready_at.is_some());
        assert!(snapshot.failed_item.is_none());
    }
}
