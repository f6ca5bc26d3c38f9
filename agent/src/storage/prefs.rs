//! Key-value preferences: gate resolutions and device identity

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::gates::{GateId, GateState};
use crate::storage::device::DeviceIdentity;

/// Persisted preference set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub identity: DeviceIdentity,

    #[serde(default)]
    pub gates: BTreeMap<GateId, GateState>,
}

/// Preferences backed by a JSON file, written through on every change
pub struct PrefsStore {
    file: File,
    prefs: RwLock<Preferences>,
}

impl PrefsStore {
    /// Load preferences, starting empty when the file does not exist
    pub async fn load(file: File) -> Result<Self, AgentError> {
        let prefs = file.read_json_opt::<Preferences>().await?.unwrap_or_default();
        Ok(Self {
            file,
            prefs: RwLock::new(prefs),
        })
    }

    pub async fn identity(&self) -> DeviceIdentity {
        self.prefs.read().await.identity.clone()
    }

    pub async fn set_identity(&self, identity: DeviceIdentity) -> Result<(), AgentError> {
        self.update(|prefs| prefs.identity = identity).await
    }

    /// Forget the device id and server endpoints
    pub async fn reset_identity(&self) -> Result<(), AgentError> {
        self.update(|prefs| prefs.identity = DeviceIdentity::default()).await
    }

    pub async fn gate_state(&self, gate: GateId) -> GateState {
        self.prefs
            .read()
            .await
            .gates
            .get(&gate)
            .copied()
            .unwrap_or_default()
    }

    pub async fn gate_states(&self) -> BTreeMap<GateId, GateState> {
        self.prefs.read().await.gates.clone()
    }

    pub async fn set_gate_state(&self, gate: GateId, state: GateState) -> Result<(), AgentError> {
        debug!("Gate {} -> {:?}", gate, state);
        self.update(|prefs| {
            prefs.gates.insert(gate, state);
        })
        .await
    }

    pub async fn reset_gate(&self, gate: GateId) -> Result<(), AgentError> {
        self.update(|prefs| {
            prefs.gates.remove(&gate);
        })
        .await
    }

    pub async fn reset_gates(&self) -> Result<(), AgentError> {
        self.update(|prefs| prefs.gates.clear()).await
    }

    async fn update(&self, apply: impl FnOnce(&mut Preferences)) -> Result<(), AgentError> {
        let mut prefs = self.prefs.write().await;
        let mut next = prefs.clone();
        apply(&mut next);
        self.file.write_json(&next).await?;
        *prefs = next;
        Ok(())
    }
}
