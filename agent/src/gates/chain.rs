//! Sequential gate evaluation

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::gates::{GateAction, GateId, GateState};
use crate::platform::Capabilities;
use crate::storage::prefs::PrefsStore;

/// Result of walking the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    AllGatesPassed,
    GateFailed { gate: GateId, action: GateAction },
}

/// Per-gate view for the operator
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub gate: GateId,
    pub state: GateState,
    pub required: bool,
    pub enforced: bool,
}

/// Evaluates gates in fixed order and stops at the first unresolved one.
///
/// Resolutions are persisted so a granted or declined gate is not asked again
/// until it is reset.
pub struct GateChain {
    prefs: Arc<PrefsStore>,
    caps: Arc<dyn Capabilities>,
    extended_build: bool,
}

impl GateChain {
    pub fn new(prefs: Arc<PrefsStore>, caps: Arc<dyn Capabilities>, extended_build: bool) -> Self {
        Self {
            prefs,
            caps,
            extended_build,
        }
    }

    fn is_enforced(&self, gate: GateId, device_owner: bool) -> bool {
        if gate.is_informational() {
            return false;
        }
        if gate == GateId::UnknownSources && device_owner {
            return false;
        }
        if gate.is_extended_only() && !self.extended_build {
            return false;
        }
        true
    }

    pub async fn evaluate_next(&self) -> Result<GateOutcome, AgentError> {
        let device_owner = self.caps.is_device_owner().await;
        let owner_state = if device_owner {
            GateState::Granted
        } else {
            GateState::Denied
        };
        if self.prefs.gate_state(GateId::DeviceOwner).await != owner_state {
            info!("Device owner: {}", device_owner);
            self.prefs.set_gate_state(GateId::DeviceOwner, owner_state).await?;
        }

        for gate in GateId::ORDER {
            if !self.is_enforced(gate, device_owner) {
                continue;
            }

            match self.prefs.gate_state(gate).await {
                GateState::Granted => continue,
                GateState::Denied if !gate.is_required() => {
                    debug!("Gate {} declined earlier, skipping", gate);
                    continue;
                }
                _ => {}
            }

            if self.caps.request_capability(gate).await {
                info!("Gate {} granted", gate);
                self.prefs.set_gate_state(gate, GateState::Granted).await?;
                continue;
            }

            return Ok(GateOutcome::GateFailed {
                gate,
                action: gate.required_action(),
            });
        }

        Ok(GateOutcome::AllGatesPassed)
    }

    /// Operator declined to grant an optional gate
    pub async fn decline(&self, gate: GateId) -> Result<(), AgentError> {
        if gate.is_required() || gate.is_informational() {
            return Err(AgentError::GateDenied(format!("{} cannot be declined", gate)));
        }
        info!("Gate {} declined by operator", gate);
        self.prefs.set_gate_state(gate, GateState::Denied).await
    }

    pub async fn reset(&self, gate: GateId) -> Result<(), AgentError> {
        self.prefs.reset_gate(gate).await
    }

    pub async fn reset_all(&self) -> Result<(), AgentError> {
        self.prefs.reset_gates().await
    }

    pub async fn report(&self) -> Vec<GateReport> {
        let device_owner = self.prefs.gate_state(GateId::DeviceOwner).await == GateState::Granted;
        let states = self.prefs.gate_states().await;
        GateId::ORDER
            .into_iter()
            .map(|gate| GateReport {
                gate,
                state: states.get(&gate).copied().unwrap_or_default(),
                required: gate.is_required(),
                enforced: self.is_enforced(gate, device_owner),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::filesys::file::File;

    struct FakeCaps {
        owner: bool,
        granted: Mutex<BTreeSet<GateId>>,
        asked: Mutex<Vec<GateId>>,
    }

    impl FakeCaps {
        fn new(owner: bool, granted: &[GateId]) -> Arc<Self> {
            Arc::new(Self {
                owner,
                granted: Mutex::new(granted.iter().copied().collect()),
                asked: Mutex::new(Vec::new()),
            })
        }

        fn grant(&self, gate: GateId) {
            self.granted.lock().unwrap().insert(gate);
        }
    }

    #[async_trait]
    impl Capabilities for FakeCaps {
        async fn is_device_owner(&self) -> bool {
            self.owner
        }

        async fn request_capability(&self, gate: GateId) -> bool {
            self.asked.lock().unwrap().push(gate);
            self.granted.lock().unwrap().contains(&gate)
        }
    }

    async fn prefs(dir: &tempfile::TempDir) -> Arc<PrefsStore> {
        Arc::new(PrefsStore::load(File::new(dir.path().join("prefs.json"))).await.unwrap())
    }

    #[tokio::test]
    async fn test_stops_at_first_unresolved_gate() {
        let dir = tempfile::TempDir::new().unwrap();
        let caps = FakeCaps::new(false, &[GateId::BackgroundPopup]);
        let chain = GateChain::new(prefs(&dir).await, caps.clone(), false);

        assert_eq!(
            chain.evaluate_next().await.unwrap(),
            GateOutcome::GateFailed {
                gate: GateId::UnknownSources,
                action: GateAction::GrantPermission
            }
        );

        caps.grant(GateId::UnknownSources);
        caps.grant(GateId::DeviceAdmin);
        caps.grant(GateId::Overlay);
        assert_eq!(chain.evaluate_next().await.unwrap(), GateOutcome::AllGatesPassed);
    }

    #[tokio::test]
    async fn test_device_owner_skips_unknown_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        let caps = FakeCaps::new(
            true,
            &[GateId::BackgroundPopup, GateId::DeviceAdmin, GateId::Overlay],
        );
        let chain = GateChain::new(prefs(&dir).await, caps.clone(), false);

        assert_eq!(chain.evaluate_next().await.unwrap(), GateOutcome::AllGatesPassed);
        let asked = caps.asked.lock().unwrap().clone();
        assert!(!asked.contains(&GateId::UnknownSources));
        assert!(!asked.contains(&GateId::UsageAccess));
    }

    #[tokio::test]
    async fn test_extended_build_enforces_usage_access() {
        let dir = tempfile::TempDir::new().unwrap();
        let caps = FakeCaps::new(
            true,
            &[GateId::BackgroundPopup, GateId::DeviceAdmin, GateId::Overlay],
        );
        let chain = GateChain::new(prefs(&dir).await, caps, true);

        assert!(matches!(
            chain.evaluate_next().await.unwrap(),
            GateOutcome::GateFailed { gate: GateId::UsageAccess, .. }
        ));
    }

    #[tokio::test]
    async fn test_granted_gates_are_asked_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let caps = FakeCaps::new(
            true,
            &[GateId::BackgroundPopup, GateId::DeviceAdmin, GateId::Overlay],
        );
        let chain = GateChain::new(prefs(&dir).await, caps.clone(), false);

        chain.evaluate_next().await.unwrap();
        chain.evaluate_next().await.unwrap();
        let asked = caps.asked.lock().unwrap().clone();
        assert_eq!(asked.iter().filter(|g| **g == GateId::Overlay).count(), 1);
    }

    #[tokio::test]
    async fn test_decline_optional_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let caps = FakeCaps::new(true, &[GateId::BackgroundPopup]);
        let chain = GateChain::new(prefs(&dir).await, caps, false);

        assert!(matches!(
            chain.evaluate_next().await.unwrap(),
            GateOutcome::GateFailed { gate: GateId::DeviceAdmin, .. }
        ));
        chain.decline(GateId::DeviceAdmin).await.unwrap();
        chain.decline(GateId::Overlay).await.unwrap();
        assert_eq!(chain.evaluate_next().await.unwrap(), GateOutcome::AllGatesPassed);

        assert!(matches!(
            chain.decline(GateId::BackgroundPopup).await,
            Err(AgentError::GateDenied(_))
        ));

        chain.reset(GateId::Overlay).await.unwrap();
        assert!(matches!(
            chain.evaluate_next().await.unwrap(),
            GateOutcome::GateFailed { gate: GateId::Overlay, .. }
        ));

        let report = chain.report().await;
        assert_eq!(report.len(), 7);
        assert_eq!(report[3].state, GateState::Denied);
    }
}
