//! Capability queries backed by settings and an optional hook

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::AgentError;
use crate::gates::GateId;
use crate::platform::shell::CommandTemplate;
use crate::platform::Capabilities;
use crate::storage::settings::PlatformSettings;

/// Capabilities granted statically or checked through `<hook> {kind}`
pub struct HookCapabilities {
    device_owner: bool,
    granted: BTreeSet<GateId>,
    hook: Option<CommandTemplate>,
}

impl HookCapabilities {
    pub fn new(device_owner: bool, granted: impl IntoIterator<Item = GateId>, hook: Option<CommandTemplate>) -> Self {
        Self {
            device_owner,
            granted: granted.into_iter().collect(),
            hook,
        }
    }

    pub fn from_settings(settings: &PlatformSettings) -> Result<Self, AgentError> {
        Ok(Self::new(
            settings.device_owner,
            settings.granted_capabilities.iter().copied(),
            CommandTemplate::parse_opt(settings.capability_hook.as_ref())?,
        ))
    }
}

#[async_trait]
impl Capabilities for HookCapabilities {
    async fn is_device_owner(&self) -> bool {
        self.device_owner
    }

    async fn request_capability(&self, gate: GateId) -> bool {
        if self.granted.contains(&gate) {
            return true;
        }
        let Some(hook) = &self.hook else {
            return false;
        };
        match hook.output(&[("kind", gate.as_str())]).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!("Capability hook failed for {}: {}", gate, e);
                false
            }
        }
    }
}
