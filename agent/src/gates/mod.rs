//! Capability gates that must be granted before provisioning proceeds

pub mod chain;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use chain::{GateChain, GateOutcome, GateReport};

/// A device capability precondition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateId {
    DeviceOwner,
    BackgroundPopup,
    UnknownSources,
    DeviceAdmin,
    Overlay,
    UsageAccess,
    Accessibility,
}

impl GateId {
    /// Evaluation order of the chain
    pub const ORDER: [GateId; 7] = [
        GateId::DeviceOwner,
        GateId::BackgroundPopup,
        GateId::UnknownSources,
        GateId::DeviceAdmin,
        GateId::Overlay,
        GateId::UsageAccess,
        GateId::Accessibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GateId::DeviceOwner => "device_owner",
            GateId::BackgroundPopup => "background_popup",
            GateId::UnknownSources => "unknown_sources",
            GateId::DeviceAdmin => "device_admin",
            GateId::Overlay => "overlay",
            GateId::UsageAccess => "usage_access",
            GateId::Accessibility => "accessibility",
        }
    }

    /// Required gates cannot be declined
    pub fn is_required(&self) -> bool {
        matches!(self, GateId::BackgroundPopup | GateId::UnknownSources)
    }

    /// Never blocks, only recorded
    pub fn is_informational(&self) -> bool {
        matches!(self, GateId::DeviceOwner)
    }

    /// Enforced in extended builds only
    pub fn is_extended_only(&self) -> bool {
        matches!(self, GateId::UsageAccess | GateId::Accessibility)
    }

    /// What the operator has to do to resolve the gate
    pub fn required_action(&self) -> GateAction {
        match self {
            GateId::DeviceAdmin => GateAction::ActivateAdmin,
            GateId::Accessibility => GateAction::EnableService,
            _ => GateAction::GrantPermission,
        }
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GateId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GateId::ORDER
            .into_iter()
            .find(|gate| gate.as_str() == s)
            .ok_or_else(|| format!("Unknown gate: {}", s))
    }
}

/// Persisted resolution of a gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Resolution affordance presented for a failed gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    GrantPermission,
    ActivateAdmin,
    EnableService,
}
