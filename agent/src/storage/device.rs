//! Device identity

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Identity of this device on the management server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device number registered on the server
    #[serde(default)]
    pub device_id: String,

    /// Server-side project (tenant) path segment
    #[serde(default)]
    pub project: String,

    /// Primary management server URL
    #[serde(default)]
    pub base_url: String,

    /// Fallback management server URL
    #[serde(default)]
    pub secondary_base_url: Option<String>,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Assert that the identity is complete enough to talk to the server
pub fn assert_activated(identity: &DeviceIdentity) -> Result<(), AgentError> {
    if identity.device_id.trim().is_empty() {
        return Err(AgentError::DeviceNotActivated(
            "Device ID is empty".to_string(),
        ));
    }

    if identity.base_url.trim().is_empty() {
        return Err(AgentError::DeviceNotActivated(
            "Server URL is empty".to_string(),
        ));
    }

    url::Url::parse(&identity.base_url).map_err(|e| {
        AgentError::DeviceNotActivated(format!("Invalid server URL {}: {}", identity.base_url, e))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_activated() {
        assert!(assert_activated(&DeviceIdentity::new("dev-1", "https://mdm.example.com")).is_ok());
        assert!(assert_activated(&DeviceIdentity::new("", "https://mdm.example.com")).is_err());
        assert!(assert_activated(&DeviceIdentity::new("dev-1", "")).is_err());
        assert!(assert_activated(&DeviceIdentity::new("dev-1", "not a url")).is_err());
    }
}
