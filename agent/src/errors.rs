//! Error types for the device agent

use thiserror::Error;

/// Main error type for the device agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// A capability gate is unresolved or was declined while required
    #[error("Gate denied: {0}")]
    GateDenied(String),

    /// The management server answered but refused the request
    #[error("Configuration rejected by server: {0}")]
    FetchRejected(String),

    /// Neither endpoint could be reached
    #[error("Management server unreachable: {0}")]
    FetchUnreachable(String),

    /// A single queue item could not be provisioned (download, move, verify)
    #[error("Provisioning of {item} failed: {reason}")]
    ProvisioningItemFailed { item: String, reason: String },

    /// The platform refused to install or uninstall a package
    #[error("Install error for {package}: {reason}")]
    InstallPlatformError { package: String, reason: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Device not activated: {0}")]
    DeviceNotActivated(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Build an item failure for a queue entry
    pub fn item_failed(item: impl Into<String>, reason: impl ToString) -> Self {
        AgentError::ProvisioningItemFailed {
            item: item.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a platform install failure for a package
    pub fn install_failed(package: impl Into<String>, reason: impl ToString) -> Self {
        AgentError::InstallPlatformError {
            package: package.into(),
            reason: reason.to_string(),
        }
    }

    /// Platform install errors always wait for the operator, whatever the escalation policy
    pub fn requires_operator(&self) -> bool {
        matches!(self, AgentError::InstallPlatformError { .. })
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AgentError::install_failed("com.foo", "denied").requires_operator());
        assert!(!AgentError::item_failed("a.txt", "404").requires_operator());
    }

    #[test]
    fn test_item_failed_message() {
        let err = AgentError::item_failed("a.txt", "checksum mismatch");
        assert_eq!(err.to_string(), "Provisioning of a.txt failed: checksum mismatch");
    }
}
