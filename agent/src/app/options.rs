//! Application configuration options

use std::time::Duration;

use crate::provision::RunnerOptions;
use crate::reconcile::OrchestratorOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{PlatformSettings, Settings};
use crate::workers::poller;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Enable periodic reconciliation
    pub enable_poller: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Poller worker options
    pub poller: poller::Options,

    /// Reconciliation engine options
    pub reconcile: OrchestratorOptions,

    /// Connect/read timeout for management server calls
    pub request_timeout: Duration,

    /// Platform integration hooks
    pub platform: PlatformSettings,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            enable_socket_server: true,
            enable_poller: true,
            server: ServerOptions::default(),
            poller: poller::Options::default(),
            reconcile: OrchestratorOptions::default(),
            request_timeout: Duration::from_secs(10),
            platform: PlatformSettings::default(),
        }
    }
}

impl AppOptions {
    /// Assemble options from the settings file
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let reconcile = &settings.reconcile;
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions { layout },
            enable_socket_server: settings.server.enabled,
            enable_poller: settings.poller.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            poller: poller::Options {
                interval: Duration::from_secs(settings.poller.interval_secs),
                ..Default::default()
            },
            reconcile: OrchestratorOptions {
                extended_build: reconcile.extended_build,
                escalation: reconcile.escalation,
                max_config_age: reconcile.max_config_age_secs.map(Duration::from_secs),
                reinstall_policy: reconcile.reinstall_policy,
                prune_orphans: true,
                settle_delay: Duration::from_millis(reconcile.settle_delay_ms),
                autorun_pause: Duration::from_secs(reconcile.autorun_pause_secs),
                runner: RunnerOptions {
                    auto_retries: reconcile.auto_retries,
                    retry_delay: Duration::from_secs(reconcile.retry_delay_secs),
                },
            },
            request_timeout: Duration::from_secs(reconcile.request_timeout_secs),
            platform: settings.platform.clone(),
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8087,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::settings::EscalationMode;

    #[test]
    fn test_from_settings() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "server": {"enabled": false, "port": 9000},
                "poller": {"interval_secs": 60},
                "reconcile": {"escalation": "attended", "settle_delay_ms": 0, "max_config_age_secs": 3600}
            }"#,
        )
        .unwrap();

        let options = AppOptions::from_settings(StorageLayout::new("/tmp/mdm"), &settings);
        assert!(!options.enable_socket_server);
        assert_eq!(options.server.port, 9000);
        assert_eq!(options.poller.interval, Duration::from_secs(60));
        assert_eq!(options.reconcile.escalation, EscalationMode::Attended);
        assert_eq!(options.reconcile.settle_delay, Duration::ZERO);
        assert_eq!(options.reconcile.max_config_age, Some(Duration::from_secs(3600)));
        assert_eq!(options.request_timeout, Duration::from_secs(10));
    }
}
