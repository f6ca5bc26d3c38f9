//! Settings file management

use serde::{Deserialize, Serialize};

use crate::gates::GateId;
use crate::logs::LogLevel;
use crate::provision::planner::ReinstallPolicy;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Local operator API
    #[serde(default)]
    pub server: ServerSettings,

    /// Periodic reconciliation
    #[serde(default)]
    pub poller: PollerSettings,

    /// Reconciliation tuning
    #[serde(default)]
    pub reconcile: ReconcileSettings,

    /// Platform integration hooks
    #[serde(default)]
    pub platform: PlatformSettings,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            server: ServerSettings::default(),
            poller: PollerSettings::default(),
            reconcile: ReconcileSettings::default(),
            platform: PlatformSettings::default(),
        }
    }
}

/// Local operator API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8087
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Periodic poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Polling interval in seconds
    #[serde(default = "default_polling_interval")]
    pub interval_secs: u64,
}

fn default_polling_interval() -> u64 {
    900
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_polling_interval(),
        }
    }
}

/// Who resolves provisioning failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationMode {
    /// Follow the kiosk flag of the active configuration
    #[default]
    Auto,
    Attended,
    Unattended,
}

/// Reconciliation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Usage-access and accessibility gates are enforced
    #[serde(default = "default_extended_build")]
    pub extended_build: bool,

    #[serde(default)]
    pub escalation: EscalationMode,

    /// Cached configuration older than this raises a staleness alert on fallback
    #[serde(default)]
    pub max_config_age_secs: Option<u64>,

    #[serde(default)]
    pub reinstall_policy: ReinstallPolicy,

    /// Cosmetic pause applied after each configuration request
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Connect/read timeout for management server calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Automatic attempts per item before escalating
    #[serde(default)]
    pub auto_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Pause between launches of run-after-install apps
    #[serde(default = "default_autorun_pause")]
    pub autorun_pause_secs: u64,
}

fn default_extended_build() -> bool {
    cfg!(feature = "extended")
}

fn default_settle_delay() -> u64 {
    1500
}

fn default_request_timeout() -> u64 {
    10
}

fn default_retry_delay() -> u64 {
    5
}

fn default_autorun_pause() -> u64 {
    5
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            extended_build: default_extended_build(),
            escalation: EscalationMode::default(),
            max_config_age_secs: None,
            reinstall_policy: ReinstallPolicy::default(),
            settle_delay_ms: default_settle_delay(),
            request_timeout_secs: default_request_timeout(),
            auto_retries: 0,
            retry_delay_secs: default_retry_delay(),
            autorun_pause_secs: default_autorun_pause(),
        }
    }
}

/// Platform integration settings.
///
/// Command templates are split on whitespace; `{file}`, `{package}`, `{uri}`,
/// `{kind}` and `{value}` placeholders are substituted per invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// The agent is the device owner (silent installs allowed)
    #[serde(default)]
    pub device_owner: bool,

    /// Capabilities granted without asking the capability hook
    #[serde(default)]
    pub granted_capabilities: Vec<GateId>,

    /// `<hook> {kind}`: exit status 0 means granted
    #[serde(default)]
    pub capability_hook: Option<String>,

    /// `<hook> get {kind}` prints JSON, `<hook> set {kind} {value}` applies
    #[serde(default)]
    pub system_hook: Option<String>,

    /// Invoked on a factory reset request
    #[serde(default)]
    pub factory_reset_cmd: Option<String>,

    #[serde(default)]
    pub packages: PackageCommands,
}

/// Package manager command templates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageCommands {
    /// Prints `<package> [version]` per line
    #[serde(default)]
    pub list: Option<String>,

    #[serde(default)]
    pub install: Option<String>,

    #[serde(default)]
    pub install_interactive: Option<String>,

    #[serde(default)]
    pub uninstall: Option<String>,

    #[serde(default)]
    pub uninstall_interactive: Option<String>,

    #[serde(default)]
    pub marketplace: Option<String>,

    #[serde(default)]
    pub launch: Option<String>,
}
