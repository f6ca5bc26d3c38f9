//! System settings backed by a shell hook

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::models::config::SystemUpdatePolicy;
use crate::platform::shell::CommandTemplate;
use crate::platform::SystemSettings;
use crate::storage::settings::PlatformSettings;

/// A platform switch the engine may toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Gps,
    Bluetooth,
    Wifi,
    MobileData,
    UsbStorage,
    Brightness,
    ScreenTimeout,
    VolumeLock,
    SystemUpdate,
}

impl SettingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKind::Gps => "gps",
            SettingKind::Bluetooth => "bluetooth",
            SettingKind::Wifi => "wifi",
            SettingKind::MobileData => "mobile_data",
            SettingKind::UsbStorage => "usb_storage",
            SettingKind::Brightness => "brightness",
            SettingKind::ScreenTimeout => "screen_timeout",
            SettingKind::VolumeLock => "volume_lock",
            SettingKind::SystemUpdate => "system_update",
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a platform switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Brightness {
        auto: bool,
        #[serde(default)]
        level: Option<i32>,
    },
    Timeout {
        manage: bool,
        #[serde(default)]
        secs: Option<i32>,
    },
    UpdatePolicy(SystemUpdatePolicy),
}

/// System settings driven through `<hook> get {kind}` and `<hook> set {kind} {value}`.
///
/// Without a hook every query answers "unknown" and every change is only logged.
pub struct HookSystemSettings {
    hook: Option<CommandTemplate>,
    factory_reset_cmd: Option<CommandTemplate>,
}

impl HookSystemSettings {
    pub fn new(hook: Option<CommandTemplate>, factory_reset_cmd: Option<CommandTemplate>) -> Self {
        Self {
            hook,
            factory_reset_cmd,
        }
    }

    pub fn from_settings(settings: &PlatformSettings) -> Result<Self, AgentError> {
        Ok(Self::new(
            CommandTemplate::parse_opt(settings.system_hook.as_ref())?,
            CommandTemplate::parse_opt(settings.factory_reset_cmd.as_ref())?,
        ))
    }
}

#[async_trait]
impl SystemSettings for HookSystemSettings {
    async fn current(&self, kind: SettingKind) -> Result<Option<SettingValue>, AgentError> {
        let Some(hook) = &self.hook else {
            return Ok(None);
        };

        let stdout = hook
            .with_args(&["get", kind.as_str()])
            .run(&[])
            .await?;
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(stdout) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Unparseable {} state from system hook: {}", kind, e);
                Ok(None)
            }
        }
    }

    async fn apply(&self, kind: SettingKind, value: &SettingValue) -> Result<(), AgentError> {
        let encoded = serde_json::to_string(value)?;
        let Some(hook) = &self.hook else {
            info!("No system hook configured, not applying {} = {}", kind, encoded);
            return Ok(());
        };

        hook.with_args(&["set", kind.as_str(), &encoded]).run(&[]).await?;
        Ok(())
    }

    async fn factory_reset(&self) -> Result<(), AgentError> {
        let cmd = self.factory_reset_cmd.as_ref().ok_or_else(|| {
            AgentError::ConfigError("no factory reset command configured".to_string())
        })?;
        warn!("Factory reset requested by configuration");
        cmd.run(&[]).await?;
        Ok(())
    }
}
