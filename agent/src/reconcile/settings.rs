//! Bring platform switches in line with the configuration

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::gates::GateId;
use crate::models::config::{DeviceConfig, SystemUpdatePolicy};
use crate::platform::{Capabilities, RemoteLog, RemoteLogLevel, SettingKind, SettingValue, SystemSettings};

/// What a settings pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedSettings {
    pub changed: Vec<SettingKind>,
    pub failed: Vec<SettingKind>,
    pub factory_reset: bool,
}

/// Idempotent settings pass, safe to run on every reconciliation
pub struct SystemSettingsApplier {
    system: Arc<dyn SystemSettings>,
    caps: Arc<dyn Capabilities>,
    remote_log: Arc<dyn RemoteLog>,
}

impl SystemSettingsApplier {
    pub fn new(
        system: Arc<dyn SystemSettings>,
        caps: Arc<dyn Capabilities>,
        remote_log: Arc<dyn RemoteLog>,
    ) -> Self {
        Self {
            system,
            caps,
            remote_log,
        }
    }

    /// Apply every desired switch that differs from the platform state.
    ///
    /// Failures are reported but never stop the pipeline.
    pub async fn apply(&self, config: &DeviceConfig) -> AppliedSettings {
        let mut applied = AppliedSettings::default();

        if config.wants_factory_reset() {
            applied.factory_reset = self.factory_reset().await;
        }

        let device_owner = self.caps.is_device_owner().await;
        for (kind, value) in desired_settings(config, device_owner) {
            let current = match self.system.current(kind).await {
                Ok(current) => current,
                Err(e) => {
                    debug!("Cannot read {}: {}", kind, e);
                    None
                }
            };
            if current.as_ref() == Some(&value) {
                continue;
            }

            match self.system.apply(kind, &value).await {
                Ok(()) => {
                    info!("Applied {} = {:?}", kind, value);
                    applied.changed.push(kind);
                }
                Err(e) => {
                    warn!("Failed to apply {}: {}", kind, e);
                    self.remote_log
                        .log(RemoteLogLevel::Warn, format!("Failed to apply {}: {}", kind, e));
                    applied.failed.push(kind);
                }
            }
        }
        applied
    }

    /// Requires an active device admin
    async fn factory_reset(&self) -> bool {
        if !self.caps.request_capability(GateId::DeviceAdmin).await {
            warn!("Factory reset requested but device admin is not active");
            self.remote_log.log(
                RemoteLogLevel::Warn,
                "Factory reset requested but device admin is not active".to_string(),
            );
            return false;
        }

        self.remote_log
            .log(RemoteLogLevel::Info, "Factory reset requested".to_string());
        match self.system.factory_reset().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Factory reset failed: {}", e);
                self.remote_log
                    .log(RemoteLogLevel::Error, format!("Factory reset failed: {}", e));
                false
            }
        }
    }
}

/// Switches the configuration sets, in application order
pub fn desired_settings(config: &DeviceConfig, device_owner: bool) -> Vec<(SettingKind, SettingValue)> {
    let mut desired = Vec::new();
    let flags = [
        (SettingKind::Gps, config.gps),
        (SettingKind::Bluetooth, config.bluetooth),
        (SettingKind::Wifi, config.wifi),
        (SettingKind::MobileData, config.mobile_data),
        (SettingKind::UsbStorage, config.usb_storage),
    ];
    desired.extend(
        flags
            .into_iter()
            .filter_map(|(kind, flag)| flag.map(|on| (kind, SettingValue::Flag(on)))),
    );

    if config.auto_brightness.is_some() || config.brightness.is_some() {
        desired.push((
            SettingKind::Brightness,
            SettingValue::Brightness {
                auto: config.auto_brightness.unwrap_or(false),
                level: config.brightness,
            },
        ));
    }

    if let Some(manage) = config.manage_timeout {
        desired.push((
            SettingKind::ScreenTimeout,
            SettingValue::Timeout {
                manage,
                secs: config.timeout,
            },
        ));
    }

    if let Some(lock) = config.lock_volume {
        desired.push((SettingKind::VolumeLock, SettingValue::Flag(lock)));
    }

    let policy = config.system_update_policy();
    if device_owner && policy != SystemUpdatePolicy::Default {
        desired.push((SettingKind::SystemUpdate, SettingValue::UpdatePolicy(policy)));
    }
    desired
}
