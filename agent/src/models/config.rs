//! Device configuration models

use serde::{Deserialize, Serialize};

/// URI prefix of marketplace sourced applications
pub const MARKETPLACE_PREFIX: &str = "market://";

/// Desired state of the device as declared by the management server.
///
/// Every scalar is optional: an absent value means "leave the platform alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    // Display and theme
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub background_image_url: Option<String>,
    pub icon_size: Option<u32>,
    pub title: Option<String>,
    pub orientation: Option<i32>,

    /// Hash of the administrator password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    // Feature toggles
    pub gps: Option<bool>,
    pub bluetooth: Option<bool>,
    pub wifi: Option<bool>,
    pub mobile_data: Option<bool>,
    pub usb_storage: Option<bool>,
    pub auto_brightness: Option<bool>,
    pub brightness: Option<i32>,
    pub manage_timeout: Option<bool>,
    pub timeout: Option<i32>,
    pub lock_volume: Option<bool>,

    // Kiosk
    pub kiosk_mode: Option<bool>,
    pub main_app: Option<String>,
    pub lock_status_bar: Option<bool>,
    pub kiosk_home: Option<bool>,
    pub kiosk_recents: Option<bool>,
    pub kiosk_notifications: Option<bool>,
    pub kiosk_system_info: Option<bool>,
    pub kiosk_keyguard: Option<bool>,

    // System update window
    pub system_update_type: Option<i32>,
    pub system_update_from: Option<String>,
    pub system_update_to: Option<String>,

    // Device actions
    pub factory_reset: Option<bool>,
    pub reboot: Option<bool>,
    pub lock: Option<bool>,
    pub lock_message: Option<String>,

    pub push_options: Option<PushMode>,
    pub request_updates: Option<String>,

    pub applications: Vec<ApplicationSpec>,
    pub files: Vec<FileSpec>,
}

impl DeviceConfig {
    /// Kiosk (unattended) devices must never wait for an operator
    pub fn is_kiosk(&self) -> bool {
        self.kiosk_mode.unwrap_or(false)
    }

    pub fn wants_factory_reset(&self) -> bool {
        self.factory_reset.unwrap_or(false)
    }

    pub fn system_update_policy(&self) -> SystemUpdatePolicy {
        match self.system_update_type {
            Some(1) => SystemUpdatePolicy::Instant,
            Some(2) => SystemUpdatePolicy::Scheduled {
                from: self.system_update_from.clone().unwrap_or_default(),
                to: self.system_update_to.clone().unwrap_or_default(),
            },
            Some(3) => SystemUpdatePolicy::Manual,
            _ => SystemUpdatePolicy::Default,
        }
    }

    /// A copy of this snapshot without the application `pkg`
    pub fn without_application(&self, pkg: &str) -> DeviceConfig {
        let mut next = self.clone();
        next.applications.retain(|app| app.pkg != pkg);
        next
    }

    /// A copy of this snapshot without the file at `path`
    pub fn without_file(&self, path: &str) -> DeviceConfig {
        let mut next = self.clone();
        next.files.retain(|file| file.path != path);
        next
    }
}

/// How the server delivers change notifications to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushMode {
    #[serde(rename = "mqttWorker")]
    MqttWorker,
    #[serde(rename = "mqttAlarm")]
    MqttAlarm,
    #[serde(rename = "polling")]
    Polling,
    #[serde(other)]
    Unknown,
}

/// System update window policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemUpdatePolicy {
    Default,
    Instant,
    Scheduled { from: String, to: String },
    Manual,
}

/// A desired application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationSpec {
    pub pkg: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub remove: bool,
    pub run_after_install: bool,
    pub show_icon: Option<bool>,
    pub screen_order: Option<i32>,
    pub key_code: Option<i32>,
    pub bottom: Option<bool>,
}

/// Where an application package comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppSource<'a> {
    /// Direct download link to a package file
    Direct(&'a str),
    /// Marketplace URI, handed over to the platform store
    Marketplace(&'a str),
    /// No source: the app is considered satisfied as is
    None,
}

impl ApplicationSpec {
    pub fn source(&self) -> AppSource<'_> {
        match self.url.as_deref().map(str::trim) {
            None | Some("") => AppSource::None,
            Some(url) if url.starts_with(MARKETPLACE_PREFIX) => AppSource::Marketplace(url),
            Some(url) => AppSource::Direct(url),
        }
    }

    /// User facing name, falls back to the package id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.pkg)
    }
}

/// A desired file on the managed filesystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSpec {
    /// Destination, relative to the managed files root
    pub path: String,
    pub url: Option<String>,
    /// Lowercase hex SHA-256 of the expected content
    pub checksum: Option<String>,
    pub description: Option<String>,
    pub last_update: Option<i64>,
    pub remove: bool,
}

impl FileSpec {
    /// A removal entry for a file that is no longer desired
    pub fn removal(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            remove: true,
            ..Default::default()
        }
    }
}
