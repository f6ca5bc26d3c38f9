//! In-memory platform fakes shared by the integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use mdmagent::config::{ConfigStore, StoredConfig};
use mdmagent::errors::AgentError;
use mdmagent::gates::GateId;
use mdmagent::models::config::DeviceConfig;
use mdmagent::platform::{
    Capabilities, ConfigSource, DownloadProgress, Downloader, NotificationSink, PackageManager,
    ProgressFn, RawResponse, RemoteLog, RemoteLogLevel, SettingKind, SettingValue,
    SystemSettings,
};
use mdmagent::provision::{ProvisioningState, RunnerOptions};
use mdmagent::reconcile::{Orchestrator, OrchestratorOptions, PlatformHandles};
use mdmagent::storage::device::DeviceIdentity;
use mdmagent::storage::layout::StorageLayout;
use mdmagent::storage::prefs::PrefsStore;
use mdmagent::storage::records::JsonFileRecords;
use mdmagent::storage::settings::EscalationMode;

pub const PRIMARY: &str = "http://primary.test";
pub const SECONDARY: &str = "http://secondary.test";

// ================================ CAPABILITIES ================================== //

pub struct FakeCaps {
    pub device_owner: AtomicBool,
    pub denied: Mutex<BTreeSet<GateId>>,
}

impl FakeCaps {
    pub fn new() -> Self {
        Self {
            device_owner: AtomicBool::new(false),
            denied: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn deny(&self, gate: GateId) {
        self.denied.lock().unwrap().insert(gate);
    }

    pub fn grant(&self, gate: GateId) {
        self.denied.lock().unwrap().remove(&gate);
    }
}

#[async_trait]
impl Capabilities for FakeCaps {
    async fn is_device_owner(&self) -> bool {
        self.device_owner.load(Ordering::SeqCst)
    }

    async fn request_capability(&self, gate: GateId) -> bool {
        !self.denied.lock().unwrap().contains(&gate)
    }
}

// ================================== PACKAGES ==================================== //

pub struct FakePackages {
    pub installed: Mutex<BTreeMap<String, Option<String>>>,
    pub failing: Mutex<BTreeSet<String>>,
    /// `install:<pkg>`, `uninstall:<pkg>`, `market:<pkg>` and `launch:<pkg>` in call order
    pub calls: Mutex<Vec<String>>,
}

impl FakePackages {
    pub fn new() -> Self {
        Self {
            installed: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(BTreeSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn preinstall(&self, package: &str, version: Option<&str>) {
        self.installed
            .lock()
            .unwrap()
            .insert(package.to_string(), version.map(str::to_string));
    }

    pub fn fail(&self, package: &str) {
        self.failing.lock().unwrap().insert(package.to_string());
    }

    pub fn heal(&self, package: &str) {
        self.failing.lock().unwrap().remove(package);
    }

    pub fn is_installed(&self, package: &str) -> bool {
        self.installed.lock().unwrap().contains_key(package)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String, package: &str) -> Result<(), AgentError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(package) {
            return Err(AgentError::install_failed(package, "rejected by platform"));
        }
        Ok(())
    }

    fn install(&self, file: &Path, package: &str) -> Result<(), AgentError> {
        if !file.exists() {
            return Err(AgentError::install_failed(package, "package file missing"));
        }
        self.record(format!("install:{}", package), package)?;
        self.preinstall(package, None);
        Ok(())
    }

    fn uninstall(&self, package: &str) -> Result<(), AgentError> {
        self.record(format!("uninstall:{}", package), package)?;
        self.installed.lock().unwrap().remove(package);
        Ok(())
    }
}

#[async_trait]
impl PackageManager for FakePackages {
    async fn installed_packages(&self) -> Result<BTreeSet<String>, AgentError> {
        Ok(self.installed.lock().unwrap().keys().cloned().collect())
    }

    async fn package_version(&self, package: &str) -> Result<Option<String>, AgentError> {
        Ok(self.installed.lock().unwrap().get(package).cloned().flatten())
    }

    async fn install_silently(&self, file: &Path, package: &str) -> Result<(), AgentError> {
        self.install(file, package)
    }

    async fn install_interactive(&self, file: &Path, package: &str) -> Result<(), AgentError> {
        self.install(file, package)
    }

    async fn uninstall_silently(&self, package: &str) -> Result<(), AgentError> {
        self.uninstall(package)
    }

    async fn uninstall_interactive(&self, package: &str) -> Result<(), AgentError> {
        self.uninstall(package)
    }

    async fn install_from_marketplace(&self, _uri: &str, package: &str) -> Result<(), AgentError> {
        self.record(format!("market:{}", package), package)?;
        self.preinstall(package, None);
        Ok(())
    }

    async fn launch(&self, package: &str) -> Result<(), AgentError> {
        self.calls.lock().unwrap().push(format!("launch:{}", package));
        Ok(())
    }
}

// ================================= DOWNLOADER =================================== //

/// Writes `content of <url>` (or a configured body) to a temp file
pub struct FakeDownloader {
    dir: PathBuf,
    pub bodies: Mutex<BTreeMap<String, Vec<u8>>>,
    pub failing: Mutex<BTreeSet<String>>,
    pub calls: Mutex<Vec<String>>,
    pub delay: Mutex<Duration>,
    counter: AtomicUsize,
}

impl FakeDownloader {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            bodies: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(BTreeSet::new()),
            calls: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn body_for(url: &str) -> Vec<u8> {
        format!("content of {}", url).into_bytes()
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn heal(&self, url: &str) {
        self.failing.lock().unwrap().remove(url);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download_to_temp(
        &self,
        url: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, AgentError> {
        self.calls.lock().unwrap().push(url.to_string());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(url) {
            return Err(AgentError::Internal(format!("{} is unreachable", url)));
        }

        let body = self
            .bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Self::body_for(url));
        let total = body.len() as u64;
        on_progress(DownloadProgress::new(total, total / 2));

        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("download-{}.part", index));
        tokio::fs::write(&path, &body).await?;
        on_progress(DownloadProgress::new(total, total));
        Ok(path)
    }
}

// =============================== CONFIG SOURCE ================================== //

#[derive(Debug, Clone)]
pub enum Scripted {
    Answer(u16, String),
    Down,
}

/// Answers per base URL; unknown URLs are down
pub struct ScriptedSource {
    pub answers: Mutex<BTreeMap<String, Scripted>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            answers: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(&self, base_url: &str, answer: Scripted) {
        self.answers
            .lock()
            .unwrap()
            .insert(base_url.to_string(), answer);
    }

    pub fn serve(&self, base_url: &str, config: &serde_json::Value) {
        let body = serde_json::json!({"status": "OK", "data": config}).to_string();
        self.answer(base_url, Scripted::Answer(200, body));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigSource for ScriptedSource {
    async fn fetch_config(
        &self,
        base_url: &str,
        _project: &str,
        _device_id: &str,
    ) -> Result<RawResponse, AgentError> {
        self.calls.lock().unwrap().push(base_url.to_string());
        let answer = self.answers.lock().unwrap().get(base_url).cloned();
        match answer {
            Some(Scripted::Answer(status, body)) => Ok(RawResponse {
                status,
                body: Some(body),
            }),
            Some(Scripted::Down) | None => {
                Err(AgentError::ServerError(format!("{} is down", base_url)))
            }
        }
    }
}

// ============================== SYSTEM SETTINGS ================================= //

pub struct FakeSystem {
    pub state: Mutex<BTreeMap<SettingKind, SettingValue>>,
    pub applied: Mutex<Vec<SettingKind>>,
    pub factory_resets: AtomicUsize,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BTreeMap::new()),
            applied: Mutex::new(Vec::new()),
            factory_resets: AtomicUsize::new(0),
        }
    }

    pub fn applied(&self) -> Vec<SettingKind> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl SystemSettings for FakeSystem {
    async fn current(&self, kind: SettingKind) -> Result<Option<SettingValue>, AgentError> {
        Ok(self.state.lock().unwrap().get(&kind).cloned())
    }

    async fn apply(&self, kind: SettingKind, value: &SettingValue) -> Result<(), AgentError> {
        self.applied.lock().unwrap().push(kind);
        self.state.lock().unwrap().insert(kind, value.clone());
        Ok(())
    }

    async fn factory_reset(&self) -> Result<(), AgentError> {
        self.factory_resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================ NOTIFICATIONS / LOGS ============================== //

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Ready,
    GateBlocked(GateId),
    Progress(String),
    ItemFailed(String, bool),
    Fatal(String),
    Stale(Duration),
}

pub struct RecordingSink {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| matches(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl NotificationSink for RecordingSink {
    fn on_ready(&self, _config: &DeviceConfig) {
        self.push(Event::Ready);
    }

    fn on_gate_blocked(&self, gate: GateId) {
        self.push(Event::GateBlocked(gate));
    }

    fn on_provisioning_progress(&self, message: &str, _pct: Option<u8>) {
        self.push(Event::Progress(message.to_string()));
    }

    fn on_item_failed(&self, item: &str, is_file: bool, _error: &AgentError) {
        self.push(Event::ItemFailed(item.to_string(), is_file));
    }

    fn on_fatal(&self, error: &AgentError) {
        self.push(Event::Fatal(error.to_string()));
    }

    fn on_config_stale(&self, age: Duration) {
        self.push(Event::Stale(age));
    }
}

pub struct RecordingRemoteLog {
    pub entries: Mutex<Vec<(RemoteLogLevel, String)>>,
}

impl RecordingRemoteLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn contains(&self, level: RemoteLogLevel, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl RemoteLog for RecordingRemoteLog {
    fn log(&self, level: RemoteLogLevel, message: String) {
        self.entries.lock().unwrap().push((level, message));
    }
}

// ================================== HARNESS ===================================== //

pub fn test_options() -> OrchestratorOptions {
    OrchestratorOptions {
        escalation: EscalationMode::Attended,
        settle_delay: Duration::ZERO,
        autorun_pause: Duration::from_millis(10),
        runner: RunnerOptions {
            auto_retries: 0,
            retry_delay: Duration::ZERO,
        },
        ..Default::default()
    }
}

pub fn identity() -> DeviceIdentity {
    DeviceIdentity {
        device_id: "dev-1".to_string(),
        project: String::new(),
        base_url: PRIMARY.to_string(),
        secondary_base_url: Some(SECONDARY.to_string()),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub layout: StorageLayout,
    pub caps: Arc<FakeCaps>,
    pub packages: Arc<FakePackages>,
    pub downloader: Arc<FakeDownloader>,
    pub records: Arc<JsonFileRecords>,
    pub source: Arc<ScriptedSource>,
    pub system: Arc<FakeSystem>,
    pub sink: Arc<RecordingSink>,
    pub remote_log: Arc<RecordingRemoteLog>,
    pub prefs: Arc<PrefsStore>,
    pub store: Arc<ConfigStore>,
    pub orchestrator: Arc<Orchestrator>,
}

pub struct HarnessBuilder {
    options: OrchestratorOptions,
    identity: Option<DeviceIdentity>,
    seed: Option<StoredConfig>,
}

impl HarnessBuilder {
    pub fn options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn without_identity(mut self) -> Self {
        self.identity = None;
        self
    }

    /// Persist a configuration snapshot before the store is loaded
    pub fn seed(mut self, stored: StoredConfig) -> Self {
        self.seed = Some(stored);
        self
    }

    pub async fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.setup().await.unwrap();

        if let Some(seed) = &self.seed {
            layout.config_file().write_json(seed).await.unwrap();
        }

        let prefs = Arc::new(PrefsStore::load(layout.prefs_file()).await.unwrap());
        if let Some(identity) = self.identity {
            prefs.set_identity(identity).await.unwrap();
        }
        let store = Arc::new(ConfigStore::load(layout.config_file()).await.unwrap());
        let records = Arc::new(
            JsonFileRecords::load(layout.file_records_file())
                .await
                .unwrap(),
        );

        let caps = Arc::new(FakeCaps::new());
        let packages = Arc::new(FakePackages::new());
        let downloader = Arc::new(FakeDownloader::new(layout.downloads_dir().path().to_path_buf()));
        let source = Arc::new(ScriptedSource::new());
        let system = Arc::new(FakeSystem::new());
        let sink = Arc::new(RecordingSink::new());
        let remote_log = Arc::new(RecordingRemoteLog::new());

        let platform = PlatformHandles {
            caps: caps.clone(),
            packages: packages.clone(),
            downloader: downloader.clone(),
            records: records.clone(),
            config_source: source.clone(),
            system: system.clone(),
            notifier: sink.clone(),
            remote_log: remote_log.clone(),
        };
        let orchestrator = Arc::new(Orchestrator::new(
            prefs.clone(),
            store.clone(),
            Arc::new(ProvisioningState::new()),
            layout.files_dir(),
            platform,
            self.options,
        ));

        Harness {
            dir,
            layout,
            caps,
            packages,
            downloader,
            records,
            source,
            system,
            sink,
            remote_log,
            prefs,
            store,
            orchestrator,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            options: test_options(),
            identity: Some(identity()),
            seed: None,
        }
    }

    pub async fn new() -> Harness {
        Self::builder().build().await
    }

    pub fn serve(&self, config: serde_json::Value) {
        self.source.serve(PRIMARY, &config);
    }

    pub fn managed_file(&self, path: &str) -> PathBuf {
        self.layout.files_dir().path().join(path)
    }
}
