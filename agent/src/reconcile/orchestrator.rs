//! Top-level reconciliation driver.
//!
//! A pass walks gates, fetch, system settings, the file queue and then the
//! application queue. Only one pass runs at a time; a trigger that arrives
//! while a pass is in flight is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigFetcher, ConfigStore, FetchResult, StoredConfig};
use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::gates::{GateChain, GateId, GateOutcome};
use crate::models::config::DeviceConfig;
use crate::platform::{
    Capabilities, ConfigSource, Downloader, FileRecordStore, NotificationSink, PackageManager,
    RemoteLog, RemoteLogLevel, SystemSettings,
};
use crate::provision::{
    plan_applications, plan_files, AppExecutor, DrainOutcome, EscalationPolicy, FileExecutor,
    InstalledPackages, ProvisioningState, QueueItem, QueueKind, QueueRunner, ReinstallPolicy,
    RunnerOptions,
};
use crate::reconcile::fsm::{ReconcileEvent, ReconcileFsm, ReconcileState};
use crate::reconcile::settings::SystemSettingsApplier;
use crate::storage::device::assert_activated;
use crate::storage::prefs::PrefsStore;
use crate::storage::settings::EscalationMode;

/// Platform collaborators the engine drives
#[derive(Clone)]
pub struct PlatformHandles {
    pub caps: Arc<dyn Capabilities>,
    pub packages: Arc<dyn PackageManager>,
    pub downloader: Arc<dyn Downloader>,
    pub records: Arc<dyn FileRecordStore>,
    pub config_source: Arc<dyn ConfigSource>,
    pub system: Arc<dyn SystemSettings>,
    pub notifier: Arc<dyn NotificationSink>,
    pub remote_log: Arc<dyn RemoteLog>,
}

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub extended_build: bool,
    pub escalation: EscalationMode,
    /// Cached configuration older than this raises a staleness alert
    pub max_config_age: Option<Duration>,
    pub reinstall_policy: ReinstallPolicy,
    /// Plan removals for recorded files the configuration no longer lists
    pub prune_orphans: bool,
    pub settle_delay: Duration,
    pub autorun_pause: Duration,
    pub runner: RunnerOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            extended_build: false,
            escalation: EscalationMode::Auto,
            max_config_age: None,
            reinstall_policy: ReinstallPolicy::Never,
            prune_orphans: true,
            settle_delay: Duration::from_millis(1500),
            autorun_pause: Duration::from_secs(5),
            runner: RunnerOptions::default(),
        }
    }
}

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PassOutcome {
    Ready,
    /// Another pass is in flight, nothing was done
    AlreadyRunning,
    GateBlocked(GateId),
    /// An item waits for retry or skip
    AwaitingOperator(String),
    Rejected(String),
    Unreachable(String),
    NotConfigured(String),
}

/// Operator decision for a blocked item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Retry,
    Skip,
}

/// Operator facing view of the engine
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub state: ReconcileState,
    pub reconciling: bool,
    pub initialized: bool,
    pub error: Option<String>,
    pub blocked_item: Option<String>,
    pub blocked_queue: Option<QueueKind>,
    pub pending_files: Vec<String>,
    pub pending_apps: Vec<String>,
    pub pending_run: Vec<String>,
    pub config_fetched_at: Option<DateTime<Utc>>,
}

/// Resets the reconciling flag when the pass ends, however it ends
struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct Orchestrator {
    prefs: Arc<PrefsStore>,
    store: Arc<ConfigStore>,
    state: Arc<ProvisioningState>,
    gates: GateChain,
    fetcher: ConfigFetcher,
    settings: SystemSettingsApplier,
    runner: QueueRunner,
    files: FileExecutor,
    apps: AppExecutor,
    platform: PlatformHandles,
    options: OrchestratorOptions,

    fsm: Mutex<ReconcileFsm>,
    blocked_on: Mutex<Option<QueueKind>>,
    reconciling: AtomicBool,
    initialized: AtomicBool,
    autorun: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        prefs: Arc<PrefsStore>,
        store: Arc<ConfigStore>,
        state: Arc<ProvisioningState>,
        files_dir: Dir,
        platform: PlatformHandles,
        options: OrchestratorOptions,
    ) -> Self {
        let gates = GateChain::new(prefs.clone(), platform.caps.clone(), options.extended_build);
        let fetcher = ConfigFetcher::new(
            platform.config_source.clone(),
            store.clone(),
            options.settle_delay,
        );
        let settings = SystemSettingsApplier::new(
            platform.system.clone(),
            platform.caps.clone(),
            platform.remote_log.clone(),
        );
        let runner = QueueRunner::new(
            state.clone(),
            store.clone(),
            platform.notifier.clone(),
            platform.remote_log.clone(),
            options.runner.clone(),
        );
        let files = FileExecutor::new(
            platform.downloader.clone(),
            platform.records.clone(),
            files_dir,
            platform.notifier.clone(),
            platform.remote_log.clone(),
        );
        let apps = AppExecutor::new(
            platform.packages.clone(),
            platform.downloader.clone(),
            platform.caps.clone(),
            platform.notifier.clone(),
            platform.remote_log.clone(),
        );

        Self {
            prefs,
            store,
            state,
            gates,
            fetcher,
            settings,
            runner,
            files,
            apps,
            platform,
            options,
            fsm: Mutex::new(ReconcileFsm::new()),
            blocked_on: Mutex::new(None),
            reconciling: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            autorun: Mutex::new(None),
        }
    }

    pub fn gates(&self) -> &GateChain {
        &self.gates
    }

    pub fn prefs(&self) -> &Arc<PrefsStore> {
        &self.prefs
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn provisioning(&self) -> &Arc<ProvisioningState> {
        &self.state
    }

    pub fn is_reconciling(&self) -> bool {
        self.reconciling.load(Ordering::SeqCst)
    }

    /// A pass reached Ready since process start
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ReconcileState {
        self.lock_fsm().state()
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let config_fetched_at = self.store.current().await.map(|stored| stored.fetched_at);
        let (state, error, blocked_item) = {
            let fsm = self.lock_fsm();
            (
                fsm.state(),
                fsm.error().map(str::to_string),
                fsm.blocked_item().map(str::to_string),
            )
        };
        OrchestratorStatus {
            state,
            reconciling: self.is_reconciling(),
            initialized: self.is_initialized(),
            error,
            blocked_item,
            blocked_queue: *self.lock_blocked(),
            pending_files: self.state.files.snapshot().iter().map(|f| f.key().to_string()).collect(),
            pending_apps: self.state.apps.snapshot().iter().map(|a| a.key().to_string()).collect(),
            pending_run: self.state.pending_run(),
            config_fetched_at,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// With `force` an unreachable server is fatal even when a cached
    /// configuration exists.
    pub async fn trigger(&self, force: bool) -> Result<PassOutcome, AgentError> {
        let Some(_guard) = self.begin_pass() else {
            debug!("Reconciliation already running, trigger ignored");
            return Ok(PassOutcome::AlreadyRunning);
        };

        let result = self.run_pass(force).await;
        self.settle(result)
    }

    /// Resume after the operator decided on a blocked item
    pub async fn resolve(&self, resolution: Resolution) -> Result<PassOutcome, AgentError> {
        let Some(_guard) = self.begin_pass() else {
            return Ok(PassOutcome::AlreadyRunning);
        };

        let kind = self.lock_blocked().take().ok_or_else(|| {
            AgentError::InvalidTransition("no provisioning item is waiting".to_string())
        })?;

        if resolution == Resolution::Skip {
            let skipped = match kind {
                QueueKind::Files => self.runner.skip_head(&self.state.files).await?.map(|f| f.path),
                QueueKind::Apps => self.runner.skip_head(&self.state.apps).await?.map(|a| a.pkg),
            };
            if let Some(item) = skipped {
                info!("Operator skipped {}", item);
            }
        } else {
            info!("Operator retries blocked {:?} item", kind);
        }

        self.transition(ReconcileEvent::Resume(kind))?;
        let result = self.provision_from(kind).await;
        self.settle(result)
    }

    /// Forget the device identity after a fatal error
    pub async fn reset_identity(&self) -> Result<(), AgentError> {
        warn!("Device identity reset by operator");
        self.prefs.reset_identity().await
    }

    /// Wait for the post-ready launches of the last pass
    pub async fn wait_autorun(&self) {
        let handle = self
            .autorun
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Autorun task failed: {}", e);
            }
        }
    }

    fn begin_pass(&self) -> Option<PassGuard<'_>> {
        self.reconciling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PassGuard {
                flag: &self.reconciling,
            })
    }

    /// Unexpected errors end the pass in Failed
    fn settle(&self, result: Result<PassOutcome, AgentError>) -> Result<PassOutcome, AgentError> {
        if let Err(e) = &result {
            error!("Reconciliation failed: {}", e);
            if self.lock_fsm().state().is_active() {
                let _ = self.transition(ReconcileEvent::Abort(e.to_string()));
            }
            self.platform.notifier.on_fatal(e);
            self.platform
                .remote_log
                .log(RemoteLogLevel::Error, format!("Reconciliation failed: {}", e));
        }
        result
    }

    async fn run_pass(&self, force: bool) -> Result<PassOutcome, AgentError> {
        if !self.is_initialized() {
            self.platform
                .notifier
                .on_provisioning_progress("Loading configuration", None);
        }
        self.lock_blocked().take();
        self.transition(ReconcileEvent::Start)?;

        if let GateOutcome::GateFailed { gate, .. } = self.gates.evaluate_next().await? {
            self.transition(ReconcileEvent::GateFailed)?;
            self.platform.notifier.on_gate_blocked(gate);
            return Ok(PassOutcome::GateBlocked(gate));
        }
        self.transition(ReconcileEvent::GatesPassed)?;

        let identity = self.prefs.identity().await;
        if let Err(e) = assert_activated(&identity) {
            self.transition(ReconcileEvent::FetchFailed(e.to_string()))?;
            self.platform.notifier.on_fatal(&e);
            return Ok(PassOutcome::NotConfigured(e.to_string()));
        }

        let fetched = self.fetcher.fetch(&identity).await?;
        match &fetched {
            FetchResult::Success(_) => {
                self.transition(ReconcileEvent::Fetched)?;
            }
            FetchResult::Rejected(msg) => {
                self.fail_fetch(&fetched)?;
                return Ok(PassOutcome::Rejected(msg.clone()));
            }
            FetchResult::NetworkUnreachable(msg) => {
                self.platform.remote_log.log(
                    RemoteLogLevel::Warn,
                    format!("Configuration server unreachable: {}", msg),
                );
                return match self.store.current().await {
                    Some(stored) if !force => self.fall_back(&stored),
                    _ => {
                        self.fail_fetch(&fetched)?;
                        Ok(PassOutcome::Unreachable(msg.clone()))
                    }
                };
            }
        }

        let config = self.current_config().await?;
        let applied = self.settings.apply(&config).await;
        if !applied.changed.is_empty() {
            debug!("Settings changed: {:?}", applied.changed);
        }
        self.transition(ReconcileEvent::SettingsApplied)?;

        self.plan_files(&config).await?;
        self.provision_from(QueueKind::Files).await
    }

    fn fail_fetch(&self, fetched: &FetchResult) -> Result<(), AgentError> {
        let Some(e) = fetched.error() else {
            return Ok(());
        };
        self.transition(ReconcileEvent::FetchFailed(e.to_string()))?;
        self.platform.notifier.on_fatal(&e);
        self.platform
            .remote_log
            .log(RemoteLogLevel::Error, e.to_string());
        Ok(())
    }

    /// Unreachable server with a cached configuration: go straight to Ready
    fn fall_back(&self, stored: &StoredConfig) -> Result<PassOutcome, AgentError> {
        let age = stored.age();
        info!("Using cached configuration ({}s old)", age.as_secs());

        if let Some(max_age) = self.options.max_config_age {
            if age > max_age {
                self.platform.remote_log.log(
                    RemoteLogLevel::Warn,
                    format!("Using stale configuration, {}s old", age.as_secs()),
                );
                self.platform.notifier.on_config_stale(age);
            }
        }

        self.transition(ReconcileEvent::UseCached)?;
        self.finish(&stored.config);
        Ok(PassOutcome::Ready)
    }

    /// Drain from the given queue onwards: files first, then applications
    async fn provision_from(&self, kind: QueueKind) -> Result<PassOutcome, AgentError> {
        let policy = self.escalation_policy().await;

        if kind == QueueKind::Files {
            let outcome = self.runner.drain(&self.state.files, &self.files, policy).await?;
            if let Some(blocked) = self.blocked(QueueKind::Files, outcome)? {
                return Ok(blocked);
            }
            self.transition(ReconcileEvent::FilesDrained)?;

            let config = self.current_config().await?;
            self.plan_applications(&config).await?;
        }

        let outcome = self.runner.drain(&self.state.apps, &self.apps, policy).await?;
        if let Some(blocked) = self.blocked(QueueKind::Apps, outcome)? {
            return Ok(blocked);
        }
        self.transition(ReconcileEvent::AppsDrained)?;

        let config = self.current_config().await?;
        self.platform
            .remote_log
            .log(RemoteLogLevel::Info, "Configuration updated".to_string());
        self.finish(&config);
        Ok(PassOutcome::Ready)
    }

    /// Map a drain outcome to a pass outcome when the pass cannot continue
    fn blocked<T: QueueItem>(
        &self,
        kind: QueueKind,
        outcome: DrainOutcome<T>,
    ) -> Result<Option<PassOutcome>, AgentError> {
        match outcome {
            DrainOutcome::Drained { skipped } => {
                for item in &skipped {
                    warn!("Skipped {} after failure", item.key());
                }
                Ok(None)
            }
            DrainOutcome::Blocked { item, .. } => {
                self.transition(ReconcileEvent::ItemBlocked(item.key().to_string()))?;
                *self.lock_blocked() = Some(kind);
                Ok(Some(PassOutcome::AwaitingOperator(item.key().to_string())))
            }
            DrainOutcome::Busy => Err(AgentError::Internal(format!(
                "{:?} queue is drained by someone else",
                kind
            ))),
        }
    }

    async fn plan_files(&self, config: &DeviceConfig) -> Result<(), AgentError> {
        let recorded = self.platform.records.all().await?;
        let plan = plan_files(&config.files, &recorded, self.options.prune_orphans);
        info!("{} file operations planned", plan.len());
        self.state.files.replace(plan);
        Ok(())
    }

    async fn plan_applications(&self, config: &DeviceConfig) -> Result<(), AgentError> {
        let installed = self.installed_packages(config).await?;
        let plan = plan_applications(&config.applications, &installed, self.options.reinstall_policy);
        info!("{} application operations planned", plan.len());
        self.state.apps.replace(plan);
        Ok(())
    }

    async fn installed_packages(&self, config: &DeviceConfig) -> Result<InstalledPackages, AgentError> {
        if config.applications.is_empty() {
            return Ok(InstalledPackages::new());
        }

        let packages = self.platform.packages.installed_packages().await?;
        let mut installed = InstalledPackages::new();
        for package in packages {
            let version = if self.options.reinstall_policy == ReinstallPolicy::VersionMismatch {
                self.platform.packages.package_version(&package).await?
            } else {
                None
            };
            installed.insert(package, version);
        }
        Ok(installed)
    }

    async fn escalation_policy(&self) -> EscalationPolicy {
        match self.options.escalation {
            EscalationMode::Attended => EscalationPolicy::Attended,
            EscalationMode::Unattended => EscalationPolicy::Unattended,
            EscalationMode::Auto => match self.store.current().await {
                Some(stored) if stored.config.is_kiosk() => EscalationPolicy::Unattended,
                _ => EscalationPolicy::Attended,
            },
        }
    }

    async fn current_config(&self) -> Result<DeviceConfig, AgentError> {
        self.store
            .current()
            .await
            .map(|stored| stored.config.clone())
            .ok_or_else(|| AgentError::Internal("no configuration stored".to_string()))
    }

    /// Ready: notify and launch run-after-install apps with a staggered pause
    fn finish(&self, config: &DeviceConfig) {
        self.initialized.store(true, Ordering::SeqCst);
        self.platform.notifier.on_ready(config);

        let pending = self.state.take_pending_run();
        if pending.is_empty() {
            return;
        }

        let packages = self.platform.packages.clone();
        let pause = self.options.autorun_pause;
        let handle = tokio::spawn(async move {
            for (index, package) in pending.iter().enumerate() {
                tokio::time::sleep(pause * (index as u32 + 1)).await;
                info!("Launching {}", package);
                if let Err(e) = packages.launch(package).await {
                    warn!("Failed to launch {}: {}", package, e);
                }
            }
        });
        *self.autorun.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    fn transition(&self, event: ReconcileEvent) -> Result<ReconcileState, AgentError> {
        let state = self
            .lock_fsm()
            .process(event)
            .map_err(AgentError::InvalidTransition)?;
        debug!("Reconcile state: {:?}", state);
        Ok(state)
    }

    fn lock_fsm(&self) -> MutexGuard<'_, ReconcileFsm> {
        self.fsm.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_blocked(&self) -> MutexGuard<'_, Option<QueueKind>> {
        self.blocked_on.lock().unwrap_or_else(|e| e.into_inner())
    }
}
