//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::config::ConfigStore;
use crate::errors::AgentError;
use crate::http::{HttpClient, HttpConfigSource, HttpDownloader, HttpRemoteLog};
use crate::platform::capabilities::HookCapabilities;
use crate::platform::notify::StatusBoard;
use crate::platform::packages::CommandPackageManager;
use crate::platform::system::HookSystemSettings;
use crate::platform::{NullRemoteLog, RemoteLog};
use crate::provision::ProvisioningState;
use crate::reconcile::{Orchestrator, PlatformHandles};
use crate::storage::device::assert_activated;
use crate::storage::prefs::PrefsStore;
use crate::storage::records::JsonFileRecords;

/// Main application state
pub struct AppState {
    /// Reconciliation engine
    pub orchestrator: Arc<Orchestrator>,

    /// Latest user facing status
    pub status_board: Arc<StatusBoard>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        let layout = &options.storage.layout;
        layout.setup().await?;

        let prefs = Arc::new(PrefsStore::load(layout.prefs_file()).await?);
        let store = Arc::new(ConfigStore::load(layout.config_file()).await?);
        let records = Arc::new(JsonFileRecords::load(layout.file_records_file()).await?);
        let http_client = HttpClient::new(options.request_timeout)?;

        let identity = prefs.identity().await;
        let remote_log: Arc<dyn RemoteLog> = match assert_activated(&identity) {
            Ok(()) => Arc::new(HttpRemoteLog::new(
                http_client.clone(),
                &identity.base_url,
                &identity.project,
                &identity.device_id,
            )),
            Err(e) => {
                warn!("Remote logging disabled: {}", e);
                Arc::new(NullRemoteLog)
            }
        };

        let status_board = Arc::new(StatusBoard::new());
        let platform = PlatformHandles {
            caps: Arc::new(HookCapabilities::from_settings(&options.platform)?),
            packages: Arc::new(CommandPackageManager::from_settings(&options.platform.packages)?),
            downloader: Arc::new(HttpDownloader::new(http_client.clone(), layout.downloads_dir())),
            records,
            config_source: Arc::new(HttpConfigSource::new(http_client)),
            system: Arc::new(HookSystemSettings::from_settings(&options.platform)?),
            notifier: status_board.clone(),
            remote_log,
        };

        let orchestrator = Arc::new(Orchestrator::new(
            prefs,
            store,
            Arc::new(ProvisioningState::new()),
            layout.files_dir(),
            platform,
            options.reconcile.clone(),
        ));

        Ok(Self {
            orchestrator,
            status_board,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        info!("Shutting down application state...");
        self.orchestrator.wait_autorun().await;
        Ok(())
    }
}
