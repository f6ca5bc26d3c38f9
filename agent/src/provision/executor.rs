//! Per-item operations for the file and application queues

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::config::{AppSource, ApplicationSpec, FileSpec};
use crate::platform::{
    Capabilities, DownloadProgress, Downloader, FileRecord, FileRecordStore, NotificationSink,
    PackageManager, RemoteLog, RemoteLogLevel,
};
use crate::utils::now_secs;

/// Performs the operation behind one queue entry
#[async_trait]
pub trait ItemExecutor<T>: Send + Sync {
    async fn execute(&self, item: &T) -> Result<(), AgentError>;
}

/// Download, verify and move files into the managed root; delete removed ones
pub struct FileExecutor {
    downloader: Arc<dyn Downloader>,
    records: Arc<dyn FileRecordStore>,
    files_dir: Dir,
    notifier: Arc<dyn NotificationSink>,
    remote_log: Arc<dyn RemoteLog>,
}

impl FileExecutor {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        records: Arc<dyn FileRecordStore>,
        files_dir: Dir,
        notifier: Arc<dyn NotificationSink>,
        remote_log: Arc<dyn RemoteLog>,
    ) -> Self {
        Self {
            downloader,
            records,
            files_dir,
            notifier,
            remote_log,
        }
    }

    /// Removal never fails the queue: errors are reported and the entry is done
    async fn remove(&self, spec: &FileSpec) {
        self.remote_log
            .log(RemoteLogLevel::Debug, format!("Removing file: {}", spec.path));

        let removed = match self.files_dir.resolve(&spec.path) {
            Ok(file) => file.delete().await,
            Err(e) => Err(e),
        };
        let forgotten = self.records.delete(&spec.path).await;

        if let Err(e) = removed.and(forgotten) {
            warn!("Failed to remove file {}: {}", spec.path, e);
            self.remote_log.log(
                RemoteLogLevel::Warn,
                format!("Failed to remove file {}: {}", spec.path, e),
            );
        }
    }

    async fn install(&self, spec: &FileSpec, url: &str) -> Result<(), AgentError> {
        let target = self
            .files_dir
            .resolve(&spec.path)
            .map_err(|e| AgentError::item_failed(&spec.path, e))?;

        let message = format!("Downloading file {}", spec.path);
        self.notifier.on_provisioning_progress(&message, Some(0));
        self.remote_log
            .log(RemoteLogLevel::Debug, format!("Downloading file: {}", spec.path));

        let notifier = &self.notifier;
        let on_progress = |progress: DownloadProgress| {
            notifier.on_provisioning_progress(&message, Some(progress.pct));
        };
        let temp = self
            .downloader
            .download_to_temp(url, &on_progress)
            .await
            .map_err(|e| AgentError::item_failed(&spec.path, e))?;

        let downloaded = File::new(&temp);
        let result = self.verify_and_move(spec, &downloaded, &target).await;
        if result.is_err() {
            if let Err(e) = downloaded.delete().await {
                debug!("Failed to clean up {}: {}", temp.display(), e);
            }
        }
        let checksum = result?;

        self.records
            .persist(
                &spec.path,
                FileRecord {
                    url: spec.url.clone(),
                    checksum: Some(checksum),
                    installed_at: now_secs(),
                },
            )
            .await?;
        info!("File {} installed", spec.path);
        Ok(())
    }

    /// Check the download against the expected checksum and move it in place
    async fn verify_and_move(
        &self,
        spec: &FileSpec,
        downloaded: &File,
        target: &File,
    ) -> Result<String, AgentError> {
        let actual = downloaded
            .sha256()
            .await
            .map_err(|e| AgentError::item_failed(&spec.path, e))?;

        if let Some(expected) = &spec.checksum {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(AgentError::item_failed(
                    &spec.path,
                    format!("checksum mismatch: expected {}, got {}", expected, actual),
                ));
            }
        }

        target
            .replace_with(downloaded.path())
            .await
            .map_err(|e| AgentError::item_failed(&spec.path, e))?;
        Ok(actual)
    }
}

#[async_trait]
impl ItemExecutor<FileSpec> for FileExecutor {
    async fn execute(&self, spec: &FileSpec) -> Result<(), AgentError> {
        if spec.remove {
            self.remove(spec).await;
            return Ok(());
        }
        match spec.url.as_deref() {
            Some(url) => self.install(spec, url).await,
            None => Ok(()),
        }
    }
}

/// Install, update and remove applications through the package manager
pub struct AppExecutor {
    packages: Arc<dyn PackageManager>,
    downloader: Arc<dyn Downloader>,
    caps: Arc<dyn Capabilities>,
    notifier: Arc<dyn NotificationSink>,
    remote_log: Arc<dyn RemoteLog>,
}

impl AppExecutor {
    pub fn new(
        packages: Arc<dyn PackageManager>,
        downloader: Arc<dyn Downloader>,
        caps: Arc<dyn Capabilities>,
        notifier: Arc<dyn NotificationSink>,
        remote_log: Arc<dyn RemoteLog>,
    ) -> Self {
        Self {
            packages,
            downloader,
            caps,
            notifier,
            remote_log,
        }
    }

    async fn uninstall(&self, app: &ApplicationSpec, device_owner: bool) -> Result<(), AgentError> {
        self.notifier
            .on_provisioning_progress(&format!("Removing {}", app.display_name()), None);
        self.remote_log
            .log(RemoteLogLevel::Debug, format!("Removing app: {}", app.pkg));

        let result = if device_owner {
            self.packages.uninstall_silently(&app.pkg).await
        } else {
            self.packages.uninstall_interactive(&app.pkg).await
        };
        result.map_err(|e| platform_error(&app.pkg, e))
    }

    async fn install_direct(
        &self,
        app: &ApplicationSpec,
        url: &str,
        device_owner: bool,
    ) -> Result<(), AgentError> {
        let message = format!("Downloading {}", app.display_name());
        self.notifier.on_provisioning_progress(&message, Some(0));
        self.remote_log
            .log(RemoteLogLevel::Debug, format!("Downloading app: {}", app.pkg));

        let notifier = &self.notifier;
        let on_progress = |progress: DownloadProgress| {
            notifier.on_provisioning_progress(&message, Some(progress.pct));
        };
        let package_file = self
            .downloader
            .download_to_temp(url, &on_progress)
            .await
            .map_err(|e| AgentError::item_failed(&app.pkg, e))?;

        self.notifier
            .on_provisioning_progress(&format!("Installing {}", app.display_name()), None);
        let result = if device_owner {
            self.packages.install_silently(&package_file, &app.pkg).await
        } else {
            self.packages.install_interactive(&package_file, &app.pkg).await
        };

        if let Err(e) = File::new(&package_file).delete().await {
            debug!("Failed to clean up {}: {}", package_file.display(), e);
        }
        result.map_err(|e| platform_error(&app.pkg, e))
    }
}

/// Keep platform errors as they are, wrap anything else coming from the platform
fn platform_error(package: &str, err: AgentError) -> AgentError {
    match err {
        AgentError::InstallPlatformError { .. } => err,
        other => AgentError::install_failed(package, other),
    }
}

#[async_trait]
impl ItemExecutor<ApplicationSpec> for AppExecutor {
    async fn execute(&self, app: &ApplicationSpec) -> Result<(), AgentError> {
        let device_owner = self.caps.is_device_owner().await;

        if app.remove {
            return self.uninstall(app, device_owner).await;
        }

        match app.source() {
            AppSource::None => Ok(()),
            AppSource::Marketplace(uri) => {
                self.remote_log.log(
                    RemoteLogLevel::Info,
                    format!("Installing app {} from marketplace", app.pkg),
                );
                self.packages
                    .install_from_marketplace(uri, &app.pkg)
                    .await
                    .map_err(|e| platform_error(&app.pkg, e))
            }
            AppSource::Direct(url) => self.install_direct(app, url, device_owner).await,
        }
    }
}
