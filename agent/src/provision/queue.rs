//! Process-wide provisioning queues

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::models::config::{ApplicationSpec, DeviceConfig, FileSpec};

/// An entry of a work queue
pub trait QueueItem: Clone + Send + Sync + 'static {
    const IS_FILE: bool;

    /// Path or package id
    fn key(&self) -> &str;

    /// User facing label
    fn label(&self) -> &str;

    /// The configuration without this entry
    fn dropped_from(&self, config: &DeviceConfig) -> DeviceConfig;

    /// Package to launch once the operation succeeded
    fn launch_after(&self) -> Option<&str> {
        None
    }
}

impl QueueItem for FileSpec {
    const IS_FILE: bool = true;

    fn key(&self) -> &str {
        &self.path
    }

    fn label(&self) -> &str {
        &self.path
    }

    fn dropped_from(&self, config: &DeviceConfig) -> DeviceConfig {
        config.without_file(&self.path)
    }
}

impl QueueItem for ApplicationSpec {
    const IS_FILE: bool = false;

    fn key(&self) -> &str {
        &self.pkg
    }

    fn label(&self) -> &str {
        self.display_name()
    }

    fn dropped_from(&self, config: &DeviceConfig) -> DeviceConfig {
        config.without_application(&self.pkg)
    }

    fn launch_after(&self) -> Option<&str> {
        (self.run_after_install && !self.remove).then_some(self.pkg.as_str())
    }
}

/// Ordered queue with a single active drainer.
///
/// The item lock is never held across an await point.
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    draining: AtomicBool,
}

/// Held while a drain is in flight, releases the queue on drop
pub struct DrainGuard<'a> {
    draining: &'a AtomicBool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.draining.store(false, Ordering::SeqCst);
    }
}

impl<T: Clone> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the queue for draining, `None` when another drain is active
    pub fn begin_drain(&self) -> Option<DrainGuard<'_>> {
        self.draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| DrainGuard {
                draining: &self.draining,
            })
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Replace the whole content with a fresh plan
    pub fn replace(&self, items: Vec<T>) {
        *self.lock() = items.into();
    }

    pub fn pop_front(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Put a failed item back so it is the next one retried
    pub fn push_front(&self, item: T) {
        self.lock().push_front(item);
    }

    pub fn head(&self) -> Option<T> {
        self.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}

impl<T: Clone> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Which queue an operator decision applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Files,
    Apps,
}

/// Shared provisioning state, owned by the orchestrator and handed to the runner
#[derive(Default)]
pub struct ProvisioningState {
    pub files: WorkQueue<FileSpec>,
    pub apps: WorkQueue<ApplicationSpec>,
    pending_run: Mutex<Vec<String>>,
}

impl ProvisioningState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_pending_run(&self, package: &str) {
        let mut pending = self.pending_run.lock().unwrap_or_else(|e| e.into_inner());
        if !pending.iter().any(|p| p == package) {
            pending.push(package.to_string());
        }
    }

    pub fn take_pending_run(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending_run.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn pending_run(&self) -> Vec<String> {
        self.pending_run.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
