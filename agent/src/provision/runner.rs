//! Head-first queue draining with retry and escalation

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::store::ConfigStore;
use crate::errors::AgentError;
use crate::platform::{NotificationSink, RemoteLog, RemoteLogLevel};
use crate::provision::executor::ItemExecutor;
use crate::provision::queue::{ProvisioningState, QueueItem, WorkQueue};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Who resolves a failed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationPolicy {
    /// Stop and wait for the operator to retry or skip
    Attended,
    /// Skip the failing item and keep going
    Unattended,
}

/// Runner tuning
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Extra attempts before a failure is escalated
    pub auto_retries: u32,
    /// Delay before the first retry, doubled on each further one
    pub retry_delay: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            auto_retries: 0,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// How a drain ended
#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome<T> {
    /// Queue is empty; `skipped` lists items dropped on the way
    Drained { skipped: Vec<T> },
    /// The head item failed and waits for the operator
    Blocked { item: T, error: String },
    /// Another drain holds the queue
    Busy,
}

/// Drains one queue at a time, one item at a time
pub struct QueueRunner {
    state: Arc<ProvisioningState>,
    store: Arc<ConfigStore>,
    notifier: Arc<dyn NotificationSink>,
    remote_log: Arc<dyn RemoteLog>,
    options: RunnerOptions,
}

impl QueueRunner {
    pub fn new(
        state: Arc<ProvisioningState>,
        store: Arc<ConfigStore>,
        notifier: Arc<dyn NotificationSink>,
        remote_log: Arc<dyn RemoteLog>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            state,
            store,
            notifier,
            remote_log,
            options,
        }
    }

    pub fn state(&self) -> &Arc<ProvisioningState> {
        &self.state
    }

    /// Process the queue head until it is empty or an item blocks
    pub async fn drain<T: QueueItem>(
        &self,
        queue: &WorkQueue<T>,
        executor: &dyn ItemExecutor<T>,
        policy: EscalationPolicy,
    ) -> Result<DrainOutcome<T>, AgentError> {
        let Some(_guard) = queue.begin_drain() else {
            debug!("Queue already draining");
            return Ok(DrainOutcome::Busy);
        };

        let mut skipped = Vec::new();
        while let Some(item) = queue.pop_front() {
            let error = match self.execute(executor, &item).await {
                Ok(()) => {
                    if let Some(package) = item.launch_after() {
                        self.state.push_pending_run(package);
                    }
                    continue;
                }
                Err(e) => e,
            };

            queue.push_front(item.clone());
            self.remote_log.log(
                RemoteLogLevel::Error,
                format!("Provisioning of {} failed: {}", item.key(), error),
            );
            self.notifier.on_item_failed(item.key(), T::IS_FILE, &error);

            if error.requires_operator() || policy == EscalationPolicy::Attended {
                info!("Waiting for operator on {}", item.key());
                return Ok(DrainOutcome::Blocked {
                    item,
                    error: error.to_string(),
                });
            }

            warn!("Skipping {} in unattended mode", item.key());
            skipped.push(self.drop_head(queue).await?.unwrap_or(item));
        }

        Ok(DrainOutcome::Drained { skipped })
    }

    /// Operator skip: drop the blocked head and forget it in the config snapshot
    pub async fn skip_head<T: QueueItem>(&self, queue: &WorkQueue<T>) -> Result<Option<T>, AgentError> {
        let Some(_guard) = queue.begin_drain() else {
            return Err(AgentError::InvalidTransition(
                "cannot skip while the queue is draining".to_string(),
            ));
        };
        self.drop_head(queue).await
    }

    async fn drop_head<T: QueueItem>(&self, queue: &WorkQueue<T>) -> Result<Option<T>, AgentError> {
        let Some(item) = queue.pop_front() else {
            return Ok(None);
        };
        self.store.rewrite(|config| item.dropped_from(config)).await?;
        self.remote_log
            .log(RemoteLogLevel::Warn, format!("Skipped {}", item.key()));
        Ok(Some(item))
    }

    fn retry_backoff(&self, attempt: u32) -> Duration {
        let cooldown = CooldownOptions {
            base_delay: self.options.retry_delay,
            max_delay: self.options.retry_delay * 8,
            multiplier: 2.0,
        };
        calc_exp_backoff(&cooldown, attempt.saturating_sub(1))
    }

    async fn execute<T: QueueItem>(
        &self,
        executor: &dyn ItemExecutor<T>,
        item: &T,
    ) -> Result<(), AgentError> {
        let mut attempt = 0;
        loop {
            match executor.execute(item).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.options.auto_retries => {
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retry {}/{}",
                        item.label(),
                        e,
                        attempt,
                        self.options.auto_retries
                    );
                    tokio::time::sleep(self.retry_backoff(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
