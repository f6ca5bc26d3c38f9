//! Configuration fetch with primary/secondary fallback

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::store::ConfigStore;
use crate::errors::AgentError;
use crate::models::config::DeviceConfig;
use crate::models::response::ServerResponse;
use crate::platform::{ConfigSource, RawResponse};
use crate::storage::device::DeviceIdentity;

/// Outcome of a configuration request. Never coerced to a default config.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Success(DeviceConfig),
    /// The server answered but refused the device
    Rejected(String),
    /// No usable answer from either endpoint
    NetworkUnreachable(String),
}

impl FetchResult {
    /// Error equivalent of a failed fetch
    pub fn error(&self) -> Option<AgentError> {
        match self {
            FetchResult::Success(_) => None,
            FetchResult::Rejected(msg) => Some(AgentError::FetchRejected(msg.clone())),
            FetchResult::NetworkUnreachable(msg) => Some(AgentError::FetchUnreachable(msg.clone())),
        }
    }
}

/// Requests the configuration and installs it in the store on success
pub struct ConfigFetcher {
    source: Arc<dyn ConfigSource>,
    store: Arc<ConfigStore>,
    settle_delay: Duration,
}

impl ConfigFetcher {
    pub fn new(source: Arc<dyn ConfigSource>, store: Arc<ConfigStore>, settle_delay: Duration) -> Self {
        Self {
            source,
            store,
            settle_delay,
        }
    }

    pub async fn fetch(&self, identity: &DeviceIdentity) -> Result<FetchResult, AgentError> {
        let response = self.request(identity).await;

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let result = match response {
            Ok(response) => interpret(response),
            Err(e) => FetchResult::NetworkUnreachable(e.to_string()),
        };

        if let FetchResult::Success(config) = &result {
            self.store.replace(config.clone()).await?;
        }
        Ok(result)
    }

    async fn request(&self, identity: &DeviceIdentity) -> Result<RawResponse, AgentError> {
        let primary = self
            .source
            .fetch_config(&identity.base_url, &identity.project, &identity.device_id)
            .await;

        let err = match primary {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let Some(secondary) = identity.secondary_base_url.as_deref().filter(|url| !url.is_empty())
        else {
            return Err(err);
        };

        warn!("Primary server failed ({}), trying {}", err, secondary);
        self.source
            .fetch_config(secondary, &identity.project, &identity.device_id)
            .await
    }
}

fn interpret(response: RawResponse) -> FetchResult {
    if !response.is_success() {
        return FetchResult::NetworkUnreachable(format!("server answered {}", response.status));
    }

    let Some(body) = response.body else {
        return FetchResult::NetworkUnreachable("empty response body".to_string());
    };

    let envelope: ServerResponse<DeviceConfig> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("Malformed configuration response: {}", e);
            return FetchResult::NetworkUnreachable(format!("malformed response: {}", e));
        }
    };

    let status = envelope.status.clone();
    let message = envelope.message.clone();
    match envelope.into_ok_data() {
        Some(config) => {
            info!("Configuration received");
            FetchResult::Success(config)
        }
        None => FetchResult::Rejected(message.unwrap_or(status)),
    }
}
