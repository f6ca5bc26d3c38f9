//! Remote log shipping

use serde::Serialize;
use tracing::debug;

use crate::http::client::{join_url, HttpClient};
use crate::platform::{RemoteLog, RemoteLogLevel};
use crate::utils::now_secs;

#[derive(Debug, Serialize)]
struct LogEntry {
    level: RemoteLogLevel,
    message: String,
    timestamp: u64,
}

/// Posts log entries to the management server without waiting for the answer
pub struct HttpRemoteLog {
    client: HttpClient,
    url: String,
}

impl HttpRemoteLog {
    pub fn new(client: HttpClient, base_url: &str, project: &str, device_id: &str) -> Self {
        Self {
            client,
            url: join_url(base_url, &[project, "rest/plugins/devicelog/log", device_id]),
        }
    }
}

impl RemoteLog for HttpRemoteLog {
    fn log(&self, level: RemoteLogLevel, message: String) {
        let entry = LogEntry {
            level,
            message,
            timestamp: now_secs(),
        };
        let client = self.client.clone();
        let url = self.url.clone();

        // outside a runtime there is nobody to ship the entry
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            if let Err(e) = client.post_json(&url, &[entry]).await {
                debug!("Remote log delivery failed: {}", e);
            }
        });
    }
}
