//! Configuration endpoint of the management server

use async_trait::async_trait;

use crate::errors::AgentError;
use crate::http::client::{join_url, HttpClient};
use crate::platform::{ConfigSource, RawResponse};

/// `GET {base}/{project}/rest/public/sync/configuration/{device_id}`
pub struct HttpConfigSource {
    client: HttpClient,
}

impl HttpConfigSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

pub fn config_url(base_url: &str, project: &str, device_id: &str) -> String {
    join_url(
        base_url,
        &[project, "rest/public/sync/configuration", device_id],
    )
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch_config(
        &self,
        base_url: &str,
        project: &str,
        device_id: &str,
    ) -> Result<RawResponse, AgentError> {
        self.client
            .get_raw(&config_url(base_url, project, device_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_url() {
        assert_eq!(
            config_url("https://mdm.example.com", "", "dev-1"),
            "https://mdm.example.com/rest/public/sync/configuration/dev-1"
        );
        assert_eq!(
            config_url("https://mdm.example.com/", "acme", "dev-1"),
            "https://mdm.example.com/acme/rest/public/sync/configuration/dev-1"
        );
    }
}
