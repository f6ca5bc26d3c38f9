//! HTTP client implementation

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, error};

use crate::errors::AgentError;
use crate::platform::RawResponse;

/// HTTP client for management server communication
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client with the given connect/read timeout.
    ///
    /// No total timeout is set so long downloads are only bounded by stalls.
    pub fn new(timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("mdmagent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// GET a URL and return status and body.
    ///
    /// Transport failures and 5xx answers are errors; any other status is
    /// returned for the caller to interpret.
    pub async fn get_raw(&self, url: &str) -> Result<RawResponse, AgentError> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            error!("HTTP GET failed: {} - {}", status, body);
            return Err(AgentError::ServerError(format!("{}: {}", status, body)));
        }

        Ok(RawResponse {
            status: status.as_u16(),
            body: response.text().await.ok(),
        })
    }

    /// GET a URL for streaming, failing on any non-success status
    pub async fn get_stream(&self, url: &str) -> Result<Response, AgentError> {
        debug!("GET {} (stream)", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::ServerError(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }
        Ok(response)
    }

    /// POST a JSON body, discarding the response payload
    pub async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<(), AgentError> {
        debug!("POST {}", url);

        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ServerError(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

/// Join a base URL and path segments with single slashes
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        url.push('/');
        url.push_str(segment);
    }
    url
}
