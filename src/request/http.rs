//! HTTP transport for the upstream data API

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::Transport;
use crate::cache::Params;
use crate::fallback::UpstreamError;

/// Base URL of the local data API gateway
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/api/public";

/// Issues `GET <base_url>/<path>?<params>` and decodes the JSON body
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a transport with a custom HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Transport for HttpTransport {
    fn request<'a>(
        &'a self,
        path: &'a str,
        params: &'a Params,
    ) -> BoxFuture<'a, Result<Value, UpstreamError>> {
        Box::pin(async move {
            let url = self.url(path);
            debug!(%url, "Requesting upstream");

            let response = self.client.get(&url).query(params).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.ok().filter(|b| !b.is_empty());
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let text = response.text().await?;
            serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))
        })
    }
}
