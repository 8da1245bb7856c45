//! HTTP transport backed by reqwest

use super::{SensorRequest, SensorTransport, API_KEY_HEADER, CONTENT_TYPE};
use crate::error::{Result, TrackerError};
use async_trait::async_trait;
use reqwest::header;

/// Sends sensor requests over HTTP(S)
///
/// No request timeout is configured beyond reqwest's own defaults; pass a
/// customized client through `with_client` if one is needed.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("a3s-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SensorTransport for HttpTransport {
    async fn post(&self, request: &SensorRequest) -> Result<u16> {
        let response = self
            .client
            .post(request.url.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .header(API_KEY_HEADER, request.api_key.as_str())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| TrackerError::Transport(format!("{}: {}", request.url, e)))?;

        Ok(response.status().as_u16())
    }

    fn name(&self) -> &str {
        "http"
    }
}
