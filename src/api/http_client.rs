use crate::config::ApiConfig;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Thin wrapper around `reqwest::Client`: one GET, JSON body, no retry.
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true);

        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let inner = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { inner })
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// `Ok(None)` means the server answered 204 No Content.
    pub async fn get_json(&self, url: &Url) -> Result<Option<Value>> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url.clone())
            .send()
            .await
            .context("Request failed")?
            .error_for_status()
            .context("Unexpected HTTP status")?;

        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = resp
            .json::<Value>()
            .await
            .context("Failed to decode JSON body")?;
        Ok(Some(body))
    }
}
