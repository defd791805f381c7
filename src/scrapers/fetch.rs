use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::browser::USER_AGENT;
use super::traits::PageFetcher;

/// Fetches raw page HTML without a browser; used ahead of selector inference
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, String> {
        debug!("Fetching URL: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP status {status}"));
        }

        let html = response.text().await.map_err(|e| e.to_string())?;
        debug!("Downloaded {} bytes of HTML", html.len());
        Ok(html)
    }
}
