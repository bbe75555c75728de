// The three tier fetchers. Each returns the raw body plus status; judging
// whether the content is usable belongs to the heuristics, not the fetcher.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use browserless_client::BrowserlessClient;
use vintry_common::FetchTier;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// One tier attempt's raw result.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub html: String,
    pub http_status: u16,
}

#[async_trait]
pub trait TierFetcher: Send + Sync {
    fn tier(&self) -> FetchTier;

    /// Fetch the URL within `timeout`. A non-2xx response is returned as a
    /// body+status, not an error. The heuristics decide what it means.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedBody>;
}

// --- Tier 1: plain HTTP ---

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TierFetcher for HttpFetcher {
    fn tier(&self) -> FetchTier {
        FetchTier::Http
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedBody> {
        debug!(url, fetcher = "http", "Fetching page");

        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .context("HTTP request failed")?;

        let http_status = resp.status().as_u16();
        let html = resp.text().await.context("Failed to read response body")?;

        Ok(FetchedBody { html, http_status })
    }
}

// --- Tier 2: rendered fetch (Browserless /content) ---

pub struct RenderedFetcher {
    client: BrowserlessClient,
}

impl RenderedFetcher {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: BrowserlessClient::new(base_url, token),
        }
    }
}

#[async_trait]
impl TierFetcher for RenderedFetcher {
    fn tier(&self) -> FetchTier {
        FetchTier::Rendered
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedBody> {
        debug!(url, fetcher = "rendered", "Fetching page");

        let html = self
            .client
            .content(url, timeout)
            .await
            .context("Browserless content request failed")?;

        Ok(FetchedBody {
            html,
            http_status: 200,
        })
    }
}

// --- Tier 3: anti-bot fetch (Browserless /unblock) ---

pub struct StealthFetcher {
    client: BrowserlessClient,
}

impl StealthFetcher {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: BrowserlessClient::new(base_url, token),
        }
    }
}

#[async_trait]
impl TierFetcher for StealthFetcher {
    fn tier(&self) -> FetchTier {
        FetchTier::Stealth
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedBody> {
        debug!(url, fetcher = "stealth", "Fetching page");

        let html = self
            .client
            .unblock(url, timeout)
            .await
            .context("Browserless unblock request failed")?;

        Ok(FetchedBody {
            html,
            http_status: 200,
        })
    }
}
