pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

/// Client for a Browserless instance. `content` drives a rendered fetch
/// (JS executed, networkidle); `unblock` drives the anti-bot pipeline.
pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnblockResponse {
    content: Option<String>,
}

impl BrowserlessClient {
    /// The timeout is passed per call so callers can apply a per-domain
    /// budget; the client itself carries no global timeout.
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}{path}", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Fetch fully-rendered HTML for a URL via the /content endpoint.
    pub async fn content(&self, url: &str, timeout: Duration) -> Result<String> {
        let body = serde_json::json!({
            "url": url,
            "gotoOptions": { "waitUntil": "networkidle2" },
        });

        debug!(url, timeout_ms = timeout.as_millis() as u64, "Browserless /content");

        let resp = self
            .client
            .post(self.endpoint("/content"))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.text().await.map_err(|e| map_send_error(e, timeout))
    }

    /// Fetch HTML through the /unblock endpoint, which solves bot challenges
    /// before returning content.
    pub async fn unblock(&self, url: &str, timeout: Duration) -> Result<String> {
        let body = serde_json::json!({
            "url": url,
            "content": true,
            "browserWSEndpoint": false,
            "cookies": false,
            "screenshot": false,
        });

        debug!(url, timeout_ms = timeout.as_millis() as u64, "Browserless /unblock");

        let resp = self
            .client
            .post(self.endpoint("/unblock"))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: UnblockResponse = resp
            .json()
            .await
            .map_err(|e| BrowserlessError::Malformed(e.to_string()))?;

        parsed
            .content
            .ok_or_else(|| BrowserlessError::Malformed("unblock response has no content".into()))
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> BrowserlessError {
    if err.is_timeout() {
        BrowserlessError::Timeout(timeout.as_millis() as u64)
    } else {
        BrowserlessError::Network(err.to_string())
    }
}
