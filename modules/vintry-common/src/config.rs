use std::env;

use crate::types::FetchTier;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres (domain intelligence store)
    pub database_url: String,

    // Search
    pub serper_api_key: String,

    // Rendered / stealth fetch tiers
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    // Fetch tuning
    pub fetch_timeout_ms: u64,
    pub max_fetch_tier: FetchTier,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            serper_api_key: required_env("SERPER_API_KEY"),
            browserless_url: required_env("BROWSERLESS_URL"),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok(),
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .expect("FETCH_TIMEOUT_MS must be a number"),
            max_fetch_tier: env::var("MAX_FETCH_TIER")
                .ok()
                .map(|v| {
                    let n: u8 = v.parse().expect("MAX_FETCH_TIER must be 1, 2, or 3");
                    FetchTier::from_u8(n).expect("MAX_FETCH_TIER must be 1, 2, or 3")
                })
                .unwrap_or(FetchTier::MAX),
        }
    }

    /// Log the config with secrets redacted.
    pub fn log_redacted(&self) {
        tracing::info!(
            browserless_url = %self.browserless_url,
            fetch_timeout_ms = self.fetch_timeout_ms,
            max_fetch_tier = %self.max_fetch_tier,
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
