use thiserror::Error;

use vintry_common::FetchTier;

pub type Result<T> = std::result::Result<T, FetchError>;

/// Terminal fetch failures. Escalation between tiers is handled inside the
/// router; by the time one of these surfaces, there is nothing left to try.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Network error fetching {url} at tier {tier}: {message}")]
    Network {
        url: String,
        tier: FetchTier,
        message: String,
    },

    #[error("Timed out fetching {url} at tier {tier} after {budget_ms}ms")]
    Timeout {
        url: String,
        tier: FetchTier,
        budget_ms: u64,
    },

    #[error("All fetch tiers exhausted for {url} (tried {tiers_tried:?})")]
    TiersExhausted {
        url: String,
        tiers_tried: Vec<FetchTier>,
    },

    #[error("Domain store error: {0}")]
    Store(String),
}

impl From<FetchError> for vintry_common::VintryError {
    fn from(err: FetchError) -> Self {
        vintry_common::VintryError::Fetch(err.to_string())
    }
}
