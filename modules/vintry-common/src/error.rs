use thiserror::Error;

/// Umbrella error for callers that sit above the individual crates.
/// FetchError and EngineError convert into it at the boundary.
#[derive(Error, Debug)]
pub enum VintryError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
