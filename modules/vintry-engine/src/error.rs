use thiserror::Error;
use vintry_common::VintryError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing or invalid quality configuration. Fatal for the whole
    /// enrichment call, never retried.
    #[error("Configuration error for product type '{product_type}': {message}")]
    Configuration {
        product_type: String,
        message: String,
    },

    #[error("Search failed: {0}")]
    Search(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What the extraction collaborator can report back. The engine never
/// substitutes synthetic fields for any of these.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Content not extractable: {0}")]
    InvalidContent(String),

    #[error("Extraction response did not match the expected schema: {0}")]
    SchemaMismatch(String),

    #[error("Extraction capability failed: {0}")]
    Upstream(String),
}

impl From<EngineError> for VintryError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Configuration { .. } => VintryError::Configuration(e.to_string()),
            EngineError::Search(msg) => VintryError::Search(msg),
            EngineError::Other(e) => VintryError::Anyhow(e),
        }
    }
}

impl From<ExtractionError> for VintryError {
    fn from(e: ExtractionError) -> Self {
        VintryError::Extraction(e.to_string())
    }
}
