// Trait abstractions for the orchestrator's collaborators.
//
// ContentFetcher wraps the fetch router; QualityConfigSource, RecordSink
// and Archiver keep configuration, durable storage, and preservation out of
// the core. All of them have mock implementations in `testing`, so the
// enrichment loop tests run with no network and no database.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use vintry_common::{FieldMap, Provenance, QualityAssessment, QualityConfig, ScrapedPage};
use vintry_fetch::FetchRouter;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// ContentFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch and render a page to cleaned markdown.
    async fn page(&self, url: &str) -> Result<ScrapedPage>;
}

#[async_trait]
impl ContentFetcher for FetchRouter {
    async fn page(&self, url: &str) -> Result<ScrapedPage> {
        let (page, _outcome) = self.fetch(url).await?;
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// QualityConfigSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait QualityConfigSource: Send + Sync {
    /// The quality configuration for one product type. Read-only to the
    /// engine; an unknown product type is a configuration error.
    async fn config_for(&self, product_type: &str) -> Result<QualityConfig, EngineError>;
}

/// Caches another source's configurations until explicitly invalidated.
pub struct CachedConfigSource {
    inner: Arc<dyn QualityConfigSource>,
    cache: RwLock<HashMap<String, QualityConfig>>,
}

impl CachedConfigSource {
    pub fn new(inner: Arc<dyn QualityConfigSource>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every cached configuration. The next lookup re-reads the inner
    /// source.
    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
    }
}

#[async_trait]
impl QualityConfigSource for CachedConfigSource {
    async fn config_for(&self, product_type: &str) -> Result<QualityConfig, EngineError> {
        if let Some(config) = self.cache.read().await.get(product_type) {
            return Ok(config.clone());
        }

        let config = self.inner.config_for(product_type).await?;
        self.cache
            .write()
            .await
            .insert(product_type.to_string(), config.clone());
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// RecordSink
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist one record's terminal state. Called at most once per
    /// enrichment invocation.
    async fn persist(
        &self,
        record_id: Uuid,
        fields: &FieldMap,
        assessment: &QualityAssessment,
        provenance: &[Provenance],
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Archiver
// ---------------------------------------------------------------------------

/// Best-effort URL preservation. Fire-and-forget: failures are logged and
/// never block or fail the pipeline.
pub trait Archiver: Send + Sync {
    fn archive(&self, url: &str);
}

const WAYBACK_SAVE_URL: &str = "https://web.archive.org/save/";

pub struct WaybackArchiver {
    client: reqwest::Client,
}

impl WaybackArchiver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for WaybackArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for WaybackArchiver {
    fn archive(&self, url: &str) {
        let client = self.client.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let save = format!("{WAYBACK_SAVE_URL}{url}");
            match client.get(&save).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url, "Archived source page");
                }
                Ok(resp) => {
                    warn!(url, status = resp.status().as_u16(), "Archive request rejected");
                }
                Err(e) => {
                    warn!(url, error = %e, "Archive request failed");
                }
            }
        });
    }
}

/// For deployments without a preservation endpoint.
pub struct NullArchiver;

impl Archiver for NullArchiver {
    fn archive(&self, _url: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vintry_common::FieldSpec;

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QualityConfigSource for CountingSource {
        async fn config_for(&self, product_type: &str) -> Result<QualityConfig, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(QualityConfig {
                product_type: product_type.to_string(),
                required_fields: vec![FieldSpec::new("name", 1.0)],
                optional_fields: vec![],
                any_of_fields: vec![],
                any_of_min: 0,
                min_required_confidence: 0.0,
            })
        }
    }

    #[tokio::test]
    async fn cached_source_reads_inner_once_until_invalidated() {
        let inner = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedConfigSource::new(inner.clone());

        cached.config_for("spirits").await.unwrap();
        cached.config_for("spirits").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.invalidate().await;
        cached.config_for("spirits").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_is_per_product_type() {
        let inner = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedConfigSource::new(inner.clone());

        cached.config_for("spirits").await.unwrap();
        cached.config_for("wine").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
