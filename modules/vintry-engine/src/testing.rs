// Mock collaborators for the enrichment pipeline, one per trait boundary:
// MockFetcher (ContentFetcher), MockExtractor (FieldExtractor), MockSearcher
// (Searcher), StaticConfigSource (QualityConfigSource), MemorySink
// (RecordSink), RecordingArchiver (Archiver). No network, no database.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use vintry_common::{
    content_hash, Extraction, FieldMap, FieldValue, FetchTier, Provenance, QualityAssessment,
    QualityConfig, ScrapedPage, SearchHit,
};

use crate::error::{EngineError, ExtractionError};
use crate::extract::FieldExtractor;
use crate::search::Searcher;
use crate::traits::{Archiver, ContentFetcher, QualityConfigSource, RecordSink};

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

pub fn hit(url: &str) -> SearchHit {
    SearchHit {
        url: url.to_string(),
        title: format!("Result for {url}"),
        snippet: String::new(),
    }
}

pub fn scraped_page(url: &str, markdown: &str) -> ScrapedPage {
    ScrapedPage {
        url: url.to_string(),
        markdown: markdown.to_string(),
        raw_html: format!("<html><body>{markdown}</body></html>"),
        content_hash: format!("{:016x}", content_hash(markdown)),
        tier: FetchTier::Http,
        fetched_at: Utc::now(),
    }
}

/// An extraction from string fields: (name, value, confidence).
pub fn extraction_of(entries: &[(&str, &str, f32)]) -> Extraction {
    Extraction {
        fields: entries
            .iter()
            .map(|(k, v, c)| (k.to_string(), FieldValue::text(v, *c)))
            .collect(),
        multiple_candidates: false,
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// URL → canned page. Unregistered URLs fail, standing in for a URL whose
/// every fetch tier failed.
pub struct MockFetcher {
    pages: HashMap<String, ScrapedPage>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_page(mut self, url: &str, markdown: &str) -> Self {
        self.pages.insert(url.to_string(), scraped_page(url, markdown));
        self
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn page(&self, url: &str) -> Result<ScrapedPage> {
        self.calls.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockFetcher: no page registered for {url}"))
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Content → canned extraction. Unregistered content extracts to nothing
/// (a page that mentioned none of the wanted fields).
pub struct MockExtractor {
    by_content: HashMap<String, Extraction>,
    failures: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            by_content: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_content(mut self, content: &str, extraction: Extraction) -> Self {
        self.by_content.insert(content.to_string(), extraction);
        self
    }

    /// Make this content fail with an upstream extraction error.
    pub fn failing_on(mut self, content: &str, message: &str) -> Self {
        self.failures
            .insert(content.to_string(), message.to_string());
        self
    }

    pub fn extracted_contents(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, content: &str) -> Option<&Extraction> {
        // Exact match first, then substring so callers can key on a marker
        // inside rendered markdown.
        self.by_content.get(content).or_else(|| {
            self.by_content
                .iter()
                .find(|(needle, _)| content.contains(needle.as_str()))
                .map(|(_, extraction)| extraction)
        })
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FieldExtractor for MockExtractor {
    async fn extract(
        &self,
        content: &str,
        _wanted_fields: &[String],
        _product_type: &str,
    ) -> Result<Extraction, ExtractionError> {
        self.calls.lock().unwrap().push(content.to_string());

        if let Some((_, message)) = self
            .failures
            .iter()
            .find(|(needle, _)| content.contains(needle.as_str()))
        {
            return Err(ExtractionError::Upstream(message.clone()));
        }

        Ok(self.lookup(content).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// Query → canned hits. Unregistered queries return no results.
pub struct MockSearcher {
    by_query: HashMap<String, Vec<SearchHit>>,
    failures: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self {
            by_query: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.by_query.insert(query.to_string(), hits);
        self
    }

    /// Make this query fail, standing in for a search backend outage.
    pub fn failing_on(mut self, query: &str, message: &str) -> Self {
        self.failures.insert(query.to_string(), message.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Searcher for MockSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.calls.lock().unwrap().push(query.to_string());
        if let Some(message) = self.failures.get(query) {
            anyhow::bail!("MockSearcher: {message}");
        }
        Ok(self
            .by_query
            .get(query)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(max_results)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// StaticConfigSource
// ---------------------------------------------------------------------------

/// Serves fixed configurations; any other product type is a configuration
/// error, matching a missing row in a real source.
pub struct StaticConfigSource {
    configs: HashMap<String, QualityConfig>,
}

impl StaticConfigSource {
    pub fn new(config: QualityConfig) -> Self {
        let mut configs = HashMap::new();
        configs.insert(config.product_type.clone(), config);
        Self { configs }
    }

    pub fn with(mut self, config: QualityConfig) -> Self {
        self.configs.insert(config.product_type.clone(), config);
        self
    }
}

#[async_trait]
impl QualityConfigSource for StaticConfigSource {
    async fn config_for(&self, product_type: &str) -> Result<QualityConfig, EngineError> {
        self.configs
            .get(product_type)
            .cloned()
            .ok_or_else(|| EngineError::Configuration {
                product_type: product_type.to_string(),
                message: "no quality configuration registered".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PersistedRecord {
    pub record_id: Uuid,
    pub fields: FieldMap,
    pub assessment: QualityAssessment,
    pub provenance: Vec<Provenance>,
}

pub struct MemorySink {
    records: Mutex<Vec<PersistedRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn persisted(&self) -> Vec<PersistedRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn persist(
        &self,
        record_id: Uuid,
        fields: &FieldMap,
        assessment: &QualityAssessment,
        provenance: &[Provenance],
    ) -> Result<()> {
        self.records.lock().unwrap().push(PersistedRecord {
            record_id,
            fields: fields.clone(),
            assessment: assessment.clone(),
            provenance: provenance.to_vec(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingArchiver
// ---------------------------------------------------------------------------

pub struct RecordingArchiver {
    urls: Mutex<Vec<String>>,
}

impl RecordingArchiver {
    pub fn new() -> Self {
        Self {
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn archived(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Default for RecordingArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for RecordingArchiver {
    fn archive(&self, url: &str) {
        self.urls.lock().unwrap().push(url.to_string());
    }
}
