// Search collaborator: Serper (Google Search) behind a trait, plus the
// query builder that targets the highest-priority missing field category.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use vintry_common::SearchHit;

/// Sensory fields: queries lean on review language.
const SENSORY_FIELDS: &[&str] = &[
    "tasting_notes",
    "nose",
    "palate",
    "finish",
    "aroma",
    "flavor",
];

/// Numeric attributes: spec sheets and retailer pages carry these.
const NUMERIC_FIELDS: &[&str] = &[
    "abv",
    "alcohol_content",
    "age",
    "vintage",
    "volume_ml",
    "proof",
];

/// Production and provenance fields.
const PROVENANCE_FIELDS: &[&str] = &[
    "distillery",
    "winery",
    "brewery",
    "producer",
    "region",
    "country",
    "production_info",
];

#[async_trait]
pub trait Searcher: Send + Sync {
    /// Ranked organic results only. Sponsored results are excluded
    /// unconditionally.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Build the query for the next search round. `missing` is in importance
/// order, so the first recognizable category wins.
pub fn build_query(name: &str, brand: &str, missing: &[String]) -> String {
    for field in missing {
        let field = field.as_str();
        if SENSORY_FIELDS.contains(&field) {
            return format!("{name} tasting notes review");
        }
        if NUMERIC_FIELDS.contains(&field) {
            return format!("{name} abv specifications");
        }
        if PROVENANCE_FIELDS.contains(&field) {
            return format!("{name} distillery origin");
        }
    }
    format!("{brand} {name}").trim().to_string()
}

#[derive(Debug, serde::Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

pub struct SerperSearcher {
    api_key: String,
    client: reqwest::Client,
}

impl SerperSearcher {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

#[async_trait]
impl Searcher for SerperSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        info!(query, max_results, "Serper search");

        let body = serde_json::json!({
            "q": query,
            "num": max_results,
        });

        let resp = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Serper API request failed")?;

        let data: SerperResponse = resp
            .json()
            .await
            .context("Failed to parse Serper response")?;

        let hits: Vec<SearchHit> = data
            .organic
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                url: r.link,
                title: r.title,
                snippet: r.snippet,
            })
            .collect();

        info!(query, count = hits.len(), "Serper search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensory_fields_drive_a_review_query() {
        let missing = vec!["tasting_notes".to_string(), "abv".to_string()];
        assert_eq!(
            build_query("Ardbeg 10", "Ardbeg", &missing),
            "Ardbeg 10 tasting notes review"
        );
    }

    #[test]
    fn numeric_fields_drive_a_spec_query() {
        let missing = vec!["abv".to_string(), "distillery".to_string()];
        assert_eq!(
            build_query("Ardbeg 10", "Ardbeg", &missing),
            "Ardbeg 10 abv specifications"
        );
    }

    #[test]
    fn provenance_fields_drive_an_origin_query() {
        let missing = vec!["region".to_string()];
        assert_eq!(
            build_query("Ardbeg 10", "Ardbeg", &missing),
            "Ardbeg 10 distillery origin"
        );
    }

    #[test]
    fn unrecognized_fields_fall_back_to_brand_and_name() {
        let missing = vec!["label_color".to_string()];
        assert_eq!(build_query("Ardbeg 10", "Ardbeg", &missing), "Ardbeg Ardbeg 10");
        assert_eq!(build_query("Ardbeg 10", "", &missing), "Ardbeg 10");
    }

    #[test]
    fn importance_order_decides_between_categories() {
        // Sensory listed first wins even with numeric fields also missing.
        let missing = vec!["nose".to_string(), "abv".to_string()];
        assert!(build_query("X", "Y", &missing).contains("tasting notes"));
    }

    #[test]
    fn serper_response_maps_organic_results_only() {
        let json = r#"{
            "organic": [
                {"link": "https://a.example.com", "title": "A", "snippet": "sa"},
                {"link": "https://b.example.com", "title": "B", "snippet": "sb"}
            ],
            "ads": [{"link": "https://paid.example.com"}]
        }"#;
        let parsed: SerperResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.organic.len(), 2);
        assert_eq!(parsed.organic[0].link, "https://a.example.com");
    }
}
