// Shared types for the vintry pipeline: field maps, the record status
// lattice, fetch tiers and outcomes, quality configuration, and the
// enrichment result surface.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Field maps
// ---------------------------------------------------------------------------

/// One extracted product field: a JSON value plus the extraction confidence
/// the AI collaborator assigned to it, in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: serde_json::Value,
    pub confidence: f32,
}

impl FieldValue {
    pub fn new(value: impl Into<serde_json::Value>, confidence: f32) -> Self {
        Self {
            value: value.into(),
            confidence,
        }
    }

    pub fn text(value: &str, confidence: f32) -> Self {
        Self::new(value, confidence)
    }

    /// A field that carries no usable value: JSON null, an empty or
    /// whitespace-only string, or an empty array. Absent and empty are
    /// treated identically by the quality gate.
    pub fn is_empty(&self) -> bool {
        match &self.value {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            _ => false,
        }
    }

    /// The value as a plain string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Product fields keyed by field name. BTreeMap for deterministic iteration:
/// the gate and merge logic must produce identical output on identical input.
pub type FieldMap = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// Record status lattice
// ---------------------------------------------------------------------------

/// Completeness status of a product record. The derive order is the
/// enrichment ordering: Rejected < Skeleton < Partial < Complete < Enriched.
/// Rejected is assigned only pre-enrichment and never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Rejected,
    Skeleton,
    Partial,
    Complete,
    Enriched,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordStatus::Rejected => "rejected",
            RecordStatus::Skeleton => "skeleton",
            RecordStatus::Partial => "partial",
            RecordStatus::Complete => "complete",
            RecordStatus::Enriched => "enriched",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Fetch tiers and outcomes
// ---------------------------------------------------------------------------

/// A fetch strategy of increasing cost and capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTier {
    /// Plain HTTP GET.
    Http,
    /// Headless-browser rendered fetch (JS executed).
    Rendered,
    /// Anti-bot capable fetch.
    Stealth,
}

impl FetchTier {
    pub const MAX: FetchTier = FetchTier::Stealth;

    pub fn as_u8(self) -> u8 {
        match self {
            FetchTier::Http => 1,
            FetchTier::Rendered => 2,
            FetchTier::Stealth => 3,
        }
    }

    pub fn from_u8(n: u8) -> Option<FetchTier> {
        match n {
            1 => Some(FetchTier::Http),
            2 => Some(FetchTier::Rendered),
            3 => Some(FetchTier::Stealth),
            _ => None,
        }
    }

    /// The next tier up, or None at the top of the ladder.
    pub fn next(self) -> Option<FetchTier> {
        match self {
            FetchTier::Http => Some(FetchTier::Rendered),
            FetchTier::Rendered => Some(FetchTier::Stealth),
            FetchTier::Stealth => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FetchTier::Http => "http",
            FetchTier::Rendered => "rendered",
            FetchTier::Stealth => "stealth",
        }
    }

    pub fn all() -> [FetchTier; 3] {
        [FetchTier::Http, FetchTier::Rendered, FetchTier::Stealth]
    }
}

impl std::fmt::Display for FetchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// What the fetched body looked like, independent of whether we keep it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContentSignals {
    pub http_status: u16,
    pub body_len: usize,
    /// Markers characteristic of an unrendered JS shell.
    pub placeholder_markers: bool,
    /// Explicit bot-challenge page text.
    pub challenge_markers: bool,
}

/// Why a fetch should move up a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Body is short and looks like an unrendered application shell.
    UnrenderedShell,
    /// Empty response body.
    EmptyBody,
    /// HTTP status associated with bot-challenge pages.
    ChallengeStatus,
    /// Challenge-page text markers in the body.
    ChallengeMarkers,
    /// The tier attempt failed outright (network error).
    FetchFailed,
    /// The tier attempt exceeded the domain's timeout budget.
    Timeout,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EscalationReason::UnrenderedShell => "unrendered_shell",
            EscalationReason::EmptyBody => "empty_body",
            EscalationReason::ChallengeStatus => "challenge_status",
            EscalationReason::ChallengeMarkers => "challenge_markers",
            EscalationReason::FetchFailed => "fetch_failed",
            EscalationReason::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: EscalationReason,
    pub recommended_tier: FetchTier,
}

/// Transient result of one tier attempt. Consumed by the router to update
/// the domain profile; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub tier: FetchTier,
    pub success: bool,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub signals: ContentSignals,
    pub escalation: Option<Escalation>,
}

/// A successfully fetched and cleaned page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub markdown: String,
    pub raw_html: String,
    pub content_hash: String,
    pub tier: FetchTier,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One organic search result. Sponsored results never reach this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// What the extraction collaborator returns for one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub fields: FieldMap,
    /// The content described more than one distinct product. Ambiguous
    /// sources are not merged; cross-record contamination is worse than a
    /// missing field.
    pub multiple_candidates: bool,
}

// ---------------------------------------------------------------------------
// Quality configuration and assessment
// ---------------------------------------------------------------------------

/// A configured field with its importance weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub weight: f32,
}

impl FieldSpec {
    pub fn new(name: &str, weight: f32) -> Self {
        Self {
            name: name.to_string(),
            weight,
        }
    }
}

/// Per-product-type quality configuration. Read-only to the core; supplied
/// by the configuration collaborator. Field order is importance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    pub product_type: String,
    pub required_fields: Vec<FieldSpec>,
    pub optional_fields: Vec<FieldSpec>,
    /// At least `any_of_min` of these must be present and non-empty for a
    /// record to be COMPLETE.
    pub any_of_fields: Vec<String>,
    pub any_of_min: usize,
    /// Every required field must carry at least this confidence.
    pub min_required_confidence: f32,
}

/// Deterministic verdict for one field set. Recomputed fresh on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub status: RecordStatus,
    pub completeness_score: f32,
    /// Missing fields in configured importance order.
    pub missing_fields: Vec<String>,
    /// Higher = more worth enriching. Zero for COMPLETE and REJECTED.
    pub enrichment_priority: f32,
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// Which source contributed which field at what confidence. Produced by the
/// merge step; storage belongs to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub field: String,
    pub source_url: String,
    pub confidence: f32,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Enrichment limits and outcome
// ---------------------------------------------------------------------------

/// Budgets for one enrichment invocation.
#[derive(Debug, Clone, TypedBuilder)]
pub struct EnrichmentLimits {
    #[builder(default = 5)]
    pub max_sources: usize,
    #[builder(default = 3)]
    pub max_searches: usize,
    #[builder(default = Duration::from_secs(90))]
    pub max_duration: Duration,
    /// Candidate fetch+extract parallelism within one search. Results are
    /// still merged in rank order.
    #[builder(default = 3)]
    pub fetch_concurrency: usize,
}

impl Default for EnrichmentLimits {
    fn default() -> Self {
        EnrichmentLimits::builder().build()
    }
}

/// Which budget fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Sources,
    Searches,
    Duration,
}

/// Why the enrichment loop stopped. Limit exhaustion is a normal, reported
/// outcome, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The record reached COMPLETE.
    Completed,
    /// No unconsulted candidate URLs remain from current or further searches.
    SourcesExhausted,
    /// A configured budget ran out.
    LimitReached(LimitKind),
}

/// Every source attempted during enrichment, including failures, so callers
/// can tell "ran out of good sources" from "ran out of budget".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultedSource {
    pub url: String,
    pub tier: Option<FetchTier>,
    pub fields_contributed: usize,
    pub error: Option<String>,
}

/// Terminal result of one enrichment invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentOutcome {
    pub record_id: Uuid,
    pub status_before: RecordStatus,
    pub status_after: RecordStatus,
    /// The merged field set at loop termination.
    pub fields: FieldMap,
    pub fields_changed: usize,
    pub sources: Vec<ConsultedSource>,
    pub searches_issued: usize,
    pub stop: StopReason,
    pub elapsed_ms: u64,
}

impl EnrichmentOutcome {
    /// True when the loop stopped on a budget rather than completion or
    /// source exhaustion.
    pub fn hit_limit(&self) -> bool {
        matches!(self.stop, StopReason::LimitReached(_))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fast hash for content dedup. Not cryptographic.
pub fn content_hash(content: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Dedup key for a real-world product: normalized name + brand + type.
/// Case, punctuation, and whitespace variations of the same product
/// fingerprint identically.
pub fn fingerprint(name: &str, brand: &str, product_type: &str) -> String {
    let norm = |s: &str| {
        s.to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
    };
    let key = format!("{}|{}|{}", norm(name), norm(brand), norm(product_type));
    format!("{:016x}", content_hash(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ordering_matches_lattice() {
        assert!(RecordStatus::Skeleton < RecordStatus::Partial);
        assert!(RecordStatus::Partial < RecordStatus::Complete);
        assert!(RecordStatus::Complete < RecordStatus::Enriched);
        assert!(RecordStatus::Rejected < RecordStatus::Skeleton);
    }

    #[test]
    fn tier_next_is_monotone_and_capped() {
        assert_eq!(FetchTier::Http.next(), Some(FetchTier::Rendered));
        assert_eq!(FetchTier::Rendered.next(), Some(FetchTier::Stealth));
        assert_eq!(FetchTier::Stealth.next(), None);
        assert!(FetchTier::Http < FetchTier::Rendered);
        assert!(FetchTier::Rendered < FetchTier::Stealth);
    }

    #[test]
    fn tier_u8_round_trip() {
        for tier in FetchTier::all() {
            assert_eq!(FetchTier::from_u8(tier.as_u8()), Some(tier));
        }
        assert_eq!(FetchTier::from_u8(0), None);
        assert_eq!(FetchTier::from_u8(4), None);
    }

    #[test]
    fn empty_field_values() {
        assert!(FieldValue::new(serde_json::Value::Null, 0.9).is_empty());
        assert!(FieldValue::text("", 0.9).is_empty());
        assert!(FieldValue::text("   ", 0.9).is_empty());
        assert!(FieldValue::new(serde_json::json!([]), 0.9).is_empty());
        assert!(!FieldValue::text("Islay", 0.9).is_empty());
        assert!(!FieldValue::new(serde_json::json!(43.0), 0.9).is_empty());
        assert!(!FieldValue::new(serde_json::json!(false), 0.9).is_empty());
    }

    #[test]
    fn fingerprint_normalizes_case_and_punctuation() {
        let a = fingerprint("Lagavulin 16 Year Old", "Lagavulin", "whisky");
        let b = fingerprint("lagavulin 16-year-old", "LAGAVULIN", "Whisky");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_products() {
        let a = fingerprint("Lagavulin 16", "Lagavulin", "whisky");
        let b = fingerprint("Lagavulin 8", "Lagavulin", "whisky");
        assert_ne!(a, b);
    }

    #[test]
    fn content_hash_deterministic() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("world"));
    }

    #[test]
    fn default_limits_are_sane() {
        let limits = EnrichmentLimits::default();
        assert_eq!(limits.max_sources, 5);
        assert_eq!(limits.max_searches, 3);
        assert!(limits.fetch_concurrency >= 1);
    }
}
