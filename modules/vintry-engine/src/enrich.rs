// The enrichment orchestrator: search → fetch → extract → merge → re-gate
// under explicit budgets. Limit exhaustion is a reported outcome, never an
// error; per-candidate fetch and extraction failures are recovered locally.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::{stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use vintry_common::{
    ConsultedSource, EnrichmentLimits, EnrichmentOutcome, Extraction, FieldMap, FieldValue,
    LimitKind, Provenance, QualityAssessment, RecordStatus, ScrapedPage, StopReason,
};

use crate::error::EngineError;
use crate::extract::FieldExtractor;
use crate::gate::{assess, is_placeholder_name, NAME_FIELD};
use crate::merge::merge_fields;
use crate::policy::RetryPolicy;
use crate::search::{build_query, Searcher};
use crate::traits::{Archiver, ContentFetcher, QualityConfigSource, RecordSink};

/// Organic results requested per search round.
const CANDIDATES_PER_SEARCH: usize = 5;

pub struct Enricher {
    fetcher: Arc<dyn ContentFetcher>,
    extractor: Arc<dyn FieldExtractor>,
    searcher: Arc<dyn Searcher>,
    configs: Arc<dyn QualityConfigSource>,
    sink: Arc<dyn RecordSink>,
    archiver: Arc<dyn Archiver>,
    retry: RetryPolicy,
}

impl Enricher {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        extractor: Arc<dyn FieldExtractor>,
        searcher: Arc<dyn Searcher>,
        configs: Arc<dyn QualityConfigSource>,
        sink: Arc<dyn RecordSink>,
        archiver: Arc<dyn Archiver>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            searcher,
            configs,
            sink,
            archiver,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one record through the enrichment loop.
    ///
    /// Stop conditions, first to trigger wins: COMPLETE reached (marked
    /// ENRICHED when at least one merge landed), `max_sources` consulted,
    /// `max_searches` issued, `max_duration` elapsed, or no unconsulted
    /// candidates remain.
    pub async fn enrich(
        &self,
        record_id: Uuid,
        product_type: &str,
        fields: FieldMap,
        limits: &EnrichmentLimits,
    ) -> Result<EnrichmentOutcome, EngineError> {
        let started = Instant::now();
        let config = self.configs.config_for(product_type).await?;

        let mut fields = fields;
        let mut assessment = assess(&fields, &config);
        let status_before = assessment.status;

        if status_before == RecordStatus::Complete {
            info!(%record_id, "Record already complete, nothing to enrich");
            return Ok(terminal(
                record_id,
                status_before,
                status_before,
                fields,
                0,
                Vec::new(),
                0,
                StopReason::Completed,
                started,
            ));
        }
        if status_before == RecordStatus::Rejected {
            warn!(%record_id, "Rejected record cannot be enriched");
            return Ok(terminal(
                record_id,
                status_before,
                status_before,
                fields,
                0,
                Vec::new(),
                0,
                StopReason::SourcesExhausted,
                started,
            ));
        }

        // Only field names the configuration knows may cross the merge
        // boundary; sources can emit anything.
        let allowed: HashSet<&str> = config
            .required_fields
            .iter()
            .chain(&config.optional_fields)
            .map(|spec| spec.name.as_str())
            .chain(config.any_of_fields.iter().map(String::as_str))
            .collect();

        let deadline = started + limits.max_duration;
        let mut sources: Vec<ConsultedSource> = Vec::new();
        let mut provenance: Vec<Provenance> = Vec::new();
        let mut consulted_urls: HashSet<String> = HashSet::new();
        let mut issued_queries: HashSet<String> = HashSet::new();
        let mut fields_changed = 0usize;
        let mut searches_issued = 0usize;
        let mut merged_any = false;

        let stop = loop {
            if assessment.status == RecordStatus::Complete {
                break StopReason::Completed;
            }
            if sources.len() >= limits.max_sources {
                break StopReason::LimitReached(LimitKind::Sources);
            }
            if searches_issued >= limits.max_searches {
                break StopReason::LimitReached(LimitKind::Searches);
            }
            if Instant::now() >= deadline {
                break StopReason::LimitReached(LimitKind::Duration);
            }

            let name = field_text(&fields, "name");
            let brand = field_text(&fields, "brand");
            let query = build_query(name, brand, &assessment.missing_fields);
            if !issued_queries.insert(query.clone()) {
                // The same query again would surface the same candidates.
                break StopReason::SourcesExhausted;
            }

            let hits = match self
                .retry
                .run("search", || {
                    self.searcher.search(&query, CANDIDATES_PER_SEARCH)
                })
                .await
            {
                Ok(hits) => hits,
                Err(e) if sources.is_empty() => {
                    return Err(EngineError::Search(e.to_string()));
                }
                Err(e) => {
                    // Progress was made; report it instead of discarding the
                    // pass over a dead search backend.
                    warn!(%record_id, error = %e, "Search failed mid-pass, finishing with consulted sources");
                    break StopReason::SourcesExhausted;
                }
            };
            searches_issued += 1;

            let budget = limits.max_sources - sources.len();
            let candidates: Vec<String> = hits
                .into_iter()
                .map(|h| h.url)
                .filter(|url| !consulted_urls.contains(url))
                .take(budget)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            consulted_urls.extend(candidates.iter().cloned());

            if Instant::now() >= deadline {
                break StopReason::LimitReached(LimitKind::Duration);
            }

            // Fetch and extract concurrently, but merge strictly in rank
            // order: buffered() yields in submission order regardless of
            // completion order, so merges are deterministic.
            let wanted = assessment.missing_fields.clone();
            let results: Vec<(String, Result<(ScrapedPage, Extraction), String>)> =
                stream::iter(candidates)
                    .map(|url| {
                        let fetcher = self.fetcher.clone();
                        let extractor = self.extractor.clone();
                        let wanted = wanted.clone();
                        let product_type = product_type.to_string();
                        async move {
                            let page = match fetcher.page(&url).await {
                                Ok(page) => page,
                                Err(e) => return (url, Err(e.to_string())),
                            };
                            match extractor
                                .extract(&page.markdown, &wanted, &product_type)
                                .await
                            {
                                Ok(extraction) => (url, Ok((page, extraction))),
                                Err(e) => (url, Err(e.to_string())),
                            }
                        }
                    })
                    .buffered(limits.fetch_concurrency.max(1))
                    .collect()
                    .await;

            for (url, result) in results {
                match result {
                    Ok((page, extraction)) => {
                        if extraction.multiple_candidates {
                            warn!(url, "Source described multiple products, skipping merge");
                            sources.push(ConsultedSource {
                                url,
                                tier: Some(page.tier),
                                fields_contributed: 0,
                                error: Some("content described multiple candidate products".to_string()),
                            });
                            continue;
                        }

                        let mut contributed = extraction.fields;
                        contributed.retain(|name, value| admissible(name, value, &allowed));

                        let (accepted, prov) =
                            merge_fields(&mut fields, contributed, &url, Utc::now());
                        fields_changed += accepted;
                        provenance.extend(prov);
                        if accepted > 0 {
                            merged_any = true;
                        }
                        info!(url, accepted, "Merged source contribution");
                        sources.push(ConsultedSource {
                            url,
                            tier: Some(page.tier),
                            fields_contributed: accepted,
                            error: None,
                        });
                    }
                    Err(message) => {
                        warn!(url, error = %message, "Candidate failed, continuing");
                        sources.push(ConsultedSource {
                            url,
                            tier: None,
                            fields_contributed: 0,
                            error: Some(message),
                        });
                    }
                }
            }

            assessment = assess(&fields, &config);
        };

        // Merges only add or upgrade fields, so the gate cannot classify the
        // record below where it started; the clamp keeps the reported
        // transition monotone under any future merge change.
        let status_after = if assessment.status == RecordStatus::Complete && merged_any {
            RecordStatus::Enriched
        } else {
            assessment.status.max(status_before)
        };

        if fields_changed > 0 || status_after != status_before {
            let final_assessment = QualityAssessment {
                status: status_after,
                ..assessment
            };
            self.sink
                .persist(record_id, &fields, &final_assessment, &provenance)
                .await?;

            for source in sources.iter().filter(|s| s.fields_contributed > 0) {
                self.archiver.archive(&source.url);
            }
        }

        info!(
            %record_id,
            status_before = %status_before,
            status_after = %status_after,
            sources = sources.len(),
            fields_changed,
            stop = ?stop,
            "Enrichment finished"
        );

        Ok(terminal(
            record_id,
            status_before,
            status_after,
            fields,
            fields_changed,
            sources,
            searches_issued,
            stop,
            started,
        ))
    }
}

fn field_text<'a>(fields: &'a FieldMap, name: &str) -> &'a str {
    fields.get(name).and_then(|f| f.as_str()).unwrap_or("")
}

/// Whether one contributed field may enter the merge. Unconfigured names are
/// dropped, and the identifying name field never accepts a placeholder value
/// at any confidence.
fn admissible(name: &str, value: &FieldValue, allowed: &HashSet<&str>) -> bool {
    if !allowed.contains(name) {
        return false;
    }
    if name == NAME_FIELD {
        return !value.as_str().map(is_placeholder_name).unwrap_or(false);
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn terminal(
    record_id: Uuid,
    status_before: RecordStatus,
    status_after: RecordStatus,
    fields: FieldMap,
    fields_changed: usize,
    sources: Vec<ConsultedSource>,
    searches_issued: usize,
    stop: StopReason,
    started: Instant,
) -> EnrichmentOutcome {
    EnrichmentOutcome {
        record_id,
        status_before,
        status_after,
        fields,
        fields_changed,
        sources,
        searches_issued,
        stop,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
