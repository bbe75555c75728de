// The tiered fetch router: one URL in, content plus outcome out. Consults
// the domain store for the starting tier and timeout budget, escalates on
// heuristic triggers, and records exactly one outcome per tier attempted.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use vintry_common::{
    content_hash, Config, ContentSignals, Escalation, EscalationReason, FetchOutcome, FetchTier,
    ScrapedPage,
};

use crate::domain::{normalize_domain, DomainProfile};
use crate::error::{FetchError, Result};
use crate::fetchers::{HttpFetcher, RenderedFetcher, StealthFetcher, TierFetcher};
use crate::heuristics::{detect_signals, escalation_reason, evaluate};
use crate::readability::html_to_markdown;
use crate::store::DomainStore;

pub struct FetchRouter {
    store: Arc<dyn DomainStore>,
    fetchers: Vec<Arc<dyn TierFetcher>>,
    max_tier: FetchTier,
}

impl FetchRouter {
    /// `fetchers` must cover every tier up to `max_tier`.
    pub fn new(
        store: Arc<dyn DomainStore>,
        fetchers: Vec<Arc<dyn TierFetcher>>,
        max_tier: FetchTier,
    ) -> Self {
        Self {
            store,
            fetchers,
            max_tier,
        }
    }

    /// Wire up the standard tier ladder from configuration.
    pub fn from_config(store: Arc<dyn DomainStore>, config: &Config) -> Self {
        let fetchers: Vec<Arc<dyn TierFetcher>> = vec![
            Arc::new(HttpFetcher::new()),
            Arc::new(RenderedFetcher::new(
                &config.browserless_url,
                config.browserless_token.as_deref(),
            )),
            Arc::new(StealthFetcher::new(
                &config.browserless_url,
                config.browserless_token.as_deref(),
            )),
        ];
        Self::new(store, fetchers, config.max_fetch_tier)
    }

    fn fetcher_for(&self, tier: FetchTier) -> Result<&Arc<dyn TierFetcher>> {
        self.fetchers
            .iter()
            .find(|f| f.tier() == tier)
            .ok_or_else(|| FetchError::Store(format!("no fetcher configured for tier {tier}")))
    }

    /// Fetch one URL, escalating through tiers as needed.
    pub async fn fetch(&self, url: &str) -> Result<(ScrapedPage, FetchOutcome)> {
        self.fetch_with_profile(url, None).await
    }

    /// Fetch with an explicit profile instead of the stored one. Outcomes
    /// are still recorded against the stored profile.
    pub async fn fetch_with_profile(
        &self,
        url: &str,
        profile_override: Option<DomainProfile>,
    ) -> Result<(ScrapedPage, FetchOutcome)> {
        let domain = normalize_domain(url)?;
        let profile = match profile_override {
            Some(p) => p,
            None => self.store.profile(&domain).await?,
        };

        // Budget and starting tier are drawn once per invocation; a budget
        // raised by this invocation's timeouts applies to the next one.
        let timeout = profile.timeout();
        let mut tier = profile.recommend_tier(self.max_tier);
        let mut tiers_tried: Vec<FetchTier> = Vec::new();

        loop {
            let fetcher = self.fetcher_for(tier)?;
            tiers_tried.push(tier);

            let started = Instant::now();
            let attempt = tokio::time::timeout(timeout, fetcher.fetch(url, timeout)).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match attempt {
                Ok(Ok(body)) => {
                    let signals = detect_signals(&body.html, body.http_status);
                    let reason = escalation_reason(&signals);
                    let escalation = evaluate(&signals, tier, self.max_tier);

                    let outcome = FetchOutcome {
                        tier,
                        success: reason.is_none(),
                        elapsed_ms,
                        timed_out: false,
                        signals,
                        escalation,
                    };
                    self.store.record_outcome(&domain, &outcome).await?;

                    if reason.is_none() {
                        info!(url, tier = %tier, elapsed_ms, bytes = body.html.len(), "Fetched successfully");
                        let markdown = html_to_markdown(&body.html, url);
                        let page = ScrapedPage {
                            url: url.to_string(),
                            content_hash: format!("{:016x}", content_hash(&body.html)),
                            raw_html: body.html,
                            markdown,
                            tier,
                            fetched_at: Utc::now(),
                        };
                        return Ok((page, outcome));
                    }

                    match escalation {
                        Some(esc) => {
                            warn!(
                                url, tier = %tier, reason = %esc.reason,
                                next_tier = %esc.recommended_tier,
                                "Escalating fetch tier"
                            );
                            tier = esc.recommended_tier;
                        }
                        None => {
                            warn!(url, tier = %tier, "Fetch unusable at top tier");
                            return Err(FetchError::TiersExhausted {
                                url: url.to_string(),
                                tiers_tried,
                            });
                        }
                    }
                }
                Ok(Err(e)) => {
                    let escalation = next_escalation(tier, self.max_tier, EscalationReason::FetchFailed);
                    let outcome = FetchOutcome {
                        tier,
                        success: false,
                        elapsed_ms,
                        timed_out: false,
                        signals: ContentSignals::default(),
                        escalation,
                    };
                    self.store.record_outcome(&domain, &outcome).await?;

                    match escalation {
                        Some(esc) => {
                            warn!(url, tier = %tier, error = %e, "Fetch failed, escalating");
                            tier = esc.recommended_tier;
                        }
                        None if tiers_tried.len() > 1 => {
                            return Err(FetchError::TiersExhausted {
                                url: url.to_string(),
                                tiers_tried,
                            });
                        }
                        None => {
                            return Err(FetchError::Network {
                                url: url.to_string(),
                                tier,
                                message: e.to_string(),
                            });
                        }
                    }
                }
                Err(_) => {
                    let escalation =
                        next_escalation(tier, self.max_tier, EscalationReason::Timeout);
                    let outcome = FetchOutcome {
                        tier,
                        success: false,
                        elapsed_ms,
                        timed_out: true,
                        signals: ContentSignals::default(),
                        escalation,
                    };
                    self.store.record_outcome(&domain, &outcome).await?;

                    match escalation {
                        Some(esc) => {
                            warn!(
                                url, tier = %tier, budget_ms = timeout.as_millis() as u64,
                                "Fetch timed out, escalating"
                            );
                            tier = esc.recommended_tier;
                        }
                        None => {
                            return Err(FetchError::Timeout {
                                url: url.to_string(),
                                tier,
                                budget_ms: timeout.as_millis() as u64,
                            });
                        }
                    }
                }
            }
        }
    }
}

fn next_escalation(
    current: FetchTier,
    max_tier: FetchTier,
    reason: EscalationReason,
) -> Option<Escalation> {
    current.next().filter(|t| *t <= max_tier).map(|next| Escalation {
        reason,
        recommended_tier: next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::FetchedBody;
    use crate::store::MemoryDomainStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// What a scripted tier does when asked to fetch.
    #[derive(Clone)]
    enum Script {
        Body(&'static str, u16),
        Fail,
        Hang,
    }

    struct ScriptedFetcher {
        tier: FetchTier,
        script: Script,
        calls: Arc<Mutex<Vec<FetchTier>>>,
    }

    #[async_trait]
    impl TierFetcher for ScriptedFetcher {
        fn tier(&self) -> FetchTier {
            self.tier
        }

        async fn fetch(&self, _url: &str, _timeout: Duration) -> anyhow::Result<FetchedBody> {
            self.calls.lock().unwrap().push(self.tier);
            match &self.script {
                Script::Body(html, status) => Ok(FetchedBody {
                    html: html.to_string(),
                    http_status: *status,
                }),
                Script::Fail => anyhow::bail!("connection refused"),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(300)).await;
                    unreachable!("hang script should always be timed out")
                }
            }
        }
    }

    const CHALLENGE_PAGE: &str = "Checking your browser before accessing shop.example.com";

    // Long enough to clear the rendered-shell threshold, free of any marker.
    const CLEAN_PAGE: &str = concat!(
        "<html><body><h1>Aged Single Malt</h1>",
        "<p>Tasting notes: honey, dried apricot, toasted oak, a long peppery finish. ",
        "Matured for twelve years in ex-bourbon casks before a sherry cask finish. ",
        "Bottled at 46% ABV without chill filtration or added colour. ",
        "Distilled on the coast, where the warehouses breathe sea air year round. ",
        "Pairs well with dark chocolate and blue cheese. ",
        "Each batch is drawn from no more than forty casks selected by the blender. ",
        "The distillery has operated continuously since 1824 apart from wartime pauses. ",
        "Water from the spring above the stillhouse is used for every mash. ",
        "Limited allocations ship to export markets twice a year.</p>",
        "</body></html>"
    );

    fn router(
        scripts: [Script; 3],
        store: Arc<MemoryDomainStore>,
    ) -> (FetchRouter, Arc<Mutex<Vec<FetchTier>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fetchers: Vec<Arc<dyn TierFetcher>> = FetchTier::all()
            .into_iter()
            .zip(scripts)
            .map(|(tier, script)| {
                Arc::new(ScriptedFetcher {
                    tier,
                    script,
                    calls: calls.clone(),
                }) as Arc<dyn TierFetcher>
            })
            .collect();
        (
            FetchRouter::new(store, fetchers, FetchTier::MAX),
            calls,
        )
    }

    #[tokio::test]
    async fn clean_tier_one_fetch_succeeds() {
        let store = Arc::new(MemoryDomainStore::new());
        let (router, calls) = router(
            [
                Script::Body(CLEAN_PAGE, 200),
                Script::Fail,
                Script::Fail,
            ],
            store.clone(),
        );

        let (page, outcome) = router.fetch("https://example.com/gin").await.unwrap();
        assert_eq!(page.tier, FetchTier::Http);
        assert!(outcome.success);
        assert_eq!(*calls.lock().unwrap(), vec![FetchTier::Http]);

        let profile = store.profile("example.com").await.unwrap();
        assert_eq!(profile.tier_stats(FetchTier::Http).successes, 1);
    }

    #[tokio::test]
    async fn challenge_page_escalates_to_rendered() {
        let store = Arc::new(MemoryDomainStore::new());
        let (router, calls) = router(
            [
                Script::Body(CHALLENGE_PAGE, 200),
                Script::Body(CLEAN_PAGE, 200),
                Script::Fail,
            ],
            store.clone(),
        );

        let (page, _) = router.fetch("https://shop.example.com/rum").await.unwrap();
        assert_eq!(page.tier, FetchTier::Rendered);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![FetchTier::Http, FetchTier::Rendered]
        );

        // One outcome per tier attempted, and the challenge marked the domain.
        let profile = store.profile("shop.example.com").await.unwrap();
        assert_eq!(profile.tier_stats(FetchTier::Http).failures, 1);
        assert_eq!(profile.tier_stats(FetchTier::Rendered).successes, 1);
        assert!(profile.likely_bot_protected);
    }

    #[tokio::test]
    async fn tiers_only_ever_increase() {
        let store = Arc::new(MemoryDomainStore::new());
        let (router, calls) = router(
            [
                Script::Body("", 200),
                Script::Body(CHALLENGE_PAGE, 403),
                Script::Body(CLEAN_PAGE, 200),
            ],
            store.clone(),
        );

        router.fetch("https://example.com/x").await.unwrap();
        let calls = calls.lock().unwrap();
        for pair in calls.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[tokio::test]
    async fn all_tiers_failing_is_terminal() {
        let store = Arc::new(MemoryDomainStore::new());
        let (router, _) = router(
            [
                Script::Body(CHALLENGE_PAGE, 403),
                Script::Body(CHALLENGE_PAGE, 403),
                Script::Body(CHALLENGE_PAGE, 403),
            ],
            store.clone(),
        );

        let err = router.fetch("https://example.com/x").await.unwrap_err();
        match err {
            FetchError::TiersExhausted { tiers_tried, .. } => {
                assert_eq!(
                    tiers_tried,
                    vec![FetchTier::Http, FetchTier::Rendered, FetchTier::Stealth]
                );
            }
            other => panic!("expected TiersExhausted, got {other:?}"),
        }

        // Exactly one outcome recorded per tier attempted.
        let profile = store.profile("example.com").await.unwrap();
        for tier in FetchTier::all() {
            assert_eq!(profile.tier_stats(tier).attempts, 1);
        }
    }

    #[tokio::test]
    async fn learned_bot_protection_skips_lower_tiers() {
        let store = Arc::new(MemoryDomainStore::new());
        // Teach the store that this domain serves challenges.
        for _ in 0..3 {
            let outcome = FetchOutcome {
                tier: FetchTier::Http,
                success: false,
                elapsed_ms: 40,
                timed_out: false,
                signals: ContentSignals {
                    http_status: 403,
                    body_len: 60,
                    placeholder_markers: false,
                    challenge_markers: true,
                },
                escalation: None,
            };
            store
                .record_outcome("shop.example.com", &outcome)
                .await
                .unwrap();
        }

        let (router, calls) = router(
            [Script::Fail, Script::Fail, Script::Body(CLEAN_PAGE, 200)],
            store.clone(),
        );
        let (page, _) = router.fetch("https://shop.example.com/y").await.unwrap();
        assert_eq!(page.tier, FetchTier::Stealth);
        assert_eq!(*calls.lock().unwrap(), vec![FetchTier::Stealth]);
    }

    #[tokio::test]
    async fn manual_tier_override_wins() {
        let store = Arc::new(MemoryDomainStore::new());
        store
            .set_tier_override("example.com", Some(FetchTier::Rendered))
            .await
            .unwrap();

        let (router, calls) = router(
            [Script::Fail, Script::Body(CLEAN_PAGE, 200), Script::Fail],
            store.clone(),
        );
        let (page, _) = router.fetch("https://www.example.com/z").await.unwrap();
        assert_eq!(page.tier, FetchTier::Rendered);
        assert_eq!(*calls.lock().unwrap(), vec![FetchTier::Rendered]);
    }

    #[tokio::test]
    async fn timeouts_escalate_then_surface_and_mark_the_domain_slow() {
        let store = Arc::new(MemoryDomainStore::new());
        store
            .set_timeout_override("slow.example.com", Some(20))
            .await
            .unwrap();

        let (router, calls) = router(
            [Script::Hang, Script::Hang, Script::Hang],
            store.clone(),
        );
        let err = router.fetch("https://slow.example.com/a").await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { tier: FetchTier::Stealth, .. }));
        assert_eq!(calls.lock().unwrap().len(), 3);

        let profile = store.profile("slow.example.com").await.unwrap();
        assert_eq!(profile.consecutive_timeouts, 3);
        assert!(profile.likely_slow);
        assert!(profile.timeout_budget_ms > crate::domain::DEFAULT_TIMEOUT_MS);
    }

    #[tokio::test]
    async fn network_failure_below_max_escalates() {
        let store = Arc::new(MemoryDomainStore::new());
        let (router, calls) = router(
            [Script::Fail, Script::Body(CLEAN_PAGE, 200), Script::Fail],
            store.clone(),
        );

        let (page, _) = router.fetch("https://example.com/b").await.unwrap();
        assert_eq!(page.tier, FetchTier::Rendered);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![FetchTier::Http, FetchTier::Rendered]
        );
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_without_fetching() {
        let store = Arc::new(MemoryDomainStore::new());
        let (router, calls) = router(
            [Script::Fail, Script::Fail, Script::Fail],
            store.clone(),
        );
        let err = router.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert!(calls.lock().unwrap().is_empty());
    }
}
