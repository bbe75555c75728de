// Per-domain fetch intelligence: normalized domain keys, learned tier
// statistics, and the tier recommendation logic.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vintry_common::{FetchOutcome, FetchTier};

use crate::error::FetchError;
use crate::heuristics::is_challenge_status;

/// Minimum attempts at a tier before its success rate is trusted.
pub const MIN_SAMPLES: u64 = 3;
/// Rolling success rate a tier must clear to be recommended.
pub const SUCCESS_THRESHOLD: f32 = 0.7;
/// Timeout budget for a domain we know nothing about.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
/// Hard ceiling for learned timeout budgets.
pub const TIMEOUT_CEILING_MS: u64 = 60_000;
/// Consecutive timeouts before a domain is flagged slow.
pub const TIMEOUTS_BEFORE_SLOW: u32 = 3;
/// Budget growth factor once a domain is flagged slow.
const SLOW_TIMEOUT_MULTIPLIER: f64 = 1.5;

/// Normalize a URL or bare host into a domain key: lowercase host with the
/// scheme and any leading `www.` stripped. Idempotent.
pub fn normalize_domain(input: &str) -> Result<String, FetchError> {
    let trimmed = input.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = url::Url::parse(&candidate).map_err(|e| FetchError::InvalidUrl {
        url: input.to_string(),
        message: e.to_string(),
    })?;

    let host = parsed
        .host_str()
        .ok_or_else(|| FetchError::InvalidUrl {
            url: input.to_string(),
            message: "URL has no host".to_string(),
        })?
        .to_lowercase();

    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Rolling statistics for one tier on one domain. Counters only ever grow.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TierStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
}

impl TierStats {
    pub fn success_rate(&self) -> f32 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f32 / self.attempts as f32
        }
    }
}

/// Learned fetch behavior for one normalized domain. Created lazily on first
/// fetch, mutated after every attempt, never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainProfile {
    pub domain: String,
    /// Stats keyed by tier number (1..=3).
    pub tiers: BTreeMap<u8, TierStats>,
    pub likely_js_heavy: bool,
    pub likely_bot_protected: bool,
    pub likely_slow: bool,
    pub consecutive_timeouts: u32,
    pub timeout_budget_ms: u64,
    /// Manual override: always wins over learned recommendations.
    pub tier_override: Option<FetchTier>,
    /// Manual override: always wins over the learned timeout budget.
    pub timeout_override_ms: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

impl DomainProfile {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            tiers: BTreeMap::new(),
            likely_js_heavy: false,
            likely_bot_protected: false,
            likely_slow: false,
            consecutive_timeouts: 0,
            timeout_budget_ms: DEFAULT_TIMEOUT_MS,
            tier_override: None,
            timeout_override_ms: None,
            updated_at: Utc::now(),
        }
    }

    pub fn tier_stats(&self, tier: FetchTier) -> TierStats {
        self.tiers.get(&tier.as_u8()).copied().unwrap_or_default()
    }

    /// Fold one fetch outcome into the profile. Pure state transition; the
    /// store decides how to make it atomic.
    pub fn apply(&mut self, outcome: &FetchOutcome) {
        let stats = self.tiers.entry(outcome.tier.as_u8()).or_default();
        stats.attempts += 1;
        if outcome.success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.avg_latency_ms +=
            (outcome.elapsed_ms as f64 - stats.avg_latency_ms) / stats.attempts as f64;

        if outcome.signals.placeholder_markers {
            self.likely_js_heavy = true;
        }
        if outcome.signals.challenge_markers || is_challenge_status(outcome.signals.http_status) {
            self.likely_bot_protected = true;
        }

        if outcome.timed_out {
            self.consecutive_timeouts += 1;
            if self.consecutive_timeouts >= TIMEOUTS_BEFORE_SLOW {
                self.likely_slow = true;
                self.timeout_budget_ms = ((self.timeout_budget_ms as f64
                    * SLOW_TIMEOUT_MULTIPLIER) as u64)
                    .min(TIMEOUT_CEILING_MS);
            }
        } else if outcome.success {
            self.consecutive_timeouts = 0;
        }

        self.updated_at = Utc::now();
    }

    /// Pick the tier a fresh fetch of this domain should start at.
    ///
    /// Precedence: manual override; flag floor (bot-protected domains start
    /// at stealth, JS-heavy at rendered); lowest tier at or above the floor
    /// with a trusted success rate; highest tier that has ever succeeded;
    /// the floor itself (plain HTTP for an unseen domain).
    pub fn recommend_tier(&self, max_tier: FetchTier) -> FetchTier {
        if let Some(tier) = self.tier_override {
            return tier.min(max_tier);
        }

        let floor = if self.likely_bot_protected {
            FetchTier::Stealth
        } else if self.likely_js_heavy {
            FetchTier::Rendered
        } else {
            FetchTier::Http
        };
        let floor = floor.min(max_tier);

        for tier in FetchTier::all() {
            if tier < floor || tier > max_tier {
                continue;
            }
            let stats = self.tier_stats(tier);
            if stats.attempts >= MIN_SAMPLES && stats.success_rate() >= SUCCESS_THRESHOLD {
                return tier;
            }
        }

        for tier in FetchTier::all().into_iter().rev() {
            if tier < floor || tier > max_tier {
                continue;
            }
            if self.tier_stats(tier).successes > 0 {
                return tier;
            }
        }

        floor
    }

    /// The timeout budget a fetch of this domain should carry.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_override_ms.unwrap_or(self.timeout_budget_ms))
    }
}
