// Domain intelligence store: one profile per normalized domain, behind an
// atomic-update interface. The store is the only state shared across
// concurrent enrichment runs, so record_outcome must never lose updates.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use vintry_common::{FetchOutcome, FetchTier};

use crate::domain::{
    normalize_domain, DomainProfile, TierStats, DEFAULT_TIMEOUT_MS, TIMEOUTS_BEFORE_SLOW,
    TIMEOUT_CEILING_MS,
};
use crate::error::{FetchError, Result};
use crate::heuristics::is_challenge_status;

#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Fetch the profile for a domain, returning a default for domains never
    /// seen before. Idempotent; does not write.
    async fn profile(&self, domain: &str) -> Result<DomainProfile>;

    /// Fold one fetch outcome into the domain's profile. Must be atomic
    /// under concurrent callers; increments are never lost.
    async fn record_outcome(&self, domain: &str, outcome: &FetchOutcome) -> Result<()>;

    /// Set or clear the manual tier override for a domain.
    async fn set_tier_override(&self, domain: &str, tier: Option<FetchTier>) -> Result<()>;

    /// Set or clear the manual timeout override for a domain.
    async fn set_timeout_override(&self, domain: &str, timeout_ms: Option<u64>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Single-process store. All mutation happens under one write lock, which
/// serializes concurrent writers to the same map.
#[derive(Default)]
pub struct MemoryDomainStore {
    profiles: RwLock<HashMap<String, DomainProfile>>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DomainStore for MemoryDomainStore {
    async fn profile(&self, domain: &str) -> Result<DomainProfile> {
        let key = normalize_domain(domain)?;
        let profiles = self
            .profiles
            .read()
            .map_err(|e| FetchError::Store(e.to_string()))?;
        Ok(profiles
            .get(&key)
            .cloned()
            .unwrap_or_else(|| DomainProfile::new(&key)))
    }

    async fn record_outcome(&self, domain: &str, outcome: &FetchOutcome) -> Result<()> {
        let key = normalize_domain(domain)?;
        let mut profiles = self
            .profiles
            .write()
            .map_err(|e| FetchError::Store(e.to_string()))?;
        profiles
            .entry(key.clone())
            .or_insert_with(|| DomainProfile::new(&key))
            .apply(outcome);
        Ok(())
    }

    async fn set_tier_override(&self, domain: &str, tier: Option<FetchTier>) -> Result<()> {
        let key = normalize_domain(domain)?;
        let mut profiles = self
            .profiles
            .write()
            .map_err(|e| FetchError::Store(e.to_string()))?;
        let profile = profiles
            .entry(key.clone())
            .or_insert_with(|| DomainProfile::new(&key));
        profile.tier_override = tier;
        profile.updated_at = Utc::now();
        Ok(())
    }

    async fn set_timeout_override(&self, domain: &str, timeout_ms: Option<u64>) -> Result<()> {
        let key = normalize_domain(domain)?;
        let mut profiles = self
            .profiles
            .write()
            .map_err(|e| FetchError::Store(e.to_string()))?;
        let profile = profiles
            .entry(key.clone())
            .or_insert_with(|| DomainProfile::new(&key));
        profile.timeout_override_ms = timeout_ms;
        profile.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Postgres store
// ---------------------------------------------------------------------------

/// Durable store. record_outcome is a single INSERT .. ON CONFLICT DO UPDATE
/// whose SET expressions read the old row, so concurrent writers from
/// independent enrichment runs compose instead of clobbering each other.
pub struct PgDomainStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    domain: String,
    t1_attempts: i64,
    t1_successes: i64,
    t1_failures: i64,
    t1_avg_latency_ms: f64,
    t2_attempts: i64,
    t2_successes: i64,
    t2_failures: i64,
    t2_avg_latency_ms: f64,
    t3_attempts: i64,
    t3_successes: i64,
    t3_failures: i64,
    t3_avg_latency_ms: f64,
    likely_js_heavy: bool,
    likely_bot_protected: bool,
    likely_slow: bool,
    consecutive_timeouts: i32,
    timeout_budget_ms: i64,
    tier_override: Option<i16>,
    timeout_override_ms: Option<i64>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for DomainProfile {
    fn from(row: ProfileRow) -> Self {
        let mut tiers = std::collections::BTreeMap::new();
        for (n, attempts, successes, failures, avg) in [
            (1u8, row.t1_attempts, row.t1_successes, row.t1_failures, row.t1_avg_latency_ms),
            (2, row.t2_attempts, row.t2_successes, row.t2_failures, row.t2_avg_latency_ms),
            (3, row.t3_attempts, row.t3_successes, row.t3_failures, row.t3_avg_latency_ms),
        ] {
            if attempts > 0 {
                tiers.insert(
                    n,
                    TierStats {
                        attempts: attempts as u64,
                        successes: successes as u64,
                        failures: failures as u64,
                        avg_latency_ms: avg,
                    },
                );
            }
        }

        DomainProfile {
            domain: row.domain,
            tiers,
            likely_js_heavy: row.likely_js_heavy,
            likely_bot_protected: row.likely_bot_protected,
            likely_slow: row.likely_slow,
            consecutive_timeouts: row.consecutive_timeouts.max(0) as u32,
            timeout_budget_ms: row.timeout_budget_ms.max(0) as u64,
            tier_override: row
                .tier_override
                .and_then(|n| FetchTier::from_u8(n.max(0) as u8)),
            timeout_override_ms: row.timeout_override_ms.map(|n| n.max(0) as u64),
            updated_at: row.updated_at,
        }
    }
}

impl PgDomainStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| FetchError::Store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl DomainStore for PgDomainStore {
    async fn profile(&self, domain: &str) -> Result<DomainProfile> {
        let key = normalize_domain(domain)?;
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT * FROM domain_profiles WHERE domain = $1",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FetchError::Store(e.to_string()))?;

        Ok(row
            .map(DomainProfile::from)
            .unwrap_or_else(|| DomainProfile::new(&key)))
    }

    async fn record_outcome(&self, domain: &str, outcome: &FetchOutcome) -> Result<()> {
        let key = normalize_domain(domain)?;
        let t = outcome.tier.as_u8(); // 1..=3, internal, safe to splice

        // Every SET expression reads the pre-update row, so the whole fold
        // is one atomic statement.
        let sql = format!(
            r#"
            INSERT INTO domain_profiles
                (domain,
                 t{t}_attempts, t{t}_successes, t{t}_failures, t{t}_avg_latency_ms,
                 likely_js_heavy, likely_bot_protected, likely_slow,
                 consecutive_timeouts, timeout_budget_ms, updated_at)
            VALUES ($1, 1, $2, $3, $4, $5, $6, false, $7, $8, now())
            ON CONFLICT (domain) DO UPDATE SET
                t{t}_attempts = domain_profiles.t{t}_attempts + 1,
                t{t}_successes = domain_profiles.t{t}_successes + excluded.t{t}_successes,
                t{t}_failures = domain_profiles.t{t}_failures + excluded.t{t}_failures,
                t{t}_avg_latency_ms = domain_profiles.t{t}_avg_latency_ms
                    + ($4 - domain_profiles.t{t}_avg_latency_ms)
                      / (domain_profiles.t{t}_attempts + 1),
                likely_js_heavy = domain_profiles.likely_js_heavy OR excluded.likely_js_heavy,
                likely_bot_protected =
                    domain_profiles.likely_bot_protected OR excluded.likely_bot_protected,
                likely_slow = domain_profiles.likely_slow
                    OR ($9 AND domain_profiles.consecutive_timeouts + 1 >= $10),
                timeout_budget_ms = CASE
                    WHEN $9 AND domain_profiles.consecutive_timeouts + 1 >= $10
                        THEN LEAST((domain_profiles.timeout_budget_ms * 3) / 2, $11)
                    ELSE domain_profiles.timeout_budget_ms
                END,
                consecutive_timeouts = CASE
                    WHEN $9 THEN domain_profiles.consecutive_timeouts + 1
                    WHEN $12 THEN 0
                    ELSE domain_profiles.consecutive_timeouts
                END,
                updated_at = now()
            "#
        );

        sqlx::query(&sql)
            .bind(&key) // $1
            .bind(if outcome.success { 1i64 } else { 0 }) // $2
            .bind(if outcome.success { 0i64 } else { 1 }) // $3
            .bind(outcome.elapsed_ms as f64) // $4
            .bind(outcome.signals.placeholder_markers) // $5
            .bind(
                outcome.signals.challenge_markers
                    || is_challenge_status(outcome.signals.http_status),
            ) // $6
            .bind(if outcome.timed_out { 1i32 } else { 0 }) // $7
            .bind(DEFAULT_TIMEOUT_MS as i64) // $8
            .bind(outcome.timed_out) // $9
            .bind(TIMEOUTS_BEFORE_SLOW as i32) // $10
            .bind(TIMEOUT_CEILING_MS as i64) // $11
            .bind(outcome.success) // $12
            .execute(&self.pool)
            .await
            .map_err(|e| FetchError::Store(e.to_string()))?;

        Ok(())
    }

    async fn set_tier_override(&self, domain: &str, tier: Option<FetchTier>) -> Result<()> {
        let key = normalize_domain(domain)?;
        sqlx::query(
            r#"
            INSERT INTO domain_profiles (domain, timeout_budget_ms, tier_override, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (domain) DO UPDATE SET
                tier_override = excluded.tier_override,
                updated_at = now()
            "#,
        )
        .bind(&key)
        .bind(DEFAULT_TIMEOUT_MS as i64)
        .bind(tier.map(|t| t.as_u8() as i16))
        .execute(&self.pool)
        .await
        .map_err(|e| FetchError::Store(e.to_string()))?;
        Ok(())
    }

    async fn set_timeout_override(&self, domain: &str, timeout_ms: Option<u64>) -> Result<()> {
        let key = normalize_domain(domain)?;
        sqlx::query(
            r#"
            INSERT INTO domain_profiles (domain, timeout_budget_ms, timeout_override_ms, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (domain) DO UPDATE SET
                timeout_override_ms = excluded.timeout_override_ms,
                updated_at = now()
            "#,
        )
        .bind(&key)
        .bind(DEFAULT_TIMEOUT_MS as i64)
        .bind(timeout_ms.map(|n| n as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| FetchError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vintry_common::ContentSignals;

    fn outcome(tier: FetchTier, success: bool) -> FetchOutcome {
        FetchOutcome {
            tier,
            success,
            elapsed_ms: 50,
            timed_out: false,
            signals: ContentSignals {
                http_status: 200,
                body_len: 4000,
                placeholder_markers: false,
                challenge_markers: false,
            },
            escalation: None,
        }
    }

    #[tokio::test]
    async fn profile_is_lazy_and_idempotent() {
        let store = MemoryDomainStore::new();
        let a = store.profile("example.com").await.unwrap();
        let b = store.profile("example.com").await.unwrap();
        assert_eq!(a.domain, b.domain);
        assert_eq!(a.tier_stats(FetchTier::Http).attempts, 0);
    }

    #[tokio::test]
    async fn profile_recorded_under_one_form_is_retrievable_under_another() {
        let store = MemoryDomainStore::new();
        store
            .record_outcome("https://www.Example.com/page", &outcome(FetchTier::Http, true))
            .await
            .unwrap();

        let profile = store.profile("example.com").await.unwrap();
        assert_eq!(profile.tier_stats(FetchTier::Http).attempts, 1);

        let same = store.profile("WWW.EXAMPLE.COM").await.unwrap();
        assert_eq!(same.tier_stats(FetchTier::Http).attempts, 1);
    }

    #[tokio::test]
    async fn concurrent_writers_lose_no_increments() {
        use std::sync::Arc;

        let store = Arc::new(MemoryDomainStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store
                        .record_outcome("example.com", &outcome(FetchTier::Http, true))
                        .await
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let profile = store.profile("example.com").await.unwrap();
        assert_eq!(profile.tier_stats(FetchTier::Http).attempts, 400);
        assert_eq!(profile.tier_stats(FetchTier::Http).successes, 400);
    }

    #[tokio::test]
    async fn overrides_are_stored_and_cleared() {
        let store = MemoryDomainStore::new();
        store
            .set_tier_override("example.com", Some(FetchTier::Stealth))
            .await
            .unwrap();
        store
            .set_timeout_override("example.com", Some(30_000))
            .await
            .unwrap();

        let profile = store.profile("example.com").await.unwrap();
        assert_eq!(profile.tier_override, Some(FetchTier::Stealth));
        assert_eq!(profile.timeout_override_ms, Some(30_000));

        store.set_tier_override("example.com", None).await.unwrap();
        let profile = store.profile("example.com").await.unwrap();
        assert_eq!(profile.tier_override, None);
    }
}
