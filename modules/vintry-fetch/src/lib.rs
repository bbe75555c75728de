// Domain-aware tiered fetching: plain HTTP first, rendered browser second,
// anti-bot unblocking last, with per-domain learning about which tier and
// timeout budget each site needs.

pub mod domain;
pub mod error;
pub mod fetchers;
pub mod heuristics;
pub mod router;
pub mod store;

mod readability;

pub use domain::{normalize_domain, DomainProfile, TierStats};
pub use error::FetchError;
pub use fetchers::{FetchedBody, HttpFetcher, RenderedFetcher, StealthFetcher, TierFetcher};
pub use router::FetchRouter;
pub use store::{DomainStore, MemoryDomainStore, PgDomainStore};
