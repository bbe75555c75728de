// Record quality and enrichment: the deterministic quality gate, the
// confidence-priority merge, search query construction, and the orchestrator
// that drives search → fetch → extract → merge under explicit budgets.

pub mod enrich;
pub mod error;
pub mod extract;
pub mod gate;
pub mod merge;
pub mod policy;
pub mod search;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use enrich::Enricher;
pub use error::{EngineError, ExtractionError};
pub use extract::{ExtractionPayload, FieldExtractor};
pub use gate::{assess, assess_with_age};
pub use merge::merge_fields;
pub use policy::RetryPolicy;
pub use search::{build_query, Searcher, SerperSearcher};
pub use traits::{
    Archiver, CachedConfigSource, ContentFetcher, NullArchiver, QualityConfigSource, RecordSink,
    WaybackArchiver,
};
