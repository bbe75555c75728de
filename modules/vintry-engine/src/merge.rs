// Confidence-priority field merge. Once a field holds a non-empty value its
// confidence only ever climbs within a session; on a tie the stored value
// wins so replays of the same sources are deterministic.

use chrono::{DateTime, Utc};

use vintry_common::{FieldMap, Provenance};

/// Fold one source's contribution into the record. Returns the number of
/// fields accepted and the provenance entries for them.
///
/// Acceptance: the field was absent (or held an empty value), or the new
/// confidence strictly exceeds the stored one. Empty contributed values are
/// ignored outright; an absent field is never backfilled with nothing.
///
/// A stored empty value counts as absent, so replacing it may record a lower
/// confidence than the empty placeholder carried. The monotone-confidence
/// guarantee holds only once a non-empty value is stored.
pub fn merge_fields(
    current: &mut FieldMap,
    contributed: FieldMap,
    source_url: &str,
    now: DateTime<Utc>,
) -> (usize, Vec<Provenance>) {
    let mut accepted = 0;
    let mut provenance = Vec::new();

    for (name, incoming) in contributed {
        if incoming.is_empty() {
            continue;
        }
        let take = match current.get(&name) {
            None => true,
            Some(existing) if existing.is_empty() => true,
            Some(existing) => incoming.confidence > existing.confidence,
        };
        if !take {
            continue;
        }

        provenance.push(Provenance {
            field: name.clone(),
            source_url: source_url.to_string(),
            confidence: incoming.confidence,
            recorded_at: now,
        });
        current.insert(name, incoming);
        accepted += 1;
    }

    (accepted, provenance)
}
