// The quality gate: a pure, deterministic classification of one field set
// against one quality configuration. Re-run after every merge, so identical
// input must always yield identical output.

use vintry_common::{FieldMap, QualityAssessment, QualityConfig, RecordStatus};

/// The identifying field. A record without one can never progress.
pub const NAME_FIELD: &str = "name";

/// Name values that mean "no name". Case-insensitive.
const NAME_PLACEHOLDERS: &[&str] = &["unknown", "n/a", "none", "untitled", "tbd"];

/// True for values of the identifying name field that mean "no name".
pub fn is_placeholder_name(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    NAME_PLACEHOLDERS.contains(&value.as_str())
}

/// Priority head start for a record missing required fields entirely.
const SKELETON_BASE_PRIORITY: f32 = 100.0;
/// Priority head start for a record short only on any-of or confidence.
const PARTIAL_BASE_PRIORITY: f32 = 50.0;
/// Additional priority per missing required field.
const MISSING_REQUIRED_WEIGHT: f32 = 10.0;

fn present(fields: &FieldMap, name: &str) -> bool {
    fields.get(name).is_some_and(|f| !f.is_empty())
}

fn name_is_placeholder(fields: &FieldMap) -> bool {
    match fields.get(NAME_FIELD) {
        None => true,
        Some(f) if f.is_empty() => true,
        Some(f) => f.as_str().map(is_placeholder_name).unwrap_or(false),
    }
}

/// Classify one field set. Pure function of its arguments.
///
/// Status precedence, first match wins: REJECTED (no usable name), COMPLETE
/// (all required present, any-of quota met, required confidence at
/// threshold), PARTIAL (required present but any-of or confidence short),
/// SKELETON. ENRICHED is assigned only by the orchestrator, never here.
pub fn assess(fields: &FieldMap, config: &QualityConfig) -> QualityAssessment {
    let missing_required: Vec<&str> = config
        .required_fields
        .iter()
        .filter(|spec| !present(fields, &spec.name))
        .map(|spec| spec.name.as_str())
        .collect();

    let any_of_satisfied = config
        .any_of_fields
        .iter()
        .filter(|name| present(fields, name))
        .count();

    let required_confident = config.required_fields.iter().all(|spec| {
        fields
            .get(&spec.name)
            .is_some_and(|f| f.confidence >= config.min_required_confidence)
    });

    // Weighted fraction of configured fields present and non-empty.
    let mut weight_present = 0.0f32;
    let mut weight_total = 0.0f32;
    for spec in config.required_fields.iter().chain(&config.optional_fields) {
        weight_total += spec.weight;
        if present(fields, &spec.name) {
            weight_present += spec.weight;
        }
    }
    let completeness_score = if weight_total > 0.0 {
        weight_present / weight_total
    } else {
        0.0
    };

    let status = if name_is_placeholder(fields) {
        RecordStatus::Rejected
    } else if missing_required.is_empty()
        && any_of_satisfied >= config.any_of_min
        && required_confident
    {
        RecordStatus::Complete
    } else if missing_required.is_empty() {
        RecordStatus::Partial
    } else {
        RecordStatus::Skeleton
    };

    // Missing fields in importance order: required, then unsatisfied any-of,
    // then optional. The orchestrator targets the front of this list.
    let mut missing_fields: Vec<String> =
        missing_required.iter().map(|s| s.to_string()).collect();
    if any_of_satisfied < config.any_of_min {
        missing_fields.extend(
            config
                .any_of_fields
                .iter()
                .filter(|name| !present(fields, name))
                .cloned(),
        );
    }
    missing_fields.extend(
        config
            .optional_fields
            .iter()
            .filter(|spec| !present(fields, &spec.name))
            .map(|spec| spec.name.clone()),
    );

    let enrichment_priority = match status {
        RecordStatus::Complete | RecordStatus::Enriched | RecordStatus::Rejected => 0.0,
        RecordStatus::Skeleton => {
            SKELETON_BASE_PRIORITY + MISSING_REQUIRED_WEIGHT * missing_required.len() as f32
        }
        RecordStatus::Partial => PARTIAL_BASE_PRIORITY,
    };

    QualityAssessment {
        status,
        completeness_score,
        missing_fields,
        enrichment_priority,
    }
}

/// `assess`, with record age folded into the priority. Older incomplete
/// records float upward so the backlog does not starve. The gate itself
/// stays pure; callers that schedule work pass the age in.
pub fn assess_with_age(fields: &FieldMap, config: &QualityConfig, age_days: u32) -> QualityAssessment {
    let mut assessment = assess(fields, config);
    if assessment.enrichment_priority > 0.0 {
        assessment.enrichment_priority += age_days.min(30) as f32;
    }
    assessment
}
