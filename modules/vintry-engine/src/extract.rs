// The extraction seam: the trait the orchestrator calls, and the wire type
// an AI-backed implementation asks the model to fill in.

use std::collections::BTreeMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use vintry_common::{Extraction, FieldMap, FieldValue};

use crate::error::ExtractionError;

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Extract the wanted fields from one page's cleaned content. The engine
    /// never substitutes synthetic output for a failure.
    async fn extract(
        &self,
        content: &str,
        wanted_fields: &[String],
        product_type: &str,
    ) -> Result<Extraction, ExtractionError>;
}

/// One extracted field as the model reports it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedField {
    /// The field value. Null when the content does not state it.
    pub value: serde_json::Value,
    /// Extraction confidence in [0, 1].
    pub confidence: f32,
}

/// The response schema handed to the extraction capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionPayload {
    /// Fields found in the content, keyed by requested field name.
    pub fields: BTreeMap<String, ExtractedField>,
    /// True when the content describes more than one distinct product.
    pub multiple_candidates: bool,
}

impl ExtractionPayload {
    /// The JSON schema an implementation sends with its extraction request.
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ExtractionPayload)
    }

    /// Validate and convert into the engine's extraction type. Confidence
    /// outside [0, 1] is a schema violation, not something to clamp over.
    pub fn into_extraction(self) -> Result<Extraction, ExtractionError> {
        let mut fields = FieldMap::new();
        for (name, field) in self.fields {
            if !(0.0..=1.0).contains(&field.confidence) {
                return Err(ExtractionError::SchemaMismatch(format!(
                    "field '{name}' has confidence {} outside [0, 1]",
                    field.confidence
                )));
            }
            fields.insert(name, FieldValue::new(field.value, field.confidence));
        }
        Ok(Extraction {
            fields,
            multiple_candidates: self.multiple_candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_payload_converts() {
        let payload: ExtractionPayload = serde_json::from_str(
            r#"{
                "fields": {
                    "abv": {"value": 46.0, "confidence": 0.9},
                    "finish": {"value": "long, smoky", "confidence": 0.7}
                },
                "multiple_candidates": false
            }"#,
        )
        .unwrap();

        let extraction = payload.into_extraction().unwrap();
        assert_eq!(extraction.fields.len(), 2);
        assert_eq!(extraction.fields["abv"].confidence, 0.9);
        assert!(!extraction.multiple_candidates);
    }

    #[test]
    fn out_of_range_confidence_is_a_schema_mismatch() {
        let payload: ExtractionPayload = serde_json::from_str(
            r#"{
                "fields": {"abv": {"value": 46.0, "confidence": 1.7}},
                "multiple_candidates": false
            }"#,
        )
        .unwrap();

        assert!(matches!(
            payload.into_extraction(),
            Err(ExtractionError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn schema_names_both_top_level_members() {
        let schema = serde_json::to_value(ExtractionPayload::schema()).unwrap();
        let props = &schema["properties"];
        assert!(props.get("fields").is_some());
        assert!(props.get("multiple_candidates").is_some());
    }
}
