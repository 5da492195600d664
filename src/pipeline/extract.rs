//! Extraction: one model call per document, schema-validated response.
//!
//! One call per document (rather than one per field) cuts API cost and
//! latency roughly in proportion to field count; the prompt's explicit
//! formatting rules and the low sampling temperature are what make the
//! single-shot structured output reliable enough.
//!
//! ## Retry Strategy
//!
//! Retries are off by default: a failed document is recorded and skipped.
//! When `max_retries > 0`, only transient API failures (429/5xx, timeouts,
//! network) are retried with exponential backoff starting at
//! `retry_backoff_ms` and doubling per attempt. A response that parses wrong
//! is never
//! retried — resubmitting the same prompt at temperature 0.1 mostly
//! reproduces the same malformed answer.

use crate::backend::{CompletionOptions, ExtractionBackend};
use crate::config::PipelineConfig;
use crate::error::DocumentError;
use crate::output::{Confidence, ExtractedFact};
use crate::prompts::{extraction_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::template::Template;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Result of extracting one document.
#[derive(Debug)]
pub struct Extraction {
    pub facts: Vec<ExtractedFact>,
    /// API retries spent before the call succeeded.
    pub retries: u8,
}

/// Send one document's text to the model and validate the response.
pub async fn extract_document(
    backend: &Arc<dyn ExtractionBackend>,
    template: &Template,
    document_name: &str,
    document_text: &str,
    config: &PipelineConfig,
) -> Result<Extraction, DocumentError> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let user_prompt =
        extraction_prompt(document_name, &template.schema_summary(), document_text);
    let options = CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                document = %document_name,
                attempt,
                max = config.max_retries,
                backoff_ms = backoff,
                "retrying extraction"
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match backend.complete(system_prompt, &user_prompt, &options).await {
            Ok(raw) => {
                let facts = parse_response(&raw, document_name, template).map_err(|detail| {
                    DocumentError::Extraction {
                        document: document_name.to_string(),
                        detail,
                    }
                })?;
                debug!(document = %document_name, facts = facts.len(), "extraction complete");
                return Ok(Extraction {
                    facts,
                    retries: attempt as u8,
                });
            }
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                last_err = Some(e);
            }
            Err(e) => {
                return Err(DocumentError::Extraction {
                    document: document_name.to_string(),
                    detail: e.to_string(),
                });
            }
        }
    }

    // Only reachable when the final attempt's error was transient.
    Err(DocumentError::Extraction {
        document: document_name.to_string(),
        detail: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}

/// One `{value, confidence, location?}` entry on the wire.
#[derive(Debug, Deserialize)]
struct WireFact {
    value: String,
    confidence: Confidence,
    #[serde(default)]
    location: Option<String>,
}

/// Parse and validate the raw completion text into facts.
///
/// The response must be a JSON object of `{section: {field: [facts]}}`.
/// A single fact object instead of a list is tolerated; anything else in a
/// field slot is a shape mismatch that fails the whole document. Unknown
/// section or field keys are dropped with a warning — they are the model
/// inventing schema, and must never reach the output.
pub fn parse_response(
    raw: &str,
    document_name: &str,
    template: &Template,
) -> Result<Vec<ExtractedFact>, String> {
    let json = coerce_json_object(raw)?;
    let root: serde_json::Value =
        serde_json::from_str(json).map_err(|e| format!("response is not valid JSON: {e}"))?;
    let root = root
        .as_object()
        .ok_or_else(|| "response JSON is not an object".to_string())?;

    let mut facts = Vec::new();
    // serde_json is built with preserve_order, so response order survives —
    // it decides which fact is "first" for single-valued rules.
    for (section_key, section_value) in root {
        let section_obj = section_value.as_object().ok_or_else(|| {
            format!("section '{section_key}' in response is not an object")
        })?;
        for (field_key, field_value) in section_obj {
            if template.field(section_key, field_key).is_none() {
                warn!(
                    document = %document_name,
                    section = %section_key,
                    field = %field_key,
                    "dropping fact for unknown template field"
                );
                continue;
            }

            let wire_facts: Vec<WireFact> = if field_value.is_array() {
                serde_json::from_value(field_value.clone())
            } else {
                serde_json::from_value(field_value.clone()).map(|f| vec![f])
            }
            .map_err(|e| format!("'{section_key}.{field_key}': malformed fact: {e}"))?;

            for wire in wire_facts {
                let value = wire.value.trim().to_string();
                if value.is_empty() {
                    continue;
                }
                let source = match wire.location.as_deref().map(str::trim) {
                    Some(loc) if !loc.is_empty() => format!("{document_name} ({loc})"),
                    _ => document_name.to_string(),
                };
                facts.push(ExtractedFact {
                    section: section_key.clone(),
                    field: field_key.clone(),
                    value,
                    confidence: wire.confidence,
                    source,
                });
            }
        }
    }
    Ok(facts)
}

/// Cut the model's answer down to the outer JSON object.
///
/// We ask for strict JSON, but models occasionally wrap the answer in code
/// fences or add a sentence of prose. Stripping down to the outermost
/// `{...}` recovers those cases without loosening the schema validation.
fn coerce_json_object(raw: &str) -> Result<&str, String> {
    let start = raw
        .find('{')
        .ok_or_else(|| "no JSON object in response".to_string())?;
    let end = raw
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| "no JSON object in response".to_string())?;
    Ok(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn template() -> Template {
        Template::parse(
            r#"{
                "team": {
                    "founders": {"update_rule": "append", "instruction": "List founder names"},
                    "headcount": {"update_rule": "overwrite", "instruction": "Current headcount"}
                }
            }"#,
            Path::new("t.json"),
        )
        .unwrap()
    }

    #[test]
    fn parses_valid_response() {
        let raw = r#"{
            "team": {
                "founders": [
                    {"value": "Alice", "confidence": "high", "location": "slide 2"},
                    {"value": "Bob", "confidence": "medium"}
                ],
                "headcount": [{"value": "12", "confidence": "low"}]
            }
        }"#;
        let facts = parse_response(raw, "deck.pptx", &template()).unwrap();
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0].value, "Alice");
        assert_eq!(facts[0].source, "deck.pptx (slide 2)");
        assert_eq!(facts[0].confidence, Confidence::High);
        assert_eq!(facts[1].source, "deck.pptx");
    }

    #[test]
    fn strips_code_fences_and_prose() {
        let raw = "Here you go:\n```json\n{\"team\": {\"founders\": [{\"value\": \"Alice\", \"confidence\": \"high\"}]}}\n```\nDone!";
        let facts = parse_response(raw, "a.pdf", &template()).unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn single_object_tolerated_for_a_field() {
        let raw = r#"{"team": {"headcount": {"value": "12", "confidence": "high"}}}"#;
        let facts = parse_response(raw, "a.pdf", &template()).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].field, "headcount");
    }

    #[test]
    fn unknown_fields_are_dropped_not_fatal() {
        let raw = r#"{
            "team": {"founders": [{"value": "Alice", "confidence": "high"}]},
            "invented_section": {"x": [{"value": "y", "confidence": "low"}]}
        }"#;
        let facts = parse_response(raw, "a.pdf", &template()).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].section, "team");
    }

    #[test]
    fn bad_confidence_label_fails_the_document() {
        let raw = r#"{"team": {"founders": [{"value": "Alice", "confidence": "certain"}]}}"#;
        let err = parse_response(raw, "a.pdf", &template()).unwrap_err();
        assert!(err.contains("team.founders"), "got: {err}");
    }

    #[test]
    fn non_object_response_fails() {
        assert!(parse_response("[1, 2]", "a.pdf", &template()).is_err());
        assert!(parse_response("no json here", "a.pdf", &template()).is_err());
        assert!(parse_response(r#"{"team": "oops"}"#, "a.pdf", &template()).is_err());
    }

    #[test]
    fn empty_values_are_skipped() {
        let raw = r#"{"team": {"founders": [
            {"value": "   ", "confidence": "high"},
            {"value": "Bob", "confidence": "high"}
        ]}}"#;
        let facts = parse_response(raw, "a.pdf", &template()).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "Bob");
    }
}
