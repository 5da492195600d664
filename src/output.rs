//! Output types: extracted facts, the consolidated report, and run statistics.
//!
//! [`ConsolidatedReport`] is the single source of truth for both serialised
//! outputs — the JSON file and the DOCX document both render from this one
//! in-memory structure, which is what guarantees they stay content-equivalent.

use crate::error::DocumentError;
use crate::pipeline::input::DocumentKind;
use crate::template::UpdateRule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative reliability tag attached to each extracted value by the model.
///
/// Any label outside this set in a model response is a schema violation and
/// fails the document's extraction (no silent defaulting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// One value bound to a template field, produced by extraction from a single
/// document. Created per document per API response, consumed immediately by
/// the merger, never persisted individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFact {
    /// Template section key.
    pub section: String,
    /// Template field key.
    pub field: String,
    /// The extracted value text.
    pub value: String,
    pub confidence: Confidence,
    /// Originating document name, plus a location hint when the model
    /// supplied one (e.g. `"deck.pptx (slide 4)"`). Never empty.
    pub source: String,
}

/// One merged value in the consolidated report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    pub source: String,
    pub confidence: Confidence,
}

impl From<&ExtractedFact> for FieldValue {
    fn from(fact: &ExtractedFact) -> Self {
        FieldValue {
            value: fact.value.clone(),
            source: fact.source.clone(),
            confidence: fact.confidence,
        }
    }
}

/// A populated field of the consolidated report.
///
/// Invariant: `values` is never empty — fields with no supporting evidence
/// are omitted from the report entirely, never emitted as placeholders.
/// For `overwrite`/`locked` rules `values` holds exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportField {
    pub key: String,
    pub rule: UpdateRule,
    pub values: Vec<FieldValue>,
}

/// A populated section of the consolidated report. Field order follows the
/// template declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub key: String,
    pub fields: Vec<ReportField>,
}

/// Run-level metadata emitted at the top of both outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    /// Model id the extraction ran against.
    pub model: String,
    /// Every successfully extracted document, in processing order.
    pub sources_reviewed: Vec<String>,
}

/// The merged output of a full run. Same tree shape as the template, with
/// unsupported fields and empty sections omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    pub metadata: ReportMetadata,
    pub sections: Vec<ReportSection>,
}

impl ConsolidatedReport {
    /// Total number of values across all fields.
    pub fn value_count(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| &s.fields)
            .map(|f| f.values.len())
            .sum()
    }

    /// Look up a populated field.
    pub fn field(&self, section: &str, field: &str) -> Option<&ReportField> {
        self.sections
            .iter()
            .find(|s| s.key == section)
            .and_then(|s| s.fields.iter().find(|f| f.key == field))
    }
}

/// Per-document result record, one per scanned file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// File name (not the full path).
    pub document: String,
    pub kind: DocumentKind,
    /// Characters actually submitted to the model after truncation.
    /// Zero when the document failed before submission.
    pub chars_submitted: usize,
    /// Facts the model returned that passed schema validation.
    pub facts_extracted: usize,
    /// API retries spent on this document.
    pub retries: u8,
    pub read_duration_ms: u64,
    pub llm_duration_ms: u64,
    /// Set when the document was skipped; `None` means success.
    pub error: Option<DocumentError>,
}

impl DocumentOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub documents_found: usize,
    pub documents_processed: usize,
    pub documents_failed: usize,
    /// Facts returned by the model across all documents.
    pub facts_extracted: usize,
    /// Values present in the report after update rules and deduplication.
    pub facts_merged: usize,
    pub total_duration_ms: u64,
    pub read_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// Everything a run produces: the report plus per-document outcomes and
/// aggregate stats. Returned even when output files still need writing, so a
/// failed write can be retried without re-running extraction.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: ConsolidatedReport,
    pub outcomes: Vec<DocumentOutcome>,
    pub stats: RunStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_round_trips_lowercase() {
        let json = serde_json::to_string(&Confidence::High).unwrap();
        assert_eq!(json, "\"high\"");
        let back: Confidence = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(back, Confidence::Medium);
    }

    #[test]
    fn unknown_confidence_label_fails() {
        assert!(serde_json::from_str::<Confidence>("\"certain\"").is_err());
    }

    #[test]
    fn value_count_sums_all_fields() {
        let report = ConsolidatedReport {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                model: "gpt-4o".into(),
                sources_reviewed: vec!["a.pdf".into()],
            },
            sections: vec![ReportSection {
                key: "team".into(),
                fields: vec![ReportField {
                    key: "founders".into(),
                    rule: UpdateRule::Append,
                    values: vec![
                        FieldValue {
                            value: "Alice".into(),
                            source: "a.pdf".into(),
                            confidence: Confidence::High,
                        },
                        FieldValue {
                            value: "Bob".into(),
                            source: "a.pdf".into(),
                            confidence: Confidence::Low,
                        },
                    ],
                }],
            }],
        };
        assert_eq!(report.value_count(), 2);
        assert!(report.field("team", "founders").is_some());
        assert!(report.field("team", "advisors").is_none());
    }
}
