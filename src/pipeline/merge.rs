//! Merger: fold per-document facts into the consolidated report.
//!
//! The merger owns the only piece of mutable run state. Documents must be
//! absorbed in processing order (the scanner's file-listing order) — that
//! order is what gives `overwrite` ("last document wins") and `locked`
//! ("first document wins") their meaning. Extraction may run concurrently,
//! but absorption is strictly sequential.
//!
//! Output ordering never depends on absorption: the report follows template
//! declaration order because the merger's slots are laid out parallel to the
//! template itself.

use crate::output::{ConsolidatedReport, ExtractedFact, FieldValue, ReportField, ReportMetadata, ReportSection};
use crate::template::{Template, UpdateRule};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalised comparison key for deduplication: lowercased, inner whitespace
/// collapsed, trimmed. Two values with equal keys are the same value no
/// matter which document or confidence they came from.
pub fn dedup_key(value: &str) -> String {
    RE_WS.replace_all(value, " ").trim().to_lowercase()
}

struct FieldSlot {
    values: Vec<FieldValue>,
    /// Dedup keys of `values`, for `append` fields.
    seen: HashSet<String>,
}

/// Accumulates facts document by document; [`Merger::finish`] yields the
/// immutable [`ConsolidatedReport`] handed to the writers.
pub struct Merger<'a> {
    template: &'a Template,
    /// One slot per template field, indexed [section][field].
    slots: Vec<Vec<FieldSlot>>,
}

impl<'a> Merger<'a> {
    pub fn new(template: &'a Template) -> Self {
        let slots = template
            .sections
            .iter()
            .map(|s| {
                s.fields
                    .iter()
                    .map(|_| FieldSlot {
                        values: Vec::new(),
                        seen: HashSet::new(),
                    })
                    .collect()
            })
            .collect();
        Merger { template, slots }
    }

    /// Fold in one document's facts, applying each field's update rule.
    ///
    /// Within a single document, the first fact for an `overwrite` or
    /// `locked` field is the document's resolved value; later facts for the
    /// same field in the same response are ignored.
    pub fn absorb(&mut self, facts: &[ExtractedFact]) {
        // Single-valued fields this document has already settled.
        let mut claimed: HashSet<(usize, usize)> = HashSet::new();

        for fact in facts {
            let Some((si, fi, rule)) = self.locate(&fact.section, &fact.field) else {
                // Extraction already validated keys; an unknown key here is a
                // caller passing facts from a different template.
                debug!(section = %fact.section, field = %fact.field, "ignoring fact for unknown field");
                continue;
            };
            let slot = &mut self.slots[si][fi];

            match rule {
                UpdateRule::Locked => {
                    if slot.values.is_empty() {
                        slot.values.push(FieldValue::from(fact));
                    }
                }
                UpdateRule::Overwrite => {
                    if claimed.insert((si, fi)) {
                        slot.values.clear();
                        slot.values.push(FieldValue::from(fact));
                    }
                }
                UpdateRule::Append => {
                    if slot.seen.insert(dedup_key(&fact.value)) {
                        slot.values.push(FieldValue::from(fact));
                    }
                }
            }
        }
    }

    /// Build the final report: template order, empty fields and sections
    /// omitted.
    pub fn finish(self, metadata: ReportMetadata) -> ConsolidatedReport {
        let sections = self
            .template
            .sections
            .iter()
            .zip(self.slots)
            .filter_map(|(section, slots)| {
                let fields: Vec<ReportField> = section
                    .fields
                    .iter()
                    .zip(slots)
                    .filter(|(_, slot)| !slot.values.is_empty())
                    .map(|(field, slot)| ReportField {
                        key: field.key.clone(),
                        rule: field.rule,
                        values: slot.values,
                    })
                    .collect();
                (!fields.is_empty()).then(|| ReportSection {
                    key: section.key.clone(),
                    fields,
                })
            })
            .collect();

        ConsolidatedReport { metadata, sections }
    }

    fn locate(&self, section: &str, field: &str) -> Option<(usize, usize, UpdateRule)> {
        let (si, s) = self
            .template
            .sections
            .iter()
            .enumerate()
            .find(|(_, s)| s.key == section)?;
        let (fi, f) = s.fields.iter().enumerate().find(|(_, f)| f.key == field)?;
        Some((si, fi, f.rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Confidence;
    use chrono::Utc;
    use std::path::Path;

    fn template() -> Template {
        Template::parse(
            r#"{
                "overview": {
                    "legal_name": {"update_rule": "locked", "instruction": "Legal name"},
                    "headcount": {"update_rule": "overwrite", "instruction": "Headcount"}
                },
                "team": {
                    "founders": {"update_rule": "append", "instruction": "Founders"}
                }
            }"#,
            Path::new("t.json"),
        )
        .unwrap()
    }

    fn fact(section: &str, field: &str, value: &str, source: &str) -> ExtractedFact {
        ExtractedFact {
            section: section.into(),
            field: field.into(),
            value: value.into(),
            confidence: Confidence::High,
            source: source.into(),
        }
    }

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            generated_at: Utc::now(),
            model: "gpt-4o".into(),
            sources_reviewed: vec![],
        }
    }

    #[test]
    fn dedup_key_normalises() {
        assert_eq!(dedup_key("  Alice   Smith "), dedup_key("alice smith"));
        assert_eq!(dedup_key("A\tB\nC"), "a b c");
        assert_ne!(dedup_key("Alice"), dedup_key("Alicia"));
    }

    #[test]
    fn locked_keeps_first_seen_value() {
        let t = template();
        let mut m = Merger::new(&t);
        m.absorb(&[fact("overview", "legal_name", "Acme Oy", "a.pdf")]);
        m.absorb(&[fact("overview", "legal_name", "Acme Inc", "b.pdf")]);
        let report = m.finish(metadata());
        let f = report.field("overview", "legal_name").unwrap();
        assert_eq!(f.values.len(), 1);
        assert_eq!(f.values[0].value, "Acme Oy");
        assert_eq!(f.values[0].source, "a.pdf");
    }

    #[test]
    fn overwrite_keeps_last_document() {
        let t = template();
        let mut m = Merger::new(&t);
        m.absorb(&[fact("overview", "headcount", "10", "a.pdf")]);
        m.absorb(&[fact("overview", "headcount", "14", "b.pdf")]);
        let report = m.finish(metadata());
        let f = report.field("overview", "headcount").unwrap();
        assert_eq!(f.values.len(), 1);
        assert_eq!(f.values[0].value, "14");
    }

    #[test]
    fn overwrite_first_fact_within_one_document_wins() {
        let t = template();
        let mut m = Merger::new(&t);
        m.absorb(&[
            fact("overview", "headcount", "12", "a.pdf"),
            fact("overview", "headcount", "99", "a.pdf"),
        ]);
        let report = m.finish(metadata());
        assert_eq!(report.field("overview", "headcount").unwrap().values[0].value, "12");
    }

    #[test]
    fn append_dedups_case_and_whitespace_insensitively() {
        let t = template();
        let mut m = Merger::new(&t);
        m.absorb(&[fact("team", "founders", "Alice Smith", "a.pdf")]);
        m.absorb(&[
            fact("team", "founders", "alice  smith", "b.pdf"),
            fact("team", "founders", "Bob Jones", "b.pdf"),
        ]);
        let report = m.finish(metadata());
        let f = report.field("team", "founders").unwrap();
        let values: Vec<&str> = f.values.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(values, ["Alice Smith", "Bob Jones"]);
        // Two distinct sources survive.
        assert_eq!(f.values[0].source, "a.pdf");
        assert_eq!(f.values[1].source, "b.pdf");
    }

    #[test]
    fn output_order_follows_template_not_absorption() {
        let t = template();
        let mut m = Merger::new(&t);
        // Facts arrive team-first; report must still lead with overview.
        m.absorb(&[
            fact("team", "founders", "Alice", "a.pdf"),
            fact("overview", "headcount", "5", "a.pdf"),
        ]);
        let report = m.finish(metadata());
        let keys: Vec<&str> = report.sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["overview", "team"]);
    }

    #[test]
    fn unsupported_fields_and_sections_are_omitted() {
        let t = template();
        let mut m = Merger::new(&t);
        m.absorb(&[fact("team", "founders", "Alice", "a.pdf")]);
        let report = m.finish(metadata());
        // overview had no facts at all: absent, not empty.
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].key, "team");
        assert!(report.field("overview", "legal_name").is_none());
    }

    #[test]
    fn empty_run_yields_empty_sections() {
        let t = template();
        let report = Merger::new(&t).finish(metadata());
        assert!(report.sections.is_empty());
        assert_eq!(report.value_count(), 0);
    }
}
