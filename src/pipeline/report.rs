//! Report writers: serialise the consolidated report to JSON and DOCX.
//!
//! Both writers render from the same [`ConsolidatedReport`], so the two
//! outputs are content-equivalent by construction: a field appears in one
//! iff it appears in the other. The DOCX path goes through an intermediate
//! line model ([`DocxLine`]) so the document structure can be asserted in
//! tests without unpacking OOXML.
//!
//! Writes are atomic (temp file + rename) to prevent partial output files.
//! Write failures are fatal — but the in-memory report survives in the
//! caller's `RunOutput`, so the write can be retried without re-running
//! extraction.

use crate::error::ReportError;
use crate::output::ConsolidatedReport;
use docx_rs::{Docx, Paragraph, Run};
use std::path::Path;
use tracing::info;

// ── JSON output ──────────────────────────────────────────────────────────

/// Render the report as a JSON tree mirroring the template.
///
/// `append` fields serialise as arrays of `{value, source, confidence}`;
/// `overwrite`/`locked` fields as a single such object. `report_metadata`
/// leads the document (the map preserves insertion order).
pub fn report_to_json(report: &ConsolidatedReport) -> serde_json::Value {
    let mut root = serde_json::Map::new();
    root.insert(
        "report_metadata".to_string(),
        serde_json::json!({
            "generated_at": report.metadata.generated_at,
            "model": report.metadata.model,
            "sources_reviewed": report.metadata.sources_reviewed,
        }),
    );

    for section in &report.sections {
        let mut section_obj = serde_json::Map::new();
        for field in &section.fields {
            let mut values: Vec<serde_json::Value> = field
                .values
                .iter()
                .map(|v| serde_json::json!(v))
                .collect();
            let entry = if field.rule.is_single_valued() {
                // values is never empty for an emitted field
                values.remove(0)
            } else {
                serde_json::Value::Array(values)
            };
            section_obj.insert(field.key.clone(), entry);
        }
        root.insert(section.key.clone(), serde_json::Value::Object(section_obj));
    }

    serde_json::Value::Object(root)
}

/// Write the JSON output atomically.
pub async fn write_json(report: &ConsolidatedReport, path: &Path) -> Result<(), ReportError> {
    let json = report_to_json(report);
    let mut body = serde_json::to_string_pretty(&json).map_err(|e| {
        ReportError::Internal(format!("JSON serialisation failed: {e}"))
    })?;
    body.push('\n');

    let write_failed = |source| ReportError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &body).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;

    info!("JSON report written: {}", path.display());
    Ok(())
}

// ── DOCX output ──────────────────────────────────────────────────────────

/// One rendered line of the DOCX document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocxLine {
    /// Document title.
    Title(String),
    /// Section heading.
    Heading(String),
    /// Field sub-heading.
    SubHeading(String),
    /// One value bullet with its `[source — confidence]` annotation.
    Bullet { text: String, annotation: String },
    /// Metadata line.
    Meta(String),
}

/// Flatten the report into the line model the DOCX builder consumes.
pub fn docx_lines(report: &ConsolidatedReport) -> Vec<DocxLine> {
    let mut lines = vec![
        DocxLine::Title("Consolidated Report".to_string()),
        DocxLine::Heading("Report Metadata".to_string()),
        DocxLine::Meta(format!(
            "Generated: {}",
            report.metadata.generated_at.to_rfc3339()
        )),
        DocxLine::Meta(format!("Model: {}", report.metadata.model)),
        DocxLine::Meta(format!(
            "Sources reviewed: {}",
            report.metadata.sources_reviewed.join(", ")
        )),
    ];

    for section in &report.sections {
        lines.push(DocxLine::Heading(title_case(&section.key)));
        for field in &section.fields {
            lines.push(DocxLine::SubHeading(title_case(&field.key)));
            for value in &field.values {
                lines.push(DocxLine::Bullet {
                    text: value.value.clone(),
                    annotation: format!("[{} — {}]", value.source, value.confidence),
                });
            }
        }
    }
    lines
}

/// Build the DOCX document from the line model.
pub fn build_docx(report: &ConsolidatedReport) -> Docx {
    let mut docx = Docx::new();
    for line in docx_lines(report) {
        let paragraph = match line {
            DocxLine::Title(text) => {
                Paragraph::new().add_run(Run::new().add_text(text).size(48).bold())
            }
            DocxLine::Heading(text) => {
                Paragraph::new().add_run(Run::new().add_text(text).size(32).bold())
            }
            DocxLine::SubHeading(text) => {
                Paragraph::new().add_run(Run::new().add_text(text).size(24).bold())
            }
            DocxLine::Bullet { text, annotation } => Paragraph::new()
                .add_run(Run::new().add_text(format!("• {text}")))
                .add_run(
                    Run::new()
                        .add_text(format!("  {annotation}"))
                        .size(16)
                        .italic()
                        .color("808080"),
                ),
            DocxLine::Meta(text) => Paragraph::new().add_run(Run::new().add_text(text)),
        };
        docx = docx.add_paragraph(paragraph);
    }
    docx
}

/// Write the DOCX output atomically. Packing is blocking zip I/O, so it runs
/// on the blocking pool.
pub async fn write_docx(report: &ConsolidatedReport, path: &Path) -> Result<(), ReportError> {
    let report = report.clone();
    let path_buf = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let write_failed = |source| ReportError::OutputWriteFailed {
            path: path_buf.clone(),
            source,
        };

        if let Some(parent) = path_buf.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_failed)?;
        }
        let tmp_path = path_buf.with_extension("docx.tmp");
        let file = std::fs::File::create(&tmp_path).map_err(write_failed)?;
        build_docx(&report)
            .build()
            .pack(file)
            .map_err(|e| write_failed(std::io::Error::other(e)))?;
        std::fs::rename(&tmp_path, &path_buf).map_err(write_failed)?;
        Ok(())
    })
    .await
    .map_err(|e| ReportError::Internal(format!("DOCX write task panicked: {e}")))??;

    info!("DOCX report written: {}", path.display());
    Ok(())
}

/// `team_and_organization` → `Team And Organization`.
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Confidence, FieldValue, ReportField, ReportMetadata, ReportSection};
    use crate::template::UpdateRule;
    use chrono::Utc;

    fn sample_report() -> ConsolidatedReport {
        ConsolidatedReport {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                model: "gpt-4o".into(),
                sources_reviewed: vec!["a.pdf".into(), "b.pptx".into()],
            },
            sections: vec![
                ReportSection {
                    key: "overview".into(),
                    fields: vec![ReportField {
                        key: "headcount".into(),
                        rule: UpdateRule::Overwrite,
                        values: vec![FieldValue {
                            value: "14".into(),
                            source: "b.pptx".into(),
                            confidence: Confidence::High,
                        }],
                    }],
                },
                ReportSection {
                    key: "team_and_organization".into(),
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
                                source: "b.pptx (slide 2)".into(),
                                confidence: Confidence::Medium,
                            },
                        ],
                    }],
                },
            ],
        }
    }

    #[test]
    fn json_mirrors_tree_and_rule_shapes() {
        let v = report_to_json(&sample_report());
        // Metadata leads the object (insertion order preserved).
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys[0], "report_metadata");
        assert_eq!(keys[1], "overview");

        // Single-valued rule: object, not array.
        assert_eq!(v["overview"]["headcount"]["value"], "14");
        assert_eq!(v["overview"]["headcount"]["confidence"], "high");

        // Append rule: array.
        let founders = v["team_and_organization"]["founders"].as_array().unwrap();
        assert_eq!(founders.len(), 2);
        assert_eq!(founders[1]["source"], "b.pptx (slide 2)");
    }

    #[test]
    fn every_json_value_has_source_and_confidence() {
        let v = report_to_json(&sample_report());
        for (key, section) in v.as_object().unwrap() {
            if key == "report_metadata" {
                continue;
            }
            for field in section.as_object().unwrap().values() {
                let entries: Vec<&serde_json::Value> = match field {
                    serde_json::Value::Array(a) => a.iter().collect(),
                    single => vec![single],
                };
                for entry in entries {
                    assert!(!entry["source"].as_str().unwrap().is_empty());
                    let c = entry["confidence"].as_str().unwrap();
                    assert!(["high", "medium", "low"].contains(&c));
                }
            }
        }
    }

    #[test]
    fn docx_and_json_are_content_equivalent() {
        let report = sample_report();
        let json = report_to_json(&report);
        let lines = docx_lines(&report);

        // Every value in the JSON appears as a DOCX bullet, and vice versa.
        let bullets: Vec<&str> = lines
            .iter()
            .filter_map(|l| match l {
                DocxLine::Bullet { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(bullets, ["14", "Alice", "Bob"]);

        // Every populated field gets a sub-heading.
        let subheadings = lines
            .iter()
            .filter(|l| matches!(l, DocxLine::SubHeading(_)))
            .count();
        let json_fields: usize = json
            .as_object()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k != "report_metadata")
            .map(|(_, s)| s.as_object().unwrap().len())
            .sum();
        assert_eq!(subheadings, json_fields);
    }

    #[test]
    fn bullets_carry_source_annotations() {
        let lines = docx_lines(&sample_report());
        let annotation = lines
            .iter()
            .find_map(|l| match l {
                DocxLine::Bullet { text, annotation } if text == "Bob" => Some(annotation),
                _ => None,
            })
            .unwrap();
        assert_eq!(annotation, "[b.pptx (slide 2) — medium]");
    }

    #[test]
    fn title_case_humanises_keys() {
        assert_eq!(title_case("team_and_organization"), "Team And Organization");
        assert_eq!(title_case("founders"), "Founders");
        assert_eq!(title_case("__x__"), "X");
    }

    #[tokio::test]
    async fn json_write_is_atomic_and_parseable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        write_json(&sample_report(), &path).await.unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["report_metadata"]["model"], "gpt-4o");
        // No temp file left behind.
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn docx_write_produces_a_zip_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.docx");
        write_docx(&sample_report(), &path).await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], b"PK", "DOCX must be a zip archive");
        assert!(!path.with_extension("docx.tmp").exists());
    }
}
