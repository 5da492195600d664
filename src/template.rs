//! Master template: the field schema and per-field update policy that drives
//! both extraction and merging.
//!
//! The template is a JSON file mapping section → field → rule/instruction:
//!
//! ```json
//! {
//!   "team_and_organization": {
//!     "founders": {
//!       "update_rule": "append",
//!       "instruction": "List founder names and their roles"
//!     }
//!   }
//! }
//! ```
//!
//! Declared order matters: the consolidated report lists sections and fields
//! in exactly the order they appear in this file, regardless of the order in
//! which documents are processed or facts are discovered. Parsing goes through
//! `serde_json` with `preserve_order` enabled and the result is stored in
//! `Vec`s, so the ordering guarantee is explicit in the type rather than an
//! accident of map iteration.
//!
//! The template is loaded once at startup and read-only thereafter.

use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Reserved top-level key. Metadata is synthesised by the report writers,
/// never extracted, so a `document_metadata` section in the template file is
/// skipped rather than treated as a field group.
pub const METADATA_SECTION_KEY: &str = "document_metadata";

/// Policy governing how a field's value evolves as more documents are
/// processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateRule {
    /// All distinct values across documents accumulate as a list. (default)
    #[default]
    Append,
    /// The most recently processed document's value replaces any prior value.
    Overwrite,
    /// The first value ever seen wins; later values are discarded.
    Locked,
}

impl UpdateRule {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "append" => Some(UpdateRule::Append),
            "overwrite" => Some(UpdateRule::Overwrite),
            "locked" => Some(UpdateRule::Locked),
            _ => None,
        }
    }

    /// `true` for rules that resolve to a single value rather than a list.
    pub fn is_single_valued(self) -> bool {
        matches!(self, UpdateRule::Overwrite | UpdateRule::Locked)
    }
}

/// One extractable field of the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateField {
    pub key: String,
    pub rule: UpdateRule,
    /// Natural-language guidance embedded in the extraction prompt.
    pub instruction: String,
}

/// One named group of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSection {
    pub key: String,
    pub fields: Vec<TemplateField>,
}

/// The parsed master template. Sections and fields keep file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub sections: Vec<TemplateSection>,
}

impl Template {
    /// Load and parse a template file.
    pub fn from_path(path: &Path) -> Result<Self, ReportError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ReportError::TemplateNotFound {
                path: path.to_path_buf(),
            },
            _ => ReportError::TemplateInvalid {
                path: path.to_path_buf(),
                detail: e.to_string(),
            },
        })?;
        Self::parse(&raw, path)
    }

    /// Parse template JSON. `origin` is used only for error messages.
    pub fn parse(raw: &str, origin: &Path) -> Result<Self, ReportError> {
        let invalid = |detail: String| ReportError::TemplateInvalid {
            path: PathBuf::from(origin),
            detail,
        };

        let root: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
        let root = root
            .as_object()
            .ok_or_else(|| invalid("top level must be a JSON object".into()))?;

        let mut sections = Vec::with_capacity(root.len());
        for (section_key, section_value) in root {
            if section_key == METADATA_SECTION_KEY {
                continue;
            }
            let section_obj = section_value.as_object().ok_or_else(|| {
                invalid(format!("section '{section_key}' must be a JSON object"))
            })?;

            let mut fields = Vec::with_capacity(section_obj.len());
            for (field_key, field_value) in section_obj {
                let field_obj = field_value.as_object().ok_or_else(|| {
                    invalid(format!(
                        "field '{section_key}.{field_key}' must be a JSON object"
                    ))
                })?;

                let rule = match field_obj.get("update_rule") {
                    None => UpdateRule::default(),
                    Some(v) => {
                        let s = v.as_str().ok_or_else(|| {
                            invalid(format!(
                                "'{section_key}.{field_key}': update_rule must be a string"
                            ))
                        })?;
                        UpdateRule::parse(s).ok_or_else(|| {
                            invalid(format!(
                                "'{section_key}.{field_key}': unknown update_rule '{s}' \
                                 (expected append, overwrite, or locked)"
                            ))
                        })?
                    }
                };

                let instruction = field_obj
                    .get("instruction")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if instruction.is_empty() && rule != UpdateRule::Locked {
                    return Err(invalid(format!(
                        "'{section_key}.{field_key}': non-locked field is missing an instruction"
                    )));
                }

                fields.push(TemplateField {
                    key: field_key.clone(),
                    rule,
                    instruction,
                });
            }

            sections.push(TemplateSection {
                key: section_key.clone(),
                fields,
            });
        }

        if sections.is_empty() {
            return Err(invalid("template defines no sections".into()));
        }

        Ok(Template { sections })
    }

    /// Look up a field by section and field key.
    pub fn field(&self, section: &str, field: &str) -> Option<&TemplateField> {
        self.sections
            .iter()
            .find(|s| s.key == section)
            .and_then(|s| s.fields.iter().find(|f| f.key == field))
    }

    /// Total number of fields across all sections.
    pub fn field_count(&self) -> usize {
        self.sections.iter().map(|s| s.fields.len()).sum()
    }

    /// Compact text rendering of the schema for the extraction prompt.
    ///
    /// One line per field: `section.field: instruction`. Locked fields are
    /// included — the merger enforces first-seen semantics, but the first
    /// document still has to supply the value.
    pub fn schema_summary(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&section.key);
            out.push_str(":\n");
            for field in &section.fields {
                out.push_str("  ");
                out.push_str(&field.key);
                if !field.instruction.is_empty() {
                    out.push_str(": ");
                    out.push_str(&field.instruction);
                }
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Template, ReportError> {
        Template::parse(raw, Path::new("test-template.json"))
    }

    const SAMPLE: &str = r#"{
        "company_overview": {
            "legal_name": {"update_rule": "locked", "instruction": "Official legal name"},
            "description": {"update_rule": "overwrite", "instruction": "One-paragraph description"}
        },
        "team": {
            "founders": {"update_rule": "append", "instruction": "List founder names"}
        }
    }"#;

    #[test]
    fn preserves_declaration_order() {
        let t = parse(SAMPLE).unwrap();
        let sections: Vec<&str> = t.sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(sections, ["company_overview", "team"]);
        let fields: Vec<&str> = t.sections[0].fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(fields, ["legal_name", "description"]);
    }

    #[test]
    fn parses_rules() {
        let t = parse(SAMPLE).unwrap();
        assert_eq!(t.field("company_overview", "legal_name").unwrap().rule, UpdateRule::Locked);
        assert_eq!(t.field("company_overview", "description").unwrap().rule, UpdateRule::Overwrite);
        assert_eq!(t.field("team", "founders").unwrap().rule, UpdateRule::Append);
        assert_eq!(t.field_count(), 3);
    }

    #[test]
    fn missing_update_rule_defaults_to_append() {
        let t = parse(r#"{"s": {"f": {"instruction": "x"}}}"#).unwrap();
        assert_eq!(t.field("s", "f").unwrap().rule, UpdateRule::Append);
    }

    #[test]
    fn unknown_update_rule_is_rejected() {
        let err = parse(r#"{"s": {"f": {"update_rule": "merge", "instruction": "x"}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown update_rule 'merge'"));
    }

    #[test]
    fn missing_instruction_rejected_unless_locked() {
        assert!(parse(r#"{"s": {"f": {"update_rule": "append"}}}"#).is_err());
        assert!(parse(r#"{"s": {"f": {"update_rule": "locked"}}}"#).is_ok());
    }

    #[test]
    fn metadata_section_is_skipped() {
        let t = parse(
            r#"{"document_metadata": {"company": {"instruction": "x"}},
                "team": {"founders": {"instruction": "y"}}}"#,
        )
        .unwrap();
        assert_eq!(t.sections.len(), 1);
        assert_eq!(t.sections[0].key, "team");
    }

    #[test]
    fn non_object_section_is_rejected() {
        assert!(parse(r#"{"s": "not an object"}"#).is_err());
        assert!(parse(r#"["not", "an", "object"]"#).is_err());
        assert!(parse(r#"{"document_metadata": {}}"#).is_err()); // nothing left
    }

    #[test]
    fn schema_summary_lists_every_field_in_order() {
        let t = parse(SAMPLE).unwrap();
        let summary = t.schema_summary();
        let legal = summary.find("legal_name").unwrap();
        let desc = summary.find("description").unwrap();
        let founders = summary.find("founders").unwrap();
        assert!(legal < desc && desc < founders);
        assert!(summary.contains("List founder names"));
    }
}
