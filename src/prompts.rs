//! Prompts for LLM-based field extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the extraction behaviour (e.g.
//!    tightening the fabrication rules or the response format) requires
//!    editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the prompts directly without
//!    calling a real model, making prompt regressions easy to catch.
//!
//! Callers can override the system prompt via
//! [`crate::config::PipelineConfig::system_prompt`]; the constant here is
//! used only when no override is provided.

/// Default system prompt for structured field extraction.
///
/// Low temperature plus these rules is the main defence against fabricated
/// content: the model is told to omit anything the document does not
/// explicitly support.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a precise document analyst. Your task is to extract structured facts from one document against a fixed field schema.

Follow these rules precisely:

1. NO FABRICATION
   - Return ONLY information explicitly stated in the document text
   - If you are not certain a field is supported by the text, omit it
   - Never infer, estimate, or fill gaps from general knowledge

2. COVERAGE
   - Extract EVERY fact the text supports for the listed fields
   - A field may have several distinct values; return each one

3. CONFIDENCE
   - Tag every value with a confidence label: "high", "medium", or "low"
   - "high" = stated verbatim; "medium" = lightly paraphrased; "low" = implied

4. LOCATION
   - When possible, include a short "location" hint (page, sheet, or slide)

5. OUTPUT FORMAT
   - Return ONLY a JSON object, no commentary and no code fences
   - Shape: {"section_key": {"field_key": [{"value": "...", "confidence": "high", "location": "page 2"}]}}
   - Every field value is a LIST of objects, even when there is one value
   - Include ONLY sections and fields that have at least one value"#;

/// Build the per-document user prompt.
///
/// Embeds the document name, the template schema summary (one line per field
/// with its extraction instruction), and the truncated document text.
pub fn extraction_prompt(document_name: &str, schema_summary: &str, document_text: &str) -> String {
    format!(
        "Document name: {document_name}\n\n\
         FIELD SCHEMA AND INSTRUCTIONS:\n{schema_summary}\n\
         DOCUMENT TEXT:\n{document_text}"
    )
}
