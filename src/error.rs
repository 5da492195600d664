//! Error types for the docs2report library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReportError`] — **Fatal**: the run cannot proceed or cannot persist its
//!   result (missing template, no API key, output write failure). Returned as
//!   `Err(ReportError)` from the top-level `run*` functions.
//!
//! * [`DocumentError`] — **Non-fatal**: a single source document failed
//!   (unreadable file, malformed model response) but the remaining documents
//!   are fine. Stored inside [`crate::output::DocumentOutcome`] so callers can
//!   inspect partial success rather than losing the whole run to one bad file.
//!
//! The separation lets callers decide their own tolerance: abort on the first
//! document failure, log and continue, or collect all errors for a post-run
//! report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docs2report library.
///
/// Document-level failures use [`DocumentError`] and are stored in
/// [`crate::output::DocumentOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ReportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Template file was not found at the given path.
    #[error("Template file not found: '{path}'\nCheck the path exists and is readable.")]
    TemplateNotFound { path: PathBuf },

    /// Template file exists but does not parse into the expected shape.
    #[error("Template '{path}' is invalid: {detail}")]
    TemplateInvalid { path: PathBuf, detail: String },

    /// The documents directory does not exist or is not a directory.
    #[error("Documents directory not found: '{path}'")]
    DocsDirNotFound { path: PathBuf },

    /// The documents directory contains no supported files.
    #[error(
        "No supported documents found in '{path}'\n\
         Supported extensions: .pdf, .xlsx, .xls, .pptx"
    )]
    NoDocuments { path: PathBuf },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// No API credential was supplied and none was found in the environment.
    #[error(
        "No API key configured.\n\
         Set OPENAI_API_KEY or supply a key via PipelineConfig::builder().api_key(..)."
    )]
    MissingApiKey,

    /// Every document failed; a report would contain nothing.
    #[error("All {total} documents failed.\nFirst error: {first_error}")]
    AllDocumentsFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file. The in-memory report is
    /// preserved in the `RunOutput` returned by `run()`, so the caller can
    /// retry the write without re-running extraction.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single source document.
///
/// Stored in [`crate::output::DocumentOutcome`] when a document fails.
/// The overall run continues unless ALL documents fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The file could not be read or yielded no extractable text
    /// (encrypted PDF, image-only pages, empty workbook).
    #[error("'{document}': read failed: {detail}")]
    Read { document: String, detail: String },

    /// The extraction API call failed, or its response was not valid
    /// structured output.
    #[error("'{document}': extraction failed: {detail}")]
    Extraction { document: String, detail: String },
}

impl DocumentError {
    /// Name of the document this error belongs to.
    pub fn document(&self) -> &str {
        match self {
            DocumentError::Read { document, .. } => document,
            DocumentError::Extraction { document, .. } => document,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_documents_failed_display() {
        let e = ReportError::AllDocumentsFailed {
            total: 4,
            first_error: "boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("4 documents"), "got: {msg}");
        assert!(msg.contains("boom"));
    }

    #[test]
    fn missing_api_key_mentions_env_var() {
        assert!(ReportError::MissingApiKey
            .to_string()
            .contains("OPENAI_API_KEY"));
    }

    #[test]
    fn document_error_carries_name() {
        let e = DocumentError::Extraction {
            document: "pitch.pdf".into(),
            detail: "HTTP 429".into(),
        };
        assert_eq!(e.document(), "pitch.pdf");
        assert!(e.to_string().contains("pitch.pdf"));
        assert!(e.to_string().contains("429"));
    }

    #[test]
    fn read_error_display() {
        let e = DocumentError::Read {
            document: "scan.pdf".into(),
            detail: "no extractable text".into(),
        };
        assert!(e.to_string().contains("read failed"));
    }
}
