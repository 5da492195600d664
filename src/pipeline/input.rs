//! Input scan: enumerate source documents and fix the processing order.
//!
//! ## Why sort by file name?
//!
//! `overwrite` and `locked` rules make the consolidated result depend on the
//! order documents are processed. Directory iteration order is an OS detail,
//! so the scanner sorts by file name to give every run (and every platform)
//! the same order. Extraction may then run concurrently; merging still
//! happens in this listing order.

use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported source document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Spreadsheet,
    Presentation,
}

impl DocumentKind {
    /// Detect the format from a file extension. `None` for unsupported files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "xlsx" | "xls" => Some(DocumentKind::Spreadsheet),
            "pptx" => Some(DocumentKind::Presentation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Spreadsheet => "spreadsheet",
            DocumentKind::Presentation => "presentation",
        }
    }
}

/// One discovered source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// File name used as the source reference in extracted facts.
    pub name: String,
    pub kind: DocumentKind,
}

/// List supported documents in `dir`, sorted by file name.
///
/// Subdirectories and unsupported extensions are skipped. An empty result is
/// an error: a run over nothing would silently produce an empty report.
pub fn scan_documents(dir: &Path) -> Result<Vec<SourceDocument>, ReportError> {
    if !dir.is_dir() {
        return Err(ReportError::DocsDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ReportError::Internal(format!(
        "failed to list '{}': {e}",
        dir.display()
    )))?;

    let mut documents = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ReportError::Internal(e.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(kind) = DocumentKind::from_path(&path) else {
            debug!("skipping unsupported file: {}", path.display());
            continue;
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        documents.push(SourceDocument { path, name, kind });
    }

    if documents.is_empty() {
        return Err(ReportError::NoDocuments {
            path: dir.to_path_buf(),
        });
    }

    // Deterministic processing order, independent of the OS iteration order.
    documents.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("found {} documents in {}", documents.len(), dir.display());
    Ok(documents)
}
