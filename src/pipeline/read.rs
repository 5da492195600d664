//! Document readers: per-format text extraction with a truncation ceiling.
//!
//! ## Why spawn_blocking?
//!
//! `pdf-extract`, `calamine`, and `zip` are synchronous, CPU-bound crates.
//! `tokio::task::spawn_blocking` moves the work onto the blocking thread pool
//! so Tokio worker threads are not stalled while a large workbook parses.
//!
//! ## Why truncate instead of chunk?
//!
//! The pipeline makes exactly one API call per document. Cutting text at
//! [`crate::config::PipelineConfig::max_document_chars`] keeps that contract
//! for arbitrarily long inputs, trading completeness for predictable cost.
//! The cut is measured in `char`s so the submitted text of an over-long
//! document is exactly the ceiling long.

use crate::error::DocumentError;
use crate::pipeline::input::{DocumentKind, SourceDocument};
use calamine::{open_workbook_auto, Data, Reader as SheetReader};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use regex::Regex;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Read a document to one flattened, normalised, truncated text blob.
///
/// Failure (unreadable file, encrypted or image-only content, nothing left
/// after normalisation) is a per-document [`DocumentError::Read`]; the run
/// skips the file and continues.
pub async fn read_document(
    doc: &SourceDocument,
    max_chars: usize,
) -> Result<String, DocumentError> {
    let path = doc.path.clone();
    let kind = doc.kind;
    let name = doc.name.clone();

    let raw = tokio::task::spawn_blocking(move || read_blocking(&path, kind))
        .await
        .map_err(|e| DocumentError::Read {
            document: name.clone(),
            detail: format!("read task panicked: {e}"),
        })?
        .map_err(|detail| DocumentError::Read {
            document: name.clone(),
            detail,
        })?;

    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        return Err(DocumentError::Read {
            document: name,
            detail: "no extractable text (image-only or empty document)".into(),
        });
    }

    let truncated = truncate_chars(&text, max_chars);
    if truncated.len() < text.len() {
        debug!(
            document = %doc.name,
            ceiling = max_chars,
            "document text truncated"
        );
    }
    Ok(truncated)
}

/// Blocking dispatch on format. Errors are plain detail strings; the async
/// wrapper attaches the document name.
fn read_blocking(path: &Path, kind: DocumentKind) -> Result<String, String> {
    match kind {
        DocumentKind::Pdf => read_pdf(path),
        DocumentKind::Spreadsheet => read_spreadsheet(path),
        DocumentKind::Presentation => read_presentation(path),
    }
}

/// Extract text from every page of a PDF.
fn read_pdf(path: &Path) -> Result<String, String> {
    pdf_extract::extract_text(path).map_err(|e| format!("PDF extraction failed: {e}"))
}

/// Flatten a workbook: one banner per sheet, rows joined with ` | `,
/// blank rows dropped.
fn read_spreadsheet(path: &Path) -> Result<String, String> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| format!("workbook open failed: {e}"))?;

    let mut text = String::new();
    let sheet_names = workbook.sheet_names().to_owned();
    for sheet_name in sheet_names {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| format!("sheet '{sheet_name}' unreadable: {e}"))?;

        text.push_str(&format!("\n=== Sheet: {sheet_name} ===\n"));
        for row in range.rows() {
            let row_text = row
                .iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" | ");
            if !row_text.trim_matches([' ', '|']).is_empty() {
                text.push_str(&row_text);
                text.push('\n');
            }
        }
    }
    Ok(text)
}

static RE_SLIDE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

/// Flatten a PPTX: slides in numeric order with banners, text pulled from
/// the `<a:t>` runs inside each slide's XML.
fn read_presentation(path: &Path) -> Result<String, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("open failed: {e}"))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("not a valid PPTX archive: {e}"))?;

    // Slide entries are not stored in slide order; sort by slide number.
    let mut slides: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            RE_SLIDE_ENTRY
                .captures(name)
                .and_then(|c| c[1].parse().ok())
                .map(|num: usize| (num, name.to_string()))
        })
        .collect();
    slides.sort_unstable();

    if slides.is_empty() {
        return Err("presentation contains no slides".into());
    }

    let mut text = String::new();
    for (num, entry_name) in slides {
        let mut xml = String::new();
        archive
            .by_name(&entry_name)
            .map_err(|e| format!("slide {num} unreadable: {e}"))?
            .read_to_string(&mut xml)
            .map_err(|e| format!("slide {num} unreadable: {e}"))?;

        text.push_str(&format!("\n=== Slide {num} ===\n"));
        text.push_str(&slide_text(&xml).map_err(|e| format!("slide {num}: {e}"))?);
    }
    Ok(text)
}

/// Pull the visible text runs out of one slide's XML.
fn slide_text(xml: &str) -> Result<String, String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut text = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"a:t" => in_text_run = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"a:t" => in_text_run = false,
            // Paragraph boundaries become line breaks.
            Ok(Event::End(e)) if e.name().as_ref() == b"a:p" => text.push('\n'),
            Ok(Event::Text(t)) if in_text_run => {
                let chunk = t.unescape().map_err(|e| format!("bad XML text: {e}"))?;
                text.push_str(&chunk);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error: {e}")),
            _ => {}
        }
    }
    Ok(text)
}

static RE_TABS_CR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\t\r]+").unwrap());
static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

/// Collapse whitespace noise from extractors: NBSP → space, tab/CR runs →
/// one space, 3+ blank lines → one, multi-space → one. Trimmed.
pub fn normalize_whitespace(s: &str) -> String {
    let s = s.replace('\u{a0}', " ");
    let s = RE_TABS_CR.replace_all(&s, " ");
    let s = RE_BLANK_RUNS.replace_all(&s, "\n\n");
    let s = RE_SPACE_RUNS.replace_all(&s, " ");
    s.trim().to_string()
}

/// Cut to at most `max` characters (not bytes), respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_noise() {
        let s = "a\u{a0}b\t\tc\r\n\n\n\n\nd   e";
        assert_eq!(normalize_whitespace(s), "a b c\n\nd e");
    }

    #[test]
    fn truncate_is_exact_in_chars() {
        let long = "ä".repeat(50);
        let cut = truncate_chars(&long, 30);
        assert_eq!(cut.chars().count(), 30);

        let short = "abc";
        assert_eq!(truncate_chars(short, 30), "abc");

        // Exactly at the ceiling: untouched.
        let exact = "x".repeat(30);
        assert_eq!(truncate_chars(&exact, 30), exact);
    }

    #[test]
    fn slide_text_reads_only_a_t_runs() {
        let xml = r#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
            <p:txBody>
              <a:p><a:r><a:rPr lang="en"/><a:t>Hello</a:t></a:r>
                   <a:r><a:t> world</a:t></a:r></a:p>
              <a:p><a:r><a:t>Second line &amp; more</a:t></a:r></a:p>
            </p:txBody></p:sld>"#;
        let text = slide_text(xml).unwrap();
        assert_eq!(text, "Hello world\nSecond line & more\n");
    }

    #[test]
    fn slide_entry_regex_matches_only_slides() {
        assert!(RE_SLIDE_ENTRY.is_match("ppt/slides/slide1.xml"));
        assert!(RE_SLIDE_ENTRY.is_match("ppt/slides/slide12.xml"));
        assert!(!RE_SLIDE_ENTRY.is_match("ppt/slides/_rels/slide1.xml.rels"));
        assert!(!RE_SLIDE_ENTRY.is_match("ppt/slideLayouts/slideLayout1.xml"));
        assert!(!RE_SLIDE_ENTRY.is_match("ppt/notesSlides/notesSlide1.xml"));
    }

    #[tokio::test]
    async fn unreadable_file_is_a_read_error() {
        let doc = SourceDocument {
            path: "/nonexistent/deck.pptx".into(),
            name: "deck.pptx".into(),
            kind: DocumentKind::Presentation,
        };
        let err = read_document(&doc, 30_000).await.unwrap_err();
        assert!(matches!(err, DocumentError::Read { .. }));
        assert_eq!(err.document(), "deck.pptx");
    }
}
