//! Top-level run entry points.
//!
//! The whole pipeline is a single pass: load the template, scan the
//! documents directory, read+extract each document, merge, write. No state
//! survives across runs and nothing is checkpointed — an interrupted run
//! leaves no partial consolidated output.

use crate::backend::{resolve_model_alias, ExtractionBackend, OpenAiBackend};
use crate::config::PipelineConfig;
use crate::error::ReportError;
use crate::output::{DocumentOutcome, ExtractedFact, ReportMetadata, RunOutput, RunStats};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::{extract, input, merge, read, report};
use crate::template::Template;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Run the full consolidation pipeline and return the in-memory result.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(RunOutput)` as soon as at least one document was processed, even if
/// others failed (check `output.outcomes` / `output.stats.documents_failed`).
///
/// # Errors
/// Returns `Err(ReportError)` only for fatal errors:
/// - Template missing or invalid
/// - Documents directory missing or empty
/// - No API key configured
/// - Every document failed
pub async fn run(config: &PipelineConfig) -> Result<RunOutput, ReportError> {
    let total_start = Instant::now();
    info!("starting consolidation run over {}", config.docs_dir.display());

    // ── Step 1: Load template ────────────────────────────────────────────
    let template = Template::from_path(&config.template_path)?;
    info!(
        sections = template.sections.len(),
        fields = template.field_count(),
        "template loaded"
    );

    // ── Step 2: Resolve backend ──────────────────────────────────────────
    let backend = resolve_backend(config)?;

    // ── Step 3: Scan documents ───────────────────────────────────────────
    let documents = input::scan_documents(&config.docs_dir)?;
    let total = documents.len();
    info!("found {total} documents");
    if let Some(ref cb) = config.progress {
        cb.on_run_start(total);
    }

    // ── Step 4: Read + extract ───────────────────────────────────────────
    // `buffered` yields results in input order even when documents are
    // processed concurrently, so the merge below always sees file-listing
    // order and `overwrite`/`locked` stay reproducible.
    let results: Vec<(DocumentOutcome, Vec<ExtractedFact>)> =
        stream::iter(
            documents
                .iter()
                .map(|doc| process_document(doc, &backend, &template, config, total)),
        )
        .buffered(config.concurrency)
        .collect()
        .await;

    // ── Step 5: Merge in listing order ───────────────────────────────────
    let mut merger = merge::Merger::new(&template);
    let mut sources_reviewed = Vec::new();
    for (outcome, facts) in &results {
        if outcome.succeeded() {
            merger.absorb(facts);
            sources_reviewed.push(outcome.document.clone());
        }
    }

    let outcomes: Vec<DocumentOutcome> = results.into_iter().map(|(o, _)| o).collect();
    let processed = outcomes.iter().filter(|o| o.succeeded()).count();
    let failed = total - processed;

    if processed == 0 {
        let first_error = outcomes
            .iter()
            .find_map(|o| o.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(ReportError::AllDocumentsFailed { total, first_error });
    }

    // ── Step 6: Finalise report + stats ──────────────────────────────────
    let report = merger.finish(ReportMetadata {
        generated_at: Utc::now(),
        model: resolve_model_alias(&config.model),
        sources_reviewed,
    });

    let stats = RunStats {
        documents_found: total,
        documents_processed: processed,
        documents_failed: failed,
        facts_extracted: outcomes.iter().map(|o| o.facts_extracted).sum(),
        facts_merged: report.value_count(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        read_duration_ms: outcomes.iter().map(|o| o.read_duration_ms).sum(),
        llm_duration_ms: outcomes.iter().map(|o| o.llm_duration_ms).sum(),
    };

    info!(
        processed,
        failed,
        values = stats.facts_merged,
        duration_ms = stats.total_duration_ms,
        "run complete"
    );
    if let Some(ref cb) = config.progress {
        cb.on_run_complete(processed, total);
    }

    Ok(RunOutput {
        report,
        outcomes,
        stats,
    })
}

/// Run the pipeline and write both outputs.
///
/// Both writes are atomic (temp file + rename). A write failure is fatal
/// here; callers that want to retry a failed write without re-running
/// extraction should call [`run`] and the writers in
/// [`crate::pipeline::report`] themselves.
pub async fn run_to_files(
    config: &PipelineConfig,
    json_path: impl AsRef<Path>,
    docx_path: impl AsRef<Path>,
) -> Result<RunOutput, ReportError> {
    let output = run(config).await?;
    report::write_json(&output.report, json_path.as_ref()).await?;
    report::write_docx(&output.report, docx_path.as_ref()).await?;
    Ok(output)
}

/// Resolve the extraction backend, from most-specific to least-specific:
///
/// 1. **Pre-built backend** (`config.backend`) — the caller constructed it
///    entirely; used as-is. This is how tests inject a scripted backend.
/// 2. **Configured credential** (`config.api_key`) — explicit key from the
///    caller, e.g. parsed from a CLI flag.
/// 3. **Environment** — `OPENAI_API_KEY`, the conventional variable.
///    `OPENAI_BASE_URL` is honoured alongside for proxies.
fn resolve_backend(config: &PipelineConfig) -> Result<Arc<dyn ExtractionBackend>, ReportError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    let api_key = config
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
        .ok_or(ReportError::MissingApiKey)?;

    let mut backend = OpenAiBackend::new(api_key, &config.model, config.api_timeout_secs);
    let base_url = config
        .base_url
        .clone()
        .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
        .filter(|u| !u.trim().is_empty());
    if let Some(url) = base_url {
        backend = backend.with_base_url(url);
    }
    Ok(Arc::new(backend))
}

/// Read and extract one document, recording everything in its outcome.
///
/// Never returns an error — failures land in `outcome.error` so one bad
/// document does not abort the run.
async fn process_document(
    doc: &SourceDocument,
    backend: &Arc<dyn ExtractionBackend>,
    template: &Template,
    config: &PipelineConfig,
    total: usize,
) -> (DocumentOutcome, Vec<ExtractedFact>) {
    if let Some(ref cb) = config.progress {
        cb.on_document_start(&doc.name, total);
    }

    let mut outcome = DocumentOutcome {
        document: doc.name.clone(),
        kind: doc.kind,
        chars_submitted: 0,
        facts_extracted: 0,
        retries: 0,
        read_duration_ms: 0,
        llm_duration_ms: 0,
        error: None,
    };

    let read_start = Instant::now();
    let text = match read::read_document(doc, config.max_document_chars).await {
        Ok(text) => text,
        Err(e) => {
            warn!("{e}");
            if let Some(ref cb) = config.progress {
                cb.on_document_error(&doc.name, total, &e.to_string());
            }
            outcome.read_duration_ms = read_start.elapsed().as_millis() as u64;
            outcome.error = Some(e);
            return (outcome, Vec::new());
        }
    };
    outcome.read_duration_ms = read_start.elapsed().as_millis() as u64;
    outcome.chars_submitted = text.chars().count();

    let llm_start = Instant::now();
    match extract::extract_document(backend, template, &doc.name, &text, config).await {
        Ok(extraction) => {
            outcome.llm_duration_ms = llm_start.elapsed().as_millis() as u64;
            outcome.retries = extraction.retries;
            outcome.facts_extracted = extraction.facts.len();
            if let Some(ref cb) = config.progress {
                cb.on_document_complete(&doc.name, total, extraction.facts.len());
            }
            (outcome, extraction.facts)
        }
        Err(e) => {
            outcome.llm_duration_ms = llm_start.elapsed().as_millis() as u64;
            warn!("{e}");
            if let Some(ref cb) = config.progress {
                cb.on_document_error(&doc.name, total, &e.to_string());
            }
            outcome.error = Some(e);
            (outcome, Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_fatal() {
        // Guard against a key leaking in from the test environment.
        if std::env::var("OPENAI_API_KEY").is_ok() {
            return;
        }
        let config = PipelineConfig::default();
        assert!(matches!(
            resolve_backend(&config),
            Err(ReportError::MissingApiKey)
        ));
    }

    #[test]
    fn explicit_key_resolves_backend() {
        let config = PipelineConfig::builder().api_key("sk-test").build().unwrap();
        assert!(resolve_backend(&config).is_ok());
    }
}
