//! Progress-callback trait for per-document pipeline events.
//!
//! Inject an `Arc<dyn PipelineProgress>` via
//! [`crate::config::PipelineConfigBuilder::progress`] to receive real-time
//! events as the pipeline processes each document.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a log, or a terminal progress bar without the
//! library knowing anything about how the host application communicates. The
//! trait is `Send + Sync` so it works correctly when documents are extracted
//! concurrently.

/// Called by the pipeline as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. When `concurrency > 1`, the per-document methods may
/// be called from different tasks; implementations must synchronise shared
/// mutable state.
pub trait PipelineProgress: Send + Sync {
    /// Called once after scanning, before any document is read.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document's read+extract begins.
    fn on_document_start(&self, document: &str, total_documents: usize) {
        let _ = (document, total_documents);
    }

    /// Called when a document was extracted successfully.
    fn on_document_complete(&self, document: &str, total_documents: usize, facts: usize) {
        let _ = (document, total_documents, facts);
    }

    /// Called when a document was skipped with an error.
    fn on_document_error(&self, document: &str, total_documents: usize, error: &str) {
        let _ = (document, total_documents, error);
    }

    /// Called once after the last document has been merged.
    fn on_run_complete(&self, processed: usize, total_documents: usize) {
        let _ = (processed, total_documents);
    }
}
