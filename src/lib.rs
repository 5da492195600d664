//! # docs2report
//!
//! Consolidate a folder of heterogeneous business documents (PDF decks,
//! spreadsheets, presentations) into one structured report, using an LLM to
//! extract facts against a user-supplied field template.
//!
//! ## Pipeline
//!
//! ```text
//! docs/ ──► scan ──► read ──► extract ──► merge ──► report
//!           │        │        │           │         │
//!           │        │        │           │         └─ JSON + DOCX writers
//!           │        │        │           └─ update rules, dedup, template order
//!           │        │        └─ one chat completion per document
//!           │        └─ pdf-extract / calamine / zip+quick-xml, truncation
//!           └─ sorted listing of .pdf/.xlsx/.xls/.pptx
//! ```
//!
//! Every document gets exactly one model call; failures are per-document and
//! never abort the run unless *all* documents fail. The merge preserves the
//! template's declaration order and applies each field's update rule
//! (`append` with dedup, `overwrite` last-document-wins, `locked`
//! first-document-wins).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docs2report::{run_to_files, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .docs_dir("docs")
//!         .template_path("master-document-template.json")
//!         .model("gpt-4o")
//!         .build()?;
//!
//!     let output = run_to_files(&config, "report.json", "report.docx").await?;
//!     println!(
//!         "{} values from {} documents",
//!         output.stats.facts_merged, output.stats.documents_processed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! The API key comes from `PipelineConfig::api_key` or the `OPENAI_API_KEY`
//! environment variable. For testing, inject any [`ExtractionBackend`]
//! implementation via `PipelineConfig::backend` and no network is touched.

pub mod backend;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod template;

pub use backend::{
    resolve_model_alias, BackendError, CompletionOptions, ExtractionBackend, OpenAiBackend,
};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{DocumentError, ReportError};
pub use output::{
    Confidence, ConsolidatedReport, DocumentOutcome, ExtractedFact, FieldValue, ReportField,
    ReportMetadata, ReportSection, RunOutput, RunStats,
};
pub use pipeline::input::{DocumentKind, SourceDocument};
pub use progress::PipelineProgress;
pub use run::{run, run_to_files};
pub use template::{Template, TemplateField, TemplateSection, UpdateRule};
