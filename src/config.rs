//! Configuration for a document-consolidation run.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks and to diff two runs to understand
//! why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::backend::ExtractionBackend;
use crate::error::ReportError;
use crate::progress::PipelineProgress;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a consolidation run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docs2report::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .docs_dir("due-diligence/docs")
///     .model("gpt-4o")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory scanned for source documents. Default: `docs`.
    pub docs_dir: PathBuf,

    /// Path to the master template JSON. Default: `master-document-template.json`.
    pub template_path: PathBuf,

    /// Model id for the extraction endpoint. Default: `gpt-4o`.
    pub model: String,

    /// API credential. If `None`, `OPENAI_API_KEY` is read from the
    /// environment when the backend is resolved.
    pub api_key: Option<String>,

    /// Endpoint root for OpenAI-compatible servers. `None` means the
    /// official endpoint.
    pub base_url: Option<String>,

    /// Pre-constructed backend. Takes precedence over `model`/`api_key`/
    /// `base_url`; the hook tests use to avoid the network.
    pub backend: Option<Arc<dyn ExtractionBackend>>,

    /// Sampling temperature for extraction. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to the document text, which
    /// is exactly what you want when fabricated values are the failure mode
    /// that matters most.
    pub temperature: f32,

    /// Maximum tokens the model may generate per document. Default: 8192.
    ///
    /// A document can populate dozens of fields in one response; a small
    /// budget silently truncates the JSON mid-object and fails parsing.
    pub max_tokens: usize,

    /// Character ceiling applied to extracted document text. Default: 30 000.
    ///
    /// Longer documents are cut, not chunked: one API call per document is a
    /// deliberate cost/latency trade against completeness. Counted in
    /// `char`s, so the submitted text of an over-long document is exactly
    /// this many characters.
    pub max_document_chars: usize,

    /// Number of documents read+extracted concurrently. Default: 1.
    ///
    /// Results are always merged in file-listing order whatever this is set
    /// to, so `overwrite` and `locked` semantics stay reproducible. Raising
    /// it only shortens wall-clock time.
    pub concurrency: usize,

    /// Maximum retry attempts on a transient API failure. Default: 0.
    ///
    /// Off by default: a failed document is recorded and skipped. Raise this
    /// to ride out rate limits on large batches; permanent errors (bad
    /// credential, malformed response) are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom extraction system prompt. If `None`, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Progress callback for per-document events.
    pub progress: Option<Arc<dyn PipelineProgress>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            template_path: PathBuf::from("master-document-template.json"),
            model: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            backend: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_document_chars: 30_000,
            concurrency: 1,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            system_prompt: None,
            progress: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("docs_dir", &self.docs_dir)
            .field("template_path", &self.template_path)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ExtractionBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_document_chars", &self.max_document_chars)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn docs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.docs_dir = dir.into();
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = path.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ExtractionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn max_document_chars(mut self, n: usize) -> Self {
        self.config.max_document_chars = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress(mut self, progress: Arc<dyn PipelineProgress>) -> Self {
        self.config.progress = Some(progress);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ReportError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ReportError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_document_chars < 100 {
            return Err(ReportError::InvalidConfig(format!(
                "max_document_chars must be ≥ 100, got {}",
                c.max_document_chars
            )));
        }
        if c.concurrency == 0 {
            return Err(ReportError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
