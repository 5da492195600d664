//! CLI binary for docs2report.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints a run summary.

use anyhow::{Context, Result};
use clap::Parser;
use docs2report::{run_to_files, PipelineConfig, PipelineProgress};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per document.
struct CliProgress {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Consolidating");
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgress for CliProgress {
    fn on_run_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total} documents…"))
        ));
    }

    fn on_document_start(&self, document: &str, _total: usize) {
        self.bar.set_message(document.to_string());
    }

    fn on_document_complete(&self, document: &str, _total: usize, facts: usize) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            document,
            dim(&format!("{facts} facts")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, document: &str, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<40}  {}", red("✗"), document, red(&msg)));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, processed: usize, total: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(processed);
        if failed == 0 {
            eprintln!(
                "{} {} documents processed successfully",
                green("✔"),
                bold(&processed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents processed  ({} failed)",
                cyan("⚠"),
                bold(&processed.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Consolidate ./docs with the default template
  docs2report

  # Explicit directory and template
  docs2report due-diligence/docs --template dd-template.json

  # Custom output paths
  docs2report --json-out out/report.json --docx-out out/report.docx

  # Faster runs on large folders
  docs2report --concurrency 4 --max-retries 2

  # OpenAI-compatible proxy
  docs2report --base-url http://localhost:8000/v1 --model local-model

TEMPLATE FORMAT (JSON):
  {
    "company_overview": {
      "legal_name": {"update_rule": "locked",    "instruction": "Registered legal name"},
      "headcount":  {"update_rule": "overwrite", "instruction": "Current headcount"}
    },
    "team": {
      "founders":   {"update_rule": "append",    "instruction": "List founder names"}
    }
  }

  update_rule: append (accumulate, deduplicated) | overwrite (last document
  wins) | locked (first document wins). Omitted update_rule means append.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY       API key for the extraction endpoint (required)
  OPENAI_BASE_URL      Endpoint root for OpenAI-compatible servers
  DOCS2REPORT_MODEL    Override model id

SETUP:
  1. Set API key:    export OPENAI_API_KEY=sk-...
  2. Consolidate:    docs2report ./docs --template template.json
"#;

/// Consolidate a folder of documents into one structured report.
#[derive(Parser, Debug)]
#[command(
    name = "docs2report",
    version,
    about = "Consolidate PDFs, spreadsheets and presentations into one structured report",
    long_about = "Read every PDF, spreadsheet and presentation in a folder, extract structured \
facts from each with an LLM against a field template, merge them according to per-field update \
rules, and write a consolidated JSON report plus a formatted DOCX.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the source documents.
    #[arg(default_value = "docs")]
    docs_dir: PathBuf,

    /// Path to the master template JSON.
    #[arg(short, long, env = "DOCS2REPORT_TEMPLATE", default_value = "master-document-template.json")]
    template: PathBuf,

    /// Write the JSON report here.
    #[arg(long, default_value = "consolidated_report.json")]
    json_out: PathBuf,

    /// Write the DOCX report here.
    #[arg(long, default_value = "consolidated_report.docx")]
    docx_out: PathBuf,

    /// Model id for the extraction endpoint.
    #[arg(long, env = "DOCS2REPORT_MODEL", default_value = "gpt-4o")]
    model: String,

    /// Endpoint root for OpenAI-compatible servers.
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Number of documents processed concurrently.
    #[arg(short, long, env = "DOCS2REPORT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per document on transient API failure.
    #[arg(long, env = "DOCS2REPORT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Character ceiling on submitted document text.
    #[arg(long, env = "DOCS2REPORT_MAX_CHARS", default_value_t = 30_000)]
    max_chars: usize,

    /// Path to a text file containing a custom extraction system prompt.
    #[arg(long, env = "DOCS2REPORT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Per-request API timeout in seconds.
    #[arg(long, env = "DOCS2REPORT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Disable the progress bar.
    #[arg(long, env = "DOCS2REPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCS2REPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCS2REPORT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli, show_progress).await?;

    // ── Run the pipeline ─────────────────────────────────────────────────
    let output = run_to_files(&config, &cli.json_out, &cli.docx_out)
        .await
        .context("Consolidation failed")?;

    // Summary (the callback already printed the per-document log).
    if !cli.quiet {
        let s = &output.stats;
        eprintln!(
            "{}  {}/{} documents  {} values  {}ms  →  {}  {}",
            if s.documents_failed == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            s.documents_processed,
            s.documents_found,
            s.facts_merged,
            s.total_duration_ms,
            bold(&cli.json_out.display().to_string()),
            bold(&cli.docx_out.display().to_string()),
        );
        eprintln!(
            "   {} extracted  /  {} kept after merge",
            dim(&s.facts_extracted.to_string()),
            dim(&s.facts_merged.to_string()),
        );
        for outcome in output.outcomes.iter().filter(|o| !o.succeeded()) {
            if let Some(ref e) = outcome.error {
                eprintln!("   {} {}", red("✗"), dim(&e.to_string()));
            }
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, show_progress: bool) -> Result<PipelineConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {path:?}"))?,
        )
    } else {
        None
    };

    let mut builder = PipelineConfig::builder()
        .docs_dir(&cli.docs_dir)
        .template_path(&cli.template)
        .model(&cli.model)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .max_document_chars(cli.max_chars)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if show_progress {
        builder = builder.progress(CliProgress::new());
    }

    builder.build().context("Invalid configuration")
}
