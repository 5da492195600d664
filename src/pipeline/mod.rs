//! Pipeline stages for document consolidation.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations (e.g. a different spreadsheet reader) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ read ──▶ extract ──▶ merge ──▶ report
//! (scan)   (text)    (LLM)     (rules)   (JSON+DOCX)
//! ```
//!
//! 1. [`input`]   — scan the documents directory, detect formats, fix the
//!    deterministic processing order
//! 2. [`read`]    — per-format text extraction with truncation; runs in
//!    `spawn_blocking` because the parsing crates are not async-safe
//! 3. [`extract`] — one model call per document with schema validation; the
//!    only stage with network I/O
//! 4. [`merge`]   — fold per-document facts into the consolidated report
//!    under each field's update rule
//! 5. [`report`]  — serialise the finished report to JSON and DOCX

pub mod extract;
pub mod input;
pub mod merge;
pub mod read;
pub mod report;
