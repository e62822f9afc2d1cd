//! # statement2xlsx
//!
//! Consolidate password-protected bank-statement PDFs into one spreadsheet
//! using Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Colombian bank statements arrive as password-protected PDFs whose text
//! layer is either missing or scrambled, in a different layout per issuer.
//! Instead of per-bank parsers, each page is rasterised and a multimodal
//! model reads the transaction table the way a person would. Outages are
//! retried and malformed replies repaired; a statement that still fails is
//! skipped without costing the others.
//!
//! ## Pipeline Overview
//!
//! ```text
//! folder of PDFs
//!  │
//!  ├─ 1. Unlock     decrypt into <stem>.temp.pdf (lopdf), removed after the file
//!  ├─ 2. Render     rasterise every page at 2× (pdfium)
//!  ├─ 3. Classify   file name → template (ledger / installment card / co-branded card)
//!  ├─ 4. Extract    one request per statement, or per page for long ledgers
//!  ├─ 5. Repair     strip fences, recover truncated JSON, read the rows
//!  ├─ 6. Normalise  "1.234,56" → 1234.56 in monetary columns
//!  └─ 7. Export     one worksheet per statement, backup of the previous workbook
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use statement2xlsx::{spawn_extraction, ExtractorConfig, RunOutcome};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExtractorConfig::builder()
//!     .folder("/home/me/extractos")
//!     .password("1032456789")
//!     .api_key(std::env::var("GEMINI_API_KEY")?)
//!     .progress_callback(Arc::new(|line: &str| println!("{line}")))
//!     .build()?;
//!
//! let handle = spawn_extraction(config)?;
//! match handle.join().expect("worker panicked")? {
//!     RunOutcome::Exported { path, .. } => println!("wrote {}", path.display()),
//!     other => println!("no workbook: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `statement2xlsx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! statement2xlsx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractorConfig, ExtractorConfigBuilder, RetryPolicy};
pub use error::{ExportError, ExtractorError, StatementError};
pub use export::{ConsolidatedOutput, ExportReport, SheetAccumulator};
pub use orchestrator::{discover_statements, extract_folder, spawn_extraction, Orchestrator, RunState};
pub use output::{Cell, ExtractionResult, FileStatus, Row, RunOutcome, StatementFile};
pub use pipeline::classify::{classify, PagingStrategy, StatementTemplate};
pub use pipeline::llm::{LlmVisionModel, ModelError, Sleeper, ThreadSleeper, VisionModel};
pub use pipeline::reader::{PdfiumReader, StatementReader};
pub use pipeline::render::PageImages;
pub use pipeline::unlock::TempPdf;
pub use progress::{NoopProgress, ProgressCallback, ProgressSink};
