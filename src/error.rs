//! Error types for the statement2xlsx library.
//!
//! Three tiers mirror the three blast radii of a batch run:
//!
//! * [`ExtractorError`]: **Fatal.** The run cannot proceed or cannot produce
//!   its single artifact (missing folder, bad configuration, pdfium missing,
//!   export failure). Returned as `Err` from the top-level entry points.
//!
//! * [`StatementError`]: **Non-fatal.** One statement file (or one page of
//!   it) failed. The orchestrator records it as a skip reason on the
//!   [`crate::output::StatementFile`] and moves on.
//!
//! * [`ExportError`]: what went wrong while writing the workbook. Always
//!   escalated into [`ExtractorError::Export`].

use std::path::PathBuf;
use thiserror::Error;

/// Maximum characters of error text carried into progress lines and skip
/// reasons.
pub const MAX_DETAIL_CHARS: usize = 160;

/// All fatal errors returned by the statement2xlsx library.
#[derive(Debug, Error)]
pub enum ExtractorError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source folder does not exist or is not a directory.
    #[error("Statement folder not found: '{path}'\nCheck the path exists and is a directory.")]
    FolderNotFound { path: PathBuf },

    /// The source folder exists but could not be listed.
    #[error("Cannot list statement folder '{path}': {source}")]
    FolderUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Collaborator setup ────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the\n\
executable, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Writing the consolidated workbook failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// The background worker thread could not be started or panicked.
    #[error("Worker thread failure: {0}")]
    Worker(String),
}

/// A non-fatal failure for one statement file or one page of it.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum StatementError {
    /// Wrong password or a structurally broken document.
    #[error("could not decrypt '{file}': {detail}")]
    Decryption { file: String, detail: String },

    /// The decrypted document could not be rasterised.
    #[error("could not render '{file}': {detail}")]
    Render { file: String, detail: String },

    /// The AI collaborator stayed unavailable (or refused the request).
    #[error("AI call failed after {attempts} attempt(s): {detail}")]
    Transport { attempts: u32, detail: String },

    /// The reply could not be turned into rows even after repair.
    #[error("unreadable AI reply: {detail}")]
    Parse { detail: String },
}

/// Failures while assembling or persisting the consolidated workbook.
#[derive(Debug, Error)]
pub enum ExportError {
    /// There were no successful tables to write.
    #[error("Nothing to export: no statement produced rows")]
    Empty,

    /// A worksheet could not be built.
    #[error("Failed to build worksheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// The workbook could not be saved to its temporary location.
    #[error("Failed to save workbook '{path}': {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// An existing artifact could not be moved aside.
    #[error("Failed to back up existing '{path}': {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The freshly written workbook could not be moved into place.
    #[error("Failed to move workbook into place at '{path}': {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Shorten error text for progress lines, cutting on a char boundary.
pub fn truncate_detail(detail: &str) -> String {
    let detail = detail.trim();
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        return detail.to_string();
    }
    let cut: String = detail.chars().take(MAX_DETAIL_CHARS - 1).collect();
    format!("{cut}\u{2026}")
}
