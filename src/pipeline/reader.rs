//! The document-side collaborator: unlock a statement, then rasterise it.
//!
//! The orchestrator only sees [`StatementReader`]; [`PdfiumReader`] is the
//! production implementation and tests substitute fakes that never touch
//! lopdf or pdfium.

use crate::error::{truncate_detail, ExtractorError, StatementError};
use crate::pipeline::render::{self, PageImages};
use crate::pipeline::unlock::{self, TempPdf};
use std::path::Path;
use std::sync::Arc;

/// Unlocks and rasterises statements.
pub trait StatementReader: Send + Sync {
    /// Write a decrypted copy of `source` and return its guard.
    fn unlock(&self, source: &Path, password: &str) -> Result<TempPdf, StatementError>;

    /// Render every page of an already decrypted document.
    fn rasterize(&self, decrypted: &Path) -> Result<PageImages, StatementError>;
}

impl<T: StatementReader + ?Sized> StatementReader for Arc<T> {
    fn unlock(&self, source: &Path, password: &str) -> Result<TempPdf, StatementError> {
        (**self).unlock(source, password)
    }

    fn rasterize(&self, decrypted: &Path) -> Result<PageImages, StatementError> {
        (**self).rasterize(decrypted)
    }
}

/// lopdf for decryption, pdfium for rendering.
///
/// Stateless; pdfium is bound per document because its handle is `!Send`.
#[derive(Debug, Clone, Copy)]
pub struct PdfiumReader;

impl PdfiumReader {
    /// Create a reader, failing fast when no pdfium library can be bound.
    pub fn new() -> Result<Self, ExtractorError> {
        render::load_pdfium().map_err(ExtractorError::PdfiumBindingFailed)?;
        Ok(Self)
    }
}

impl StatementReader for PdfiumReader {
    fn unlock(&self, source: &Path, password: &str) -> Result<TempPdf, StatementError> {
        unlock::unlock_pdf(source, password)
    }

    fn rasterize(&self, decrypted: &Path) -> Result<PageImages, StatementError> {
        let file = decrypted
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pdfium = render::load_pdfium().map_err(|detail| StatementError::Render {
            file: file.clone(),
            detail,
        })?;
        render::render_pages(&pdfium, decrypted).map_err(|e| StatementError::Render {
            file,
            detail: truncate_detail(&e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PdfiumReader>();
        assert_send_sync::<Arc<dyn StatementReader>>();
    }
}
