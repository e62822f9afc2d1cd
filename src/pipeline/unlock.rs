//! Password removal: write a decrypted copy of a statement beside the source.
//!
//! pdfium can open an encrypted document, but the decrypted copy is also
//! what a person would open to check a result, and it keeps rendering
//! independent of the password. The copy is named `<stem>.temp.pdf` and is
//! owned by a [`TempPdf`] guard that deletes it when dropped, so every exit
//! path of the per-file scope releases it.

use crate::error::{truncate_detail, StatementError};
use lopdf::Document;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix reserved for decrypted copies; discovery skips these names.
pub const TEMP_SUFFIX: &str = ".temp.pdf";

/// `statements/Nu_marzo.pdf` → `statements/Nu_marzo.temp.pdf`.
pub fn temp_path_for(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}{TEMP_SUFFIX}"))
}

/// Whether `path` names a decrypted copy rather than a source statement.
pub fn is_temp_artifact(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase().ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}

/// Owns a decrypted temporary document and deletes it exactly once.
#[derive(Debug)]
pub struct TempPdf {
    path: PathBuf,
    removed: bool,
}

impl TempPdf {
    /// Take ownership of `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete now and report failures instead of only logging them.
    /// A file that is already gone counts as removed.
    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for TempPdf {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove temporary {}: {}", self.path.display(), e),
        }
    }
}

/// Decrypt `source` with `password` into `<stem>.temp.pdf`.
///
/// Documents that are not encrypted are copied through unchanged, so a
/// folder mixing protected and unprotected statements still works.
pub fn unlock_pdf(source: &Path, password: &str) -> Result<TempPdf, StatementError> {
    let file = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());
    let fail = |detail: String| StatementError::Decryption {
        file: file.clone(),
        detail: truncate_detail(&detail),
    };

    let mut doc = Document::load(source).map_err(|e| fail(e.to_string()))?;

    if doc.is_encrypted() {
        doc.decrypt(password)
            .map_err(|e| fail(describe_decrypt_failure(&e.to_string())))?;
        doc.trailer.remove(b"Encrypt");
        debug!("Decrypted {}", file);
    } else {
        debug!("{} is not encrypted; copying as-is", file);
    }

    // Guard first: a save that dies half-way still leaves nothing behind.
    let temp = TempPdf::new(temp_path_for(source));
    doc.save(temp.path())
        .map_err(|e| fail(format!("cannot write decrypted copy: {e}")))?;

    Ok(temp)
}

/// Tell a wrong password apart from a scheme lopdf cannot handle.
fn describe_decrypt_failure(detail: &str) -> String {
    let lower = detail.to_lowercase();
    if lower.contains("password") {
        format!("wrong password: {detail}")
    } else if lower.contains("unsupported") || lower.contains("not supported") {
        format!("unsupported encryption scheme: {detail}")
    } else {
        detail.to_string()
    }
}
