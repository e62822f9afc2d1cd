//! Batch orchestration: every statement in a folder → one workbook.
//!
//! ## State machine
//!
//! ```text
//! Idle ─▶ Discovering ─┬─▶ Done                      (no PDFs)
//!                      └─▶ ProcessingFile(1..=n) ─┬─▶ Done          (nothing extracted)
//!                                                 └─▶ Consolidating ─┬─▶ Done
//!                                                                    └─▶ Failed (export error)
//! ```
//!
//! Files are independent: a failure at any step of one file becomes a skip
//! reason on its [`StatementFile`] and the loop moves on. The decrypted copy
//! of each file lives in a [`TempPdf`](crate::pipeline::unlock::TempPdf)
//! guard scoped to that file, so it is gone before the next file starts,
//! whatever happened. Only export failures end the run with an error.

use crate::config::ExtractorConfig;
use crate::error::{truncate_detail, ExtractorError, StatementError};
use crate::export::SheetAccumulator;
use crate::output::{FileStatus, Row, RunOutcome, StatementFile};
use crate::pipeline::classify::{classify, PagingStrategy};
use crate::pipeline::encode::encode_pages;
use crate::pipeline::extract::extract_rows;
use crate::pipeline::llm::{ExtractionClient, LlmVisionModel, Sleeper, ThreadSleeper, VisionModel};
use crate::pipeline::normalize::normalize_rows;
use crate::pipeline::reader::{PdfiumReader, StatementReader};
use crate::pipeline::unlock::is_temp_artifact;
use crate::progress::Reporter;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Discovering,
    /// 1-based index of the file being processed.
    ProcessingFile(usize),
    Consolidating,
    Done,
    Failed,
}

/// Runs one batch with injected collaborators.
pub struct Orchestrator {
    config: ExtractorConfig,
    reader: Box<dyn StatementReader>,
    model: Box<dyn VisionModel>,
    sleeper: Box<dyn Sleeper>,
    reporter: Reporter,
    state: RunState,
}

impl Orchestrator {
    pub fn new(
        config: ExtractorConfig,
        reader: impl StatementReader + 'static,
        model: impl VisionModel + 'static,
    ) -> Self {
        let reporter = Reporter::new(config.progress_callback.clone());
        Self {
            config,
            reader: Box::new(reader),
            model: Box::new(model),
            sleeper: Box::new(ThreadSleeper),
            reporter,
            state: RunState::Idle,
        }
    }

    /// Replace the blocking sleeper used between retries.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Process every statement in the configured folder.
    pub fn run(&mut self) -> Result<RunOutcome, ExtractorError> {
        let start = Instant::now();
        self.state = RunState::Discovering;
        self.reporter
            .line(format!("Scanning {}", self.config.folder.display()));

        let sources = match discover_statements(&self.config.folder) {
            Ok(s) => s,
            Err(e) => {
                self.state = RunState::Failed;
                return Err(e);
            }
        };

        if sources.is_empty() {
            self.reporter.line("No statement PDFs found");
            self.state = RunState::Done;
            return Ok(RunOutcome::NothingFound);
        }

        let total = sources.len();
        info!("Found {} statement PDF(s)", total);
        self.reporter.event(|s| s.on_run_start(total));

        let mut accumulator = SheetAccumulator::new();
        let mut files = Vec::with_capacity(total);
        for (idx, source) in sources.into_iter().enumerate() {
            self.state = RunState::ProcessingFile(idx + 1);
            files.push(self.process_file(idx + 1, total, source, &mut accumulator));
        }

        let succeeded = files.iter().filter(|f| f.is_success()).count();
        info!("{}/{} statement(s) extracted", succeeded, total);
        self.reporter.event(|s| s.on_run_complete(succeeded, total));

        if accumulator.is_empty() {
            self.reporter.line("No transactions extracted; no workbook written");
            self.state = RunState::Done;
            return Ok(RunOutcome::NothingExtracted { files });
        }

        self.state = RunState::Consolidating;
        let dest = self.config.output_path();
        self.reporter.line(format!(
            "Saving {} worksheet(s) to {}",
            accumulator.len(),
            dest.display()
        ));

        let report = match accumulator.finish().write(&dest) {
            Ok(r) => r,
            Err(e) => {
                self.state = RunState::Failed;
                self.reporter
                    .line(format!("Export failed: {}", truncate_detail(&e.to_string())));
                return Err(e.into());
            }
        };
        if let Some(ref backup) = report.backup {
            self.reporter
                .line(format!("Previous workbook kept as {}", backup.display()));
        }

        self.state = RunState::Done;
        self.reporter.line(format!(
            "Done in {:.1}s: {}",
            start.elapsed().as_secs_f32(),
            report.path.display()
        ));
        Ok(RunOutcome::Exported {
            path: report.path,
            files,
        })
    }

    fn process_file(
        &self,
        index: usize,
        total: usize,
        source: PathBuf,
        accumulator: &mut SheetAccumulator,
    ) -> StatementFile {
        let mut report = StatementFile::pending(source);
        let name = report.file_name();
        self.reporter.event(|s| s.on_file_start(index, total, &name));
        info!("[{}/{}] {}", index, total, name);

        match self.extract_file(&mut report) {
            Ok(rows) if rows.is_empty() => {
                self.skip(&mut report, "no rows extracted".to_string());
            }
            Ok(rows) => {
                let columns = report
                    .template
                    .map(|t| t.columns())
                    .unwrap_or_default();
                let table = accumulator.push(&report.stem(), columns, rows);
                let sheet = table.name.clone();
                report.row_count = table.rows.len();
                self.reporter
                    .event(|s| s.on_file_complete(&name, &sheet, report.row_count));
                info!("{}: {} row(s) -> sheet '{}'", name, report.row_count, sheet);
                report.sheet_name = Some(sheet);
                report.status = FileStatus::Success;
            }
            Err(e) => {
                self.skip(&mut report, truncate_detail(&e.to_string()));
            }
        }
        report
    }

    fn skip(&self, report: &mut StatementFile, reason: String) {
        let name = report.file_name();
        warn!("Skipping {}: {}", name, reason);
        self.reporter.event(|s| s.on_file_skipped(&name, &reason));
        report.status = FileStatus::Skipped { reason };
    }

    /// Unlock → rasterise → classify → extract → normalise for one file.
    /// The decrypted copy is removed before this returns.
    fn extract_file(&self, report: &mut StatementFile) -> Result<Vec<Row>, StatementError> {
        let name = report.file_name();

        self.reporter.line("  Unlocking...");
        let temp = self.reader.unlock(&report.source, &self.config.password)?;

        self.reporter.line("  Rendering pages...");
        let pages = self.reader.rasterize(temp.path())?;
        report.page_count = pages.len();
        self.reporter
            .line(format!("  {} page(s) rendered", report.page_count));

        let classification = classify(&name);
        let template = classification.template;
        report.template = Some(template);
        let strategy =
            PagingStrategy::select(template, report.page_count, self.config.per_page_threshold);
        match classification.marker {
            Some(marker) => self
                .reporter
                .line(format!("  Template: {template} (matched '{marker}')")),
            None => self
                .reporter
                .line(format!("  Template: {template} (default)")),
        }

        let images = encode_pages(&name, pages)?;

        self.reporter.line("  Analysing with AI...");
        let client = ExtractionClient::new(self.model.as_ref(), self.sleeper.as_ref(), self.config.retry)
            .with_reporter(self.reporter.clone());
        let mut result = extract_rows(&client, &name, template, strategy, &images, &self.reporter)?;

        let fallbacks = normalize_rows(&mut result.rows);
        if fallbacks > 0 {
            self.reporter.line(format!(
                "  {fallbacks} amount(s) could not be read and were set to 0"
            ));
        }
        report.row_count = result.row_count();
        report.column_count = result.column_count();
        if result.pages_failed > 0 {
            self.reporter.line(format!(
                "  {} of {} page(s) yielded nothing",
                result.pages_failed, result.pages_total
            ));
        }

        if let Err(e) = temp.remove() {
            warn!("Could not remove decrypted copy of {}: {}", name, e);
        }
        Ok(result.rows)
    }
}

/// Candidate statements in `folder`: regular `*.pdf` files (any case),
/// minus decrypted copies, sorted by file name.
pub fn discover_statements(folder: &Path) -> Result<Vec<PathBuf>, ExtractorError> {
    if !folder.is_dir() {
        return Err(ExtractorError::FolderNotFound {
            path: folder.to_path_buf(),
        });
    }
    let entries = std::fs::read_dir(folder).map_err(|source| ExtractorError::FolderUnreadable {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut sources: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .filter(|p| !is_temp_artifact(p))
        .collect();
    sources.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(sources)
}

/// Run a batch on the calling thread with the production collaborators.
pub fn extract_folder(config: &ExtractorConfig) -> Result<RunOutcome, ExtractorError> {
    let reader = PdfiumReader::new()?;
    let model = LlmVisionModel::from_config(config)?;
    Orchestrator::new(config.clone(), reader, model).run()
}

/// Run a batch on a dedicated, named worker thread.
///
/// Progress lines arrive on that thread through the configured sink; join
/// the handle for the outcome.
pub fn spawn_extraction(
    config: ExtractorConfig,
) -> std::io::Result<JoinHandle<Result<RunOutcome, ExtractorError>>> {
    std::thread::Builder::new()
        .name("statement-extractor".into())
        .spawn(move || {
            let outcome = extract_folder(&config);
            if let Err(ref e) = outcome {
                Reporter::new(config.progress_callback.clone())
                    .line(format!("Run failed: {}", truncate_detail(&e.to_string())));
            }
            outcome
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "A.PDF", "c.temp.pdf", "notes.txt", "Extractos.xlsx"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("folder.pdf")).unwrap();

        let found: Vec<String> = discover_statements(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, vec!["A.PDF", "b.pdf"]);
    }

    #[test]
    fn missing_folder_is_fatal() {
        let err = discover_statements(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ExtractorError::FolderNotFound { .. }));
    }
}
