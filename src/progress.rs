//! Progress sink for line-oriented status reporting.
//!
//! Inject an [`Arc<dyn ProgressSink>`] via
//! [`crate::config::ExtractorConfigBuilder::progress_callback`] to receive a
//! human-readable line at every pipeline step (unlock, render, classify, AI
//! call, parse, export).
//!
//! # Why callbacks instead of channels?
//!
//! The orchestrator runs on one worker thread and only needs to hand strings
//! to whoever is watching: a terminal progress bar, a log file, a GUI text
//! box. A callback keeps the library ignorant of how the host displays them.
//! Calls happen synchronously on the worker thread, so implementations must
//! return promptly and be safe to call off the interactive thread.
//!
//! # Example
//!
//! ```rust
//! use statement2xlsx::{ExtractorConfig, ProgressCallback};
//! use std::sync::Arc;
//!
//! let sink: ProgressCallback = Arc::new(|line: &str| eprintln!("{line}"));
//!
//! let config = ExtractorConfig::builder()
//!     .folder("statements")
//!     .password("1234")
//!     .api_key("AIzaSy-0123456789abcdefghijklmnop")
//!     .progress_callback(sink)
//!     .build()
//!     .unwrap();
//! # let _ = config;
//! ```

use std::sync::Arc;
use tracing::info;

/// Receives status lines from the extraction worker.
///
/// Only [`on_line`](ProgressSink::on_line) is required. The structured hooks
/// format a line and forward it, so a plain closure already gets every event;
/// override them to drive a progress bar.
pub trait ProgressSink: Send + Sync {
    /// A single human-readable status line.
    fn on_line(&self, line: &str);

    /// Called once after discovery, before the first file.
    fn on_run_start(&self, total_files: usize) {
        self.on_line(&format!("Found {total_files} statement PDF(s)"));
    }

    /// Called before a file is unlocked. `index` is 1-based.
    fn on_file_start(&self, index: usize, total_files: usize, file_name: &str) {
        self.on_line(&format!("[{index}/{total_files}] {file_name}"));
    }

    /// Called when a file produced rows and was assigned a worksheet.
    fn on_file_complete(&self, file_name: &str, sheet_name: &str, rows: usize) {
        self.on_line(&format!(
            "  OK {file_name}: {rows} transaction(s) -> sheet '{sheet_name}'"
        ));
    }

    /// Called when a file was skipped for any reason.
    fn on_file_skipped(&self, file_name: &str, reason: &str) {
        self.on_line(&format!("  SKIPPED {file_name}: {reason}"));
    }

    /// Called once after every file has been attempted.
    fn on_run_complete(&self, succeeded: usize, total_files: usize) {
        self.on_line(&format!(
            "{succeeded}/{total_files} statement(s) extracted"
        ));
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_line(&self, line: &str) {
        self(line)
    }
}

/// A no-op sink for callers that don't need progress lines.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_line(&self, _line: &str) {}
}

/// Convenience alias matching the type stored in [`crate::config::ExtractorConfig`].
pub type ProgressCallback = Arc<dyn ProgressSink>;

/// Internal fan-out: every line goes to `tracing` and to the optional sink.
#[derive(Clone, Default)]
pub(crate) struct Reporter {
    sink: Option<ProgressCallback>,
}

impl Reporter {
    pub(crate) fn new(sink: Option<ProgressCallback>) -> Self {
        Self { sink }
    }

    pub(crate) fn line(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        info!("{}", line);
        if let Some(ref sink) = self.sink {
            sink.on_line(line);
        }
    }

    /// Run a structured hook if a sink is attached.
    pub(crate) fn event(&self, f: impl FnOnce(&dyn ProgressSink)) {
        if let Some(ref sink) = self.sink {
            f(sink.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector {
        lines: Mutex<Vec<String>>,
    }

    impl ProgressSink for Collector {
        fn on_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    #[test]
    fn noop_sink_does_not_panic() {
        let sink = NoopProgress;
        sink.on_run_start(3);
        sink.on_file_start(1, 3, "a.pdf");
        sink.on_file_complete("a.pdf", "a", 12);
        sink.on_file_skipped("b.pdf", "wrong password");
        sink.on_run_complete(1, 3);
    }

    #[test]
    fn default_hooks_forward_to_on_line() {
        let sink = Collector::default();
        sink.on_run_start(2);
        sink.on_file_start(1, 2, "Nu_enero.pdf");
        sink.on_file_skipped("Nu_enero.pdf", "no rows extracted");
        sink.on_run_complete(0, 2);

        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains('2'));
        assert!(lines[1].contains("[1/2] Nu_enero.pdf"));
        assert!(lines[2].contains("no rows extracted"));
        assert!(lines[3].starts_with("0/2"));
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: ProgressCallback = Arc::new(move |line: &str| {
            seen_clone.lock().unwrap().push(line.to_string());
        });

        let reporter = Reporter::new(Some(sink));
        reporter.line("Unlocking...");
        reporter.event(|s| s.on_file_complete("x.pdf", "x", 1));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], "Unlocking...");
        assert!(seen[1].contains("sheet 'x'"));
    }
}
