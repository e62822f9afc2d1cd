//! CLI binary for statement2xlsx.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractorConfig`, runs the batch on its worker thread and prints a
//! summary.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use statement2xlsx::{
    spawn_extraction, ExtractorConfig, FileStatus, ProgressCallback, ProgressSink, RunOutcome,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: a bar counting statements, with the worker's
/// status lines printed above it.
struct CliProgress {
    bar: ProgressBar,
    /// Start of the statement currently being processed.
    file_started: Mutex<Option<Instant>>,
    skipped: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning folder…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: Mutex::new(None),
            skipped: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} statements  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed(&self) -> String {
        let secs = self
            .file_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl ProgressSink for CliProgress {
    fn on_line(&self, line: &str) {
        self.bar.println(dim(line));
    }

    fn on_run_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_files} statement PDF(s)"))
        ));
    }

    fn on_file_start(&self, index: usize, total_files: usize, file_name: &str) {
        if let Ok(mut t) = self.file_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(file_name.to_string());
        self.bar.println(format!(
            "{} {}",
            cyan(&format!("[{index}/{total_files}]")),
            bold(file_name)
        ));
    }

    fn on_file_complete(&self, file_name: &str, sheet_name: &str, rows: usize) {
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            file_name,
            dim(&format!("{rows} row(s) → '{sheet_name}'")),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_file_skipped(&self, file_name: &str, reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            file_name,
            red(reason),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, succeeded: usize, total_files: usize) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);
        if skipped == 0 {
            eprintln!(
                "{} {} statement(s) extracted",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} statement(s) extracted  ({} skipped)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_files,
                red(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Consolidate every statement in a folder
  statement2xlsx ~/extractos --password 1032456789

  # Password and key from the environment
  export STATEMENT_PASSWORD=1032456789 GEMINI_API_KEY=AIza...
  statement2xlsx ~/extractos

  # Another workbook name, more patient retries
  statement2xlsx ~/extractos -o marzo.xlsx --max-attempts 5 --retry-backoff-ms 15000 --max-backoff-ms 60000

  # Machine-readable per-file report
  statement2xlsx ~/extractos --json > report.json

TEMPLATES (chosen from the file name):
  nu / nubank                       installment card
  credit_card, rappi, davivienda    co-branded card
  anything else                     ledger (savings / checking)

  Ledgers longer than --per-page-threshold pages are sent one page per
  request; everything else is sent in a single request.

OUTPUT:
  <folder>/Extractos_Consolidados.xlsx, one worksheet per statement.
  An existing workbook is first renamed to
  Extractos_Consolidados.backup-<YYYYmmdd-HHMMSS>.xlsx.

ENVIRONMENT VARIABLES:
  STATEMENT_PASSWORD      Password shared by the statements
  GEMINI_API_KEY          Google Gemini API key
  STATEMENT2XLSX_PROVIDER Override provider (gemini, openai, anthropic, ...)
  STATEMENT2XLSX_MODEL    Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium
"#;

/// Consolidate password-protected bank statements into one workbook.
#[derive(Parser, Debug)]
#[command(
    name = "statement2xlsx",
    version,
    about = "Consolidate password-protected bank-statement PDFs into one xlsx using Vision LLMs",
    long_about = "Unlock every bank-statement PDF in a folder, let a multimodal model read the \
transaction tables, and write one worksheet per statement to a single workbook. Statements that \
cannot be opened or read are skipped and reported; the others still land in the workbook.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder holding the statement PDFs.
    folder: PathBuf,

    /// Password shared by the statements.
    #[arg(short, long, env = "STATEMENT_PASSWORD", hide_env_values = true)]
    password: String,

    /// API key for the vision model provider.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// LLM provider: gemini, openai, anthropic, openrouter, mistral.
    #[arg(long, env = "STATEMENT2XLSX_PROVIDER", default_value = "gemini")]
    provider: String,

    /// LLM model ID.
    #[arg(long, env = "STATEMENT2XLSX_MODEL", default_value = "gemini-2.0-flash")]
    model: String,

    /// Workbook file name, written inside the folder.
    #[arg(short, long, env = "STATEMENT2XLSX_OUTPUT", default_value = "Extractos_Consolidados.xlsx")]
    output: String,

    /// Attempts per model request.
    #[arg(long, env = "STATEMENT2XLSX_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_attempts: u32,

    /// Wait before the first retry; grows linearly up to --max-backoff-ms.
    #[arg(long, env = "STATEMENT2XLSX_RETRY_BACKOFF_MS", default_value_t = 2000)]
    retry_backoff_ms: u64,

    /// Longest single wait between retries. Must not be below --retry-backoff-ms.
    #[arg(long, env = "STATEMENT2XLSX_MAX_BACKOFF_MS", default_value_t = 10_000)]
    max_backoff_ms: u64,

    /// Ledgers with more pages than this are extracted page by page.
    #[arg(long, env = "STATEMENT2XLSX_PER_PAGE_THRESHOLD", default_value_t = 3)]
    per_page_threshold: usize,

    /// Max LLM output tokens per request.
    #[arg(long, env = "STATEMENT2XLSX_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Per-request LLM timeout in seconds.
    #[arg(long, env = "STATEMENT2XLSX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Print the run outcome as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "STATEMENT2XLSX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar already shows every status line; keep library INFO logs out
    // of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress || cli.json {
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

    let bar = show_progress.then(CliProgress::new);
    let progress = bar.clone().map(|b| b as ProgressCallback);

    let config = build_config(&cli, progress)?;
    let handle = spawn_extraction(config).context("Failed to start the extraction worker")?;
    let joined = handle.join();
    // Runs that end before `on_run_complete` leave the spinner up.
    if let Some(ref b) = bar {
        b.bar.finish_and_clear();
    }
    let outcome = joined
        .map_err(|_| anyhow!("Extraction worker panicked"))?
        .context("Extraction failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
        );
    } else if !cli.quiet {
        print_summary(&outcome);
    }

    Ok(match outcome {
        RunOutcome::Exported { .. } => ExitCode::SUCCESS,
        _ => ExitCode::from(2),
    })
}

/// Map CLI args to `ExtractorConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractorConfig> {
    let mut builder = ExtractorConfig::builder()
        .folder(&cli.folder)
        .password(&cli.password)
        .api_key(&cli.api_key)
        .provider_name(&cli.provider)
        .model(&cli.model)
        .output_file_name(&cli.output)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .max_backoff_ms(cli.max_backoff_ms)
        .per_page_threshold(cli.per_page_threshold)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NothingFound => {
            eprintln!("{} No statement PDFs found", cyan("⚠"));
            return;
        }
        RunOutcome::NothingExtracted { .. } => {
            eprintln!("{} No transactions extracted; no workbook written", red("✘"));
        }
        RunOutcome::Exported { path, .. } => {
            eprintln!(
                "{}  {}/{} statements  →  {}",
                green("✔"),
                outcome.succeeded(),
                outcome.files().len(),
                bold(&path.display().to_string()),
            );
        }
    }

    for file in outcome.files() {
        match file.status {
            FileStatus::Success => eprintln!(
                "   {} {:<40} {}",
                green("✓"),
                file.file_name(),
                dim(&format!(
                    "{} row(s) × {} column(s), {} page(s)",
                    file.row_count, file.column_count, file.page_count
                )),
            ),
            FileStatus::Skipped { ref reason } => {
                eprintln!("   {} {:<40} {}", red("✗"), file.file_name(), red(reason))
            }
            FileStatus::Pending => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec![
            "statement2xlsx",
            "/tmp/extractos",
            "--password",
            "1032456789",
            "--api-key",
            "AIzaSy-0123456789abcdefghijklmnop",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn long_retry_wait_builds_once_the_cap_is_raised() {
        let cli = parse(&["--retry-backoff-ms", "15000", "--max-backoff-ms", "60000"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.retry.base_delay, Duration::from_secs(15));
        assert_eq!(config.retry.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn retry_wait_above_the_cap_is_refused() {
        let cli = parse(&["--retry-backoff-ms", "15000", "--max-backoff-ms", "10000"]);
        let err = build_config(&cli, None).unwrap_err();
        assert!(format!("{err:#}").contains("exceeds its cap"));
    }
}
