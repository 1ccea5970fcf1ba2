//! CLI binary for docclass.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ClassifierConfig`, wires the batch collaborators together and prints
//! results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use docclass::config::DEFAULT_MODEL;
use docclass::{
    scan_deals, BatchOptions, BatchProgressCallback, BatchRunner, BatchSummary,
    CancellationFlag, Classifier, ClassifierConfig, DirectoryLocator, FileDisposition,
    FileLocator, JsonlLedger, ProcessLock,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the whole batch plus a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Classifying");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
    }

    fn on_file_start(&self, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(name);
    }

    fn on_file_complete(&self, path: &Path, disposition: &FileDisposition) {
        let line = match disposition {
            FileDisposition::Renamed { new_path, .. } => format!(
                "  {} {}  →  {}",
                green("✓"),
                path.display(),
                bold(&new_path.display().to_string())
            ),
            FileDisposition::Labelled { label } => {
                format!("  {} {}  →  {}", green("✓"), path.display(), dim(label.file_stem()))
            }
            FileDisposition::Skipped(reason) => {
                format!("  {} {}  {}", dim("–"), path.display(), dim(reason.message()))
            }
            FileDisposition::Failed(reason) => {
                format!("  {} {}  {}", red("✗"), path.display(), red(reason))
            }
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify one document and print the outcome as JSON
  docclass classify scans/scan_0042.pdf

  # Find the file inside a deal folder first
  docclass classify lease.pdf --deal Deal_17 --root /mnt/deals

  # Rename everything in the first 5 deals
  docclass batch /mnt/deals --limit 5

  # See what would happen without renaming
  docclass batch /mnt/deals --dry-run

  # Use another vision provider through edgequake-llm
  docclass --provider openai --model gpt-4.1-mini batch /mnt/deals

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY        Anthropic API key (default provider)
  OPENAI_API_KEY, …        Keys for other providers, read by edgequake-llm
  DOCCLASS_MODEL           Model ID
  DOCCLASS_PDFIUM_LIB_DIR  Directory holding libpdfium (else the system library)
  DOCCLASS_LOG_DIR         Also write logs to <dir>/docclass_<date>.log
  RUST_LOG                 Overrides --verbose / --quiet

SETUP:
  Quality checks run `tesseract` (with eng, fra and nld data) when it is on
  PATH. Pass --no-ocr-check to skip the text-confidence check.
"#;

/// Classify scanned administrative documents with a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "docclass",
    version,
    about = "Classify scanned administrative documents and rename them after their type",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one document and print the outcome as JSON.
    Classify {
        /// Document path, or a bare file name when --deal is given.
        path: String,

        /// Resolve PATH inside this deal folder.
        #[arg(long, requires = "root")]
        deal: Option<String>,

        /// Directories that contain deal folders (repeatable).
        #[arg(long, env = "DOCCLASS_ROOT", value_delimiter = ',')]
        root: Vec<PathBuf>,
    },

    /// Classify and rename every document in the deal folders under BASE_DIR.
    Batch {
        base_dir: PathBuf,

        /// Process at most this many deals.
        #[arg(long)]
        limit: Option<usize>,

        /// Classify but do not rename.
        #[arg(long)]
        dry_run: bool,

        /// Outcome ledger (JSON lines). Default: <BASE_DIR>/docclass_ledger.jsonl
        #[arg(long, env = "DOCCLASS_LEDGER")]
        ledger: Option<PathBuf>,

        /// Lock file. Default: <BASE_DIR>/.docclass.lock
        #[arg(long, env = "DOCCLASS_LOCK_FILE")]
        lock_file: Option<PathBuf>,

        /// Maximum length of failure reasons in the ledger.
        #[arg(long, default_value_t = 200)]
        max_reason_len: usize,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Vision model ID.
    #[arg(long, global = true, env = "DOCCLASS_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Provider: anthropic (direct HTTP) or any edgequake-llm provider.
    #[arg(long, global = true, env = "DOCCLASS_PROVIDER", default_value = "anthropic")]
    provider: String,

    /// API key for the anthropic provider.
    #[arg(long, global = true, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Total attempts per document (first call included).
    #[arg(long, global = true, env = "DOCCLASS_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Base backoff delay in seconds.
    #[arg(long, global = true, env = "DOCCLASS_BASE_DELAY", default_value_t = 6)]
    base_delay: u64,

    /// Backoff cap in seconds.
    #[arg(long, global = true, env = "DOCCLASS_MAX_DELAY", default_value_t = 60)]
    max_delay: u64,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "DOCCLASS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Pages rendered per document (1–4).
    #[arg(long, global = true, default_value_t = 4,
          value_parser = clap::value_parser!(u32).range(1..=4))]
    max_pages: u32,

    /// Minimum mean OCR confidence (0–100) for a page to count as legible.
    #[arg(long, global = true, env = "DOCCLASS_MIN_TEXT_CONFIDENCE", default_value_t = 30.0)]
    min_text_confidence: f64,

    /// Skip the OCR text-confidence check.
    #[arg(long, global = true, env = "DOCCLASS_NO_OCR_CHECK")]
    no_ocr_check: bool,

    /// Tesseract languages.
    #[arg(long, global = true, env = "DOCCLASS_OCR_LANG", default_value = "eng+fra+nld")]
    ocr_lang: String,

    /// Submit documents even when every page fails the quality gate.
    #[arg(long, global = true)]
    no_short_circuit: bool,

    /// File with a replacement classification prompt.
    #[arg(long, global = true, env = "DOCCLASS_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Save rendered pages here for auditing.
    #[arg(long, global = true, env = "DOCCLASS_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Directory holding libpdfium.
    #[arg(long, global = true, env = "DOCCLASS_PDFIUM_LIB_DIR")]
    pdfium_lib_dir: Option<PathBuf>,

    /// Also write logs to <DIR>/docclass_<YYYY-MM-DD>.log.
    #[arg(long, global = true, env = "DOCCLASS_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCCLASS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCCLASS_QUIET")]
    quiet: bool,

    /// Disable the batch progress bar.
    #[arg(long, global = true, env = "DOCCLASS_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let common = &cli.common;

    let show_progress =
        !common.quiet && !common.no_progress && matches!(cli.command, Command::Batch { .. });
    init_logging(common, show_progress)?;

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing the current document");
                cancel.cancel();
            }
        });
    }

    let config = build_config(common)?;
    let classifier = Arc::new(
        Classifier::from_config(&config)
            .context("Failed to set up the classifier")?
            .with_cancellation(cancel.clone()),
    );

    match &cli.command {
        Command::Classify { path, deal, root } => {
            let path = match deal {
                Some(deal) => DirectoryLocator::new(root.clone())
                    .locate(deal, path)
                    .await
                    .with_context(|| format!("'{path}' not found in deal '{deal}'"))?,
                None => PathBuf::from(path),
            };

            let outcome = classifier.classify_document(&path).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
            );
            if !outcome.is_success() {
                bail!(
                    "classification failed: {}",
                    outcome.diagnostic.unwrap_or_default()
                );
            }
        }

        Command::Batch {
            base_dir,
            limit,
            dry_run,
            ledger,
            lock_file,
            max_reason_len,
        } => {
            let lock_path = lock_file
                .clone()
                .unwrap_or_else(|| base_dir.join(".docclass.lock"));
            let _lock = ProcessLock::acquire(&lock_path)?;

            let ledger_path = ledger
                .clone()
                .unwrap_or_else(|| base_dir.join("docclass_ledger.jsonl"));
            let ledger = Arc::new(JsonlLedger::open(&ledger_path)?);

            let deals = scan_deals(base_dir)
                .with_context(|| format!("Failed to scan {}", base_dir.display()))?;
            if !common.quiet {
                eprintln!("Total number of deals found: {}", bold(&deals.len().to_string()));
            }

            let options = BatchOptions {
                dry_run: *dry_run,
                max_reason_len: *max_reason_len,
                ..Default::default()
            };
            let mut runner = BatchRunner::new(Arc::clone(&classifier), ledger, options)
                .with_cancellation(cancel.clone());
            if show_progress {
                runner = runner.with_progress(CliProgressCallback::new());
            }

            let summary = runner.run(&deals, *limit).await;
            info!("Ledger written to {}", ledger_path.display());
            if !common.quiet {
                print_summary(&summary, &ledger_path);
            }
        }
    }

    Ok(())
}

fn init_logging(common: &CommonArgs, show_progress: bool) -> Result<()> {
    // The progress bar gives all the feedback that matters; keep stderr quiet.
    let level = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match &common.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = dir.join(format!(
                "docclass_{}.log",
                chrono::Local::now().format("%Y-%m-%d")
            ));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn build_config(common: &CommonArgs) -> Result<ClassifierConfig> {
    let mut builder = ClassifierConfig::builder()
        .provider_name(&common.provider)
        .model(&common.model)
        .max_pages(common.max_pages as usize)
        .retry_limit(common.max_retries)
        .base_delay(Duration::from_secs(common.base_delay))
        .max_delay(Duration::from_secs(common.max_delay))
        .api_timeout_secs(common.api_timeout)
        .min_text_confidence(common.min_text_confidence)
        .ocr_enabled(!common.no_ocr_check)
        .ocr_languages(&common.ocr_lang)
        .short_circuit_poor_quality(!common.no_short_circuit);

    if let Some(ref key) = common.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref path) = common.prompt_file {
        let prompt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt file {}", path.display()))?;
        builder = builder.prompt(prompt);
    }
    if let Some(ref dir) = common.staging_dir {
        builder = builder.staging_dir(dir);
    }
    if let Some(ref dir) = common.pdfium_lib_dir {
        builder = builder.pdfium_lib_dir(dir);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &BatchSummary, ledger: &Path) {
    let mark = if summary.failed == 0 { green("✔") } else { red("⚠") };
    let done = if summary.labelled > 0 {
        format!("{} labelled (dry run)", bold(&summary.labelled.to_string()))
    } else {
        format!("{} renamed", bold(&summary.renamed.to_string()))
    };
    eprintln!(
        "{}  {} deal(s)  {} file(s): {}, {} skipped, {} failed",
        mark,
        summary.deals,
        summary.processed,
        done,
        summary.skipped,
        red(&summary.failed.to_string()),
    );
    if summary.empty_deals > 0 {
        eprintln!("   {}", dim(&format!("{} empty deal(s)", summary.empty_deals)));
    }
    if summary.cancelled {
        eprintln!("   {}", red("interrupted before all files were processed"));
    }
    eprintln!("   ledger: {}", dim(&ledger.display().to_string()));
}
