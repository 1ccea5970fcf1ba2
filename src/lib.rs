//! # docclass
//!
//! Classify scanned administrative documents (rental and mortgage contracts,
//! payment proofs, teleworking agreements, repayment tables) with a vision
//! model, and rename them after their type.
//!
//! ## Why this crate?
//!
//! Deal folders fill up with files called `scan_0042.pdf` or `IMG_2231.jpg`.
//! Reading the first pages is enough to tell what a document is, but only if
//! the pages are legible. This crate renders those pages, rejects the ones no
//! reader could make sense of, and asks a vision model for one label.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / JPEG / PNG
//!  │
//!  ├─ 1. Render   at most 4 leading pages via pdfium (spawn_blocking)
//!  ├─ 2. Gate     focus + contrast + OCR confidence; all bad → Poor_Image_Quality
//!  ├─ 3. Encode   RGB → JPEG q75 → base64
//!  ├─ 4. Classify one request, capped exponential backoff on 429/5xx
//!  └─ 5. Label    ContentType → DocumentLabel (case-insensitive)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docclass::{classify, ClassifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClassifierConfig::builder()
//!         .api_key(std::env::var("ANTHROPIC_API_KEY")?)
//!         .build()?;
//!     let outcome = classify("scan_0042.pdf", &config).await?;
//!     match outcome.label {
//!         Some(label) => println!("{label}"),
//!         None => eprintln!("{:?}: {:?}", outcome.failure, outcome.diagnostic),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docclass` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `ocr`   | off     | Runs the text-confidence check through linked libtesseract instead of the `tesseract` binary |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docclass = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod files;
pub mod ledger;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{scan_deals, BatchOptions, BatchRunner, BatchSummary, Deal, FileDisposition, SkipReason};
pub use classify::{classify, classify_sync, Classifier};
pub use config::{ClassifierConfig, ClassifierConfigBuilder, QualityThresholds, RetryPolicy};
pub use error::{
    ClassifierError, LedgerError, LockError, RecognizerError, RenameError, RenderError,
    TransportError,
};
pub use files::locate::{DirectoryLocator, FileLocator};
pub use files::lock::ProcessLock;
pub use files::rename::{rename_with_label, validate_file_name};
pub use ledger::{bound_failure_reason, JsonlLedger, OutcomeSink};
pub use output::{ClassificationOutcome, DocumentLabel, FailureKind, PageReport};
pub use pipeline::llm::{CancellationFlag, Sleeper, TokioSleeper};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
