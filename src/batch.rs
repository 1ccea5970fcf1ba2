//! Batch driver: classify and rename every document in a set of deals.
//!
//! A *deal* is a folder directly under the base directory; its documents are
//! the regular files directly inside it. For each file the runner decides:
//!
//! 1. skip it (already labelled, protected, unsupported),
//! 2. or classify it and rename it to its label,
//!
//! and writes one ledger record either way.

use crate::classify::Classifier;
use crate::files::rename::rename_with_label;
use crate::ledger::{bound_failure_reason, OutcomeSink};
use crate::output::DocumentLabel;
use crate::pipeline::input::is_supported;
use crate::pipeline::llm::CancellationFlag;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const CLASSIFICATION_FAILURE_PREFIX: &str = "Invalid or no classification: ";
pub const RENAME_FAILURE_PREFIX: &str = "Rename operation failed: ";

/// Files that must keep their names.
pub const DEFAULT_PROTECTED_NAMES: [&str; 2] = [
    "Housing_Refund_Request.pdf",
    "Housing_Refund_Modification.pdf",
];

/// One deal folder and its documents, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub name: String,
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
}

/// List the deals under `base`, sorted by name.
///
/// Hidden entries (leading `.`) are ignored at both levels.
pub fn scan_deals(base: &Path) -> io::Result<Vec<Deal>> {
    let mut deals = Vec::new();
    for dir in sorted_entries(base)?.into_iter().filter(|p| p.is_dir()) {
        let files = sorted_entries(&dir)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect();
        deals.push(Deal {
            name: file_name(&dir),
            path: dir,
            files,
        });
    }
    info!("Found {} deal(s) under {}", deals.len(), base.display());
    Ok(deals)
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| !file_name(p).starts_with('.'))
        .collect();
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    AlreadyClassified,
    Protected,
    Unsupported,
}

impl SkipReason {
    pub fn message(self) -> &'static str {
        match self {
            SkipReason::AlreadyClassified => "Already classified",
            SkipReason::Protected => "Not allowed to change",
            SkipReason::Unsupported => "Unsupported file type",
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FileDisposition {
    Renamed {
        label: DocumentLabel,
        new_path: PathBuf,
    },
    /// Dry run: classified, left untouched.
    Labelled { label: DocumentLabel },
    Skipped(SkipReason),
    /// Bounded, prefixed failure reason as written to the ledger.
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub deals: usize,
    pub empty_deals: usize,
    pub processed: usize,
    pub renamed: usize,
    /// Classified in a dry run and left under their old name.
    pub labelled: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    fn count(&mut self, disposition: &FileDisposition) {
        self.processed += 1;
        match disposition {
            FileDisposition::Renamed { .. } => self.renamed += 1,
            FileDisposition::Labelled { .. } => self.labelled += 1,
            FileDisposition::Skipped(_) => self.skipped += 1,
            FileDisposition::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Classify but never rename.
    pub dry_run: bool,
    /// Upper bound on ledger failure reasons, prefix included.
    pub max_reason_len: usize,
    /// Exact file names (case-insensitive) that are never renamed.
    pub protected_names: Vec<String>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_reason_len: 200,
            protected_names: DEFAULT_PROTECTED_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct BatchRunner {
    classifier: Arc<Classifier>,
    sink: Arc<dyn OutcomeSink>,
    progress: ProgressCallback,
    cancel: CancellationFlag,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(classifier: Arc<Classifier>, sink: Arc<dyn OutcomeSink>, options: BatchOptions) -> Self {
        Self {
            classifier,
            sink,
            progress: Arc::new(NoopProgressCallback),
            cancel: CancellationFlag::new(),
            options,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Checked between files; share it with the classifier to also stop retries.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process the first `limit` deals (all when `None`) in order.
    pub async fn run(&self, deals: &[Deal], limit: Option<usize>) -> BatchSummary {
        let selected = &deals[..limit.unwrap_or(deals.len()).min(deals.len())];
        let total_files = selected.iter().map(|d| d.files.len()).sum();
        self.progress.on_batch_start(total_files);

        let mut summary = BatchSummary {
            deals: selected.len(),
            ..Default::default()
        };

        'deals: for deal in selected {
            if deal.files.is_empty() {
                info!("No files found in the deal directory: {}", deal.name);
                summary.empty_deals += 1;
                continue;
            }
            info!("Processing deal {} ({} file(s))", deal.name, deal.files.len());

            for path in &deal.files {
                if self.cancel.is_cancelled() {
                    warn!("Batch cancelled; stopping before {}", path.display());
                    summary.cancelled = true;
                    break 'deals;
                }
                self.progress.on_file_start(path);
                let disposition = self.process_file(path).await;
                summary.count(&disposition);
                self.progress.on_file_complete(path, &disposition);
            }
        }

        info!(
            "Batch done: {} processed, {} renamed, {} labelled, {} skipped, {} failed, {} empty deal(s)",
            summary.processed,
            summary.renamed,
            summary.labelled,
            summary.skipped,
            summary.failed,
            summary.empty_deals
        );
        self.progress.on_batch_complete(&summary);
        summary
    }

    /// Classify and rename one file, recording the result in the ledger.
    pub async fn process_file(&self, path: &Path) -> FileDisposition {
        if let Some(reason) = self.skip_reason(path) {
            info!("Skipped processing {}: {}", path.display(), reason.message());
            self.log_sink(self.sink.record_skipped(path, reason.message()));
            return FileDisposition::Skipped(reason);
        }

        let outcome = self.classifier.classify_document(path).await;
        let label = match outcome.label {
            Some(label) => label,
            None => {
                let detail = outcome
                    .diagnostic
                    .unwrap_or_else(|| "no classification".to_string());
                return self.fail(path, CLASSIFICATION_FAILURE_PREFIX, &detail);
            }
        };
        if label == DocumentLabel::PoorImageQuality {
            info!(
                "{} is filed as {} because of poor image quality",
                path.display(),
                label.file_stem()
            );
        }

        if self.options.dry_run {
            info!("Dry run: {} would be renamed to {}", path.display(), label.file_stem());
            return FileDisposition::Labelled { label };
        }

        match rename_with_label(path, label.file_stem()) {
            Ok(new_path) => {
                let new_name = file_name(&new_path);
                self.log_sink(self.sink.record_success(path, &new_name, &new_path));
                FileDisposition::Renamed { label, new_path }
            }
            Err(e) => self.fail(path, RENAME_FAILURE_PREFIX, &e.to_string()),
        }
    }

    fn skip_reason(&self, path: &Path) -> Option<SkipReason> {
        let name = file_name(path);
        let lower = name.to_lowercase();

        if DocumentLabel::MODEL_LABELS
            .iter()
            .any(|l| lower.contains(&l.canonical_name().to_lowercase()))
        {
            Some(SkipReason::AlreadyClassified)
        } else if self
            .options
            .protected_names
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&name))
        {
            Some(SkipReason::Protected)
        } else if !is_supported(path) {
            Some(SkipReason::Unsupported)
        } else {
            None
        }
    }

    fn fail(&self, path: &Path, prefix: &str, detail: &str) -> FileDisposition {
        let reason = bound_failure_reason(prefix, detail, self.options.max_reason_len);
        error!("{}: {}", path.display(), reason);
        self.log_sink(self.sink.record_failure(path, &reason));
        FileDisposition::Failed(reason)
    }

    fn log_sink(&self, result: Result<(), crate::error::LedgerError>) {
        if let Err(e) = result {
            error!("Failed to write ledger record: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::error::TransportError;
    use crate::ledger::{JsonlLedger, LedgerStatus};
    use crate::pipeline::transport::{ClassificationRequest, ClassificationTransport};
    use async_trait::async_trait;
    use image::{GrayImage, Luma};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedTransport {
        reply: Result<String, TransportError>,
        calls: AtomicU32,
    }

    impl FixedTransport {
        fn label(label: &str) -> Arc<Self> {
            let text = format!("{{\"ContentType\": \"{label}\"}}");
            Arc::new(Self {
                reply: Ok(serde_json::json!({ "content": [{ "type": "text", "text": text }] })
                    .to_string()),
                calls: AtomicU32::new(0),
            })
        }

        fn fatal() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(TransportError::Fatal {
                    detail: "HTTP 401: invalid x-api-key".into(),
                }),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ClassificationTransport for FixedTransport {
        async fn send(&self, _: &ClassificationRequest) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn sharp_png(path: &Path) {
        GrayImage::from_fn(32, 32, |x, y| if (x + y) % 2 == 0 { Luma([0]) } else { Luma([255]) })
            .save(path)
            .unwrap();
    }

    fn runner(
        transport: Arc<FixedTransport>,
        ledger: Arc<JsonlLedger>,
        options: BatchOptions,
    ) -> BatchRunner {
        let config = ClassifierConfig::builder().ocr_enabled(false).build().unwrap();
        let classifier = Classifier::new(&config, transport).with_recognizer(None);
        BatchRunner::new(Arc::new(classifier), ledger, options)
    }

    fn deal_tree() -> tempfile::TempDir {
        let base = tempfile::tempdir().unwrap();
        let a = base.path().join("Deal_A");
        std::fs::create_dir_all(&a).unwrap();
        sharp_png(&a.join("scan_001.png"));
        std::fs::write(a.join("notes.txt"), "n/a").unwrap();
        std::fs::write(a.join("Housing_Refund_Request.pdf"), b"%PDF").unwrap();
        std::fs::write(a.join("old_Rental_Contract.pdf"), b"%PDF").unwrap();
        std::fs::create_dir_all(base.path().join("Deal_B")).unwrap();
        std::fs::write(base.path().join("stray.pdf"), b"%PDF").unwrap();
        base
    }

    #[test]
    fn scan_lists_deals_and_direct_files() {
        let base = deal_tree();
        let deals = scan_deals(base.path()).unwrap();
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].name, "Deal_A");
        assert_eq!(deals[0].files.len(), 4);
        assert!(deals[1].files.is_empty());
    }

    #[tokio::test]
    async fn batch_renames_and_skips() {
        let base = deal_tree();
        let ledger = Arc::new(JsonlLedger::open(base.path().join("ledger.jsonl")).unwrap());
        let transport = FixedTransport::label("repayment_table");
        let deals = scan_deals(base.path()).unwrap();

        let summary = runner(transport.clone(), ledger.clone(), BatchOptions::default())
            .run(&deals, None)
            .await;

        assert_eq!(summary.deals, 2);
        assert_eq!(summary.empty_deals, 1);
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.renamed, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(base.path().join("Deal_A/Repayment_Table.png").exists());
        assert!(!base.path().join("Deal_A/scan_001.png").exists());

        let entries = ledger.entries().unwrap();
        let skipped: Vec<&str> = entries
            .iter()
            .filter(|e| e.status == LedgerStatus::Skipped)
            .filter_map(|e| e.reason.as_deref())
            .collect();
        assert!(skipped.contains(&"Not allowed to change"));
        assert!(skipped.contains(&"Already classified"));
        assert!(skipped.contains(&"Unsupported file type"));
    }

    #[tokio::test]
    async fn dry_run_leaves_files_alone() {
        let base = deal_tree();
        let ledger = Arc::new(JsonlLedger::open(base.path().join("ledger.jsonl")).unwrap());
        let options = BatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let r = runner(FixedTransport::label("Unclassified"), ledger, options);
        let path = base.path().join("Deal_A/scan_001.png");

        assert_eq!(
            r.process_file(&path).await,
            FileDisposition::Labelled {
                label: DocumentLabel::Unclassified
            }
        );
        assert!(path.exists());
    }

    #[tokio::test]
    async fn dry_run_summary_counts_labelled_not_renamed() {
        let base = deal_tree();
        let ledger = Arc::new(JsonlLedger::open(base.path().join("ledger.jsonl")).unwrap());
        let options = BatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let deals = scan_deals(base.path()).unwrap();

        let summary = runner(FixedTransport::label("Rental_Contract"), ledger, options)
            .run(&deals, None)
            .await;

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.renamed, 0);
        assert_eq!(summary.labelled, 1);
        assert_eq!(summary.skipped, 3);
        assert!(base.path().join("Deal_A/scan_001.png").exists());
    }

    #[tokio::test]
    async fn failure_reason_is_prefixed_and_bounded() {
        let base = deal_tree();
        let ledger = Arc::new(JsonlLedger::open(base.path().join("ledger.jsonl")).unwrap());
        let options = BatchOptions {
            max_reason_len: 40,
            ..Default::default()
        };
        let r = runner(FixedTransport::fatal(), ledger.clone(), options);

        match r.process_file(&base.path().join("Deal_A/scan_001.png")).await {
            FileDisposition::Failed(reason) => {
                assert!(reason.starts_with(CLASSIFICATION_FAILURE_PREFIX));
                assert_eq!(reason.chars().count(), 40);
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(ledger.entries().unwrap()[0].status, LedgerStatus::Failure);
    }

    #[tokio::test]
    async fn limit_and_cancellation() {
        let base = deal_tree();
        let ledger = Arc::new(JsonlLedger::open(base.path().join("ledger.jsonl")).unwrap());
        let deals = scan_deals(base.path()).unwrap();

        let limited = runner(FixedTransport::label("Unclassified"), ledger.clone(), BatchOptions::default())
            .run(&deals, Some(0))
            .await;
        assert_eq!(limited.deals, 0);
        assert_eq!(limited.processed, 0);

        let cancel = CancellationFlag::new();
        cancel.cancel();
        let cancelled = runner(FixedTransport::label("Unclassified"), ledger, BatchOptions::default())
            .with_cancellation(cancel)
            .run(&deals, None)
            .await;
        assert!(cancelled.cancelled);
        assert_eq!(cancelled.processed, 0);
    }
}
