//! Document classification entry points.
//!
//! [`Classifier::classify_document`] runs the whole pipeline for one file
//! and always returns a [`ClassificationOutcome`]; `Err` is reserved for
//! setup problems (bad configuration, missing API key) caught when the
//! classifier is built.
//!
//! ```text
//! render ─▶ no pages? ─────────────────────────▶ NoUsablePages
//!   │
//! assess ─▶ every page Bad? ───────────────────▶ PoorImageQuality (no call)
//!   │
//! encode ─▶ nothing encoded? ──────────────────▶ NoUsablePages
//!   │
//! client ─▶ label known? ──────────────────────▶ labelled outcome
//!              └─ otherwise ───────────────────▶ UnrecognizedLabel / ParseError / …
//! ```

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::output::{ClassificationOutcome, DocumentLabel, FailureKind, PageReport};
use crate::pipeline::encode;
use crate::pipeline::llm::{CancellationFlag, ClassificationClient, ClientResult, Sleeper};
use crate::pipeline::ocr::{default_recognizer, TextRecognizer};
use crate::pipeline::quality::{QualityAssessor, QualityVerdict};
use crate::pipeline::render::{render_document, PageImage, PageRenderer, PdfRasterizer};
use crate::pipeline::response::ParsedResponse;
use crate::pipeline::transport::{transport_from_config, ClassificationTransport};
use crate::prompts::{CLASSIFICATION_PROMPT, SYSTEM_INSTRUCTION};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const UNUSABLE_INPUT: &str = "unsupported or unreadable input";

/// Classify one document with a freshly built [`Classifier`].
pub async fn classify(
    path: impl AsRef<Path>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutcome, ClassifierError> {
    let classifier = Classifier::from_config(config)?;
    Ok(classifier.classify_document(path.as_ref()).await)
}

/// Synchronous wrapper around [`classify`].
///
/// Creates a temporary tokio runtime internally.
pub fn classify_sync(
    path: impl AsRef<Path>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutcome, ClassifierError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ClassifierError::InvalidConfig(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(classify(path, config))
}

/// The classification pipeline with its collaborators wired in.
pub struct Classifier {
    config: ClassifierConfig,
    renderer: Arc<PageRenderer>,
    assessor: Arc<QualityAssessor>,
    client: ClassificationClient,
}

impl Classifier {
    /// Production wiring: pdfium, tesseract (if enabled) and the configured transport.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let transport = transport_from_config(config)?;
        Ok(Self::new(config, transport))
    }

    /// Production renderer and recogniser with a caller-supplied transport.
    pub fn new(config: &ClassifierConfig, transport: Arc<dyn ClassificationTransport>) -> Self {
        let recognizer: Option<Arc<dyn TextRecognizer>> = if config.ocr_enabled {
            Some(default_recognizer(&config.ocr_languages))
        } else {
            None
        };
        let system = config
            .system_instruction
            .clone()
            .unwrap_or_else(|| SYSTEM_INSTRUCTION.to_string());

        Self {
            renderer: Arc::new(PageRenderer::new(config)),
            assessor: Arc::new(QualityAssessor::new(config.quality, recognizer)),
            client: ClassificationClient::new(transport, config.retry, system),
            config: config.clone(),
        }
    }

    /// Replace the PDF backend.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        self.renderer = Arc::new(PageRenderer::with_rasterizer(rasterizer, &self.config));
        self
    }

    /// Replace the text recogniser; `None` disables the text check.
    pub fn with_recognizer(mut self, recognizer: Option<Arc<dyn TextRecognizer>>) -> Self {
        self.assessor = Arc::new(QualityAssessor::new(self.config.quality, recognizer));
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.client = self.client.with_sleeper(sleeper);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.client = self.client.with_cancellation(cancel);
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one document. Never fails; see [`ClassificationOutcome`].
    pub async fn classify_document(&self, path: &Path) -> ClassificationOutcome {
        let start = Instant::now();
        info!("Classifying {}", path.display());

        // ── Step 1: Render ───────────────────────────────────────────────
        let pages = render_document(
            Arc::clone(&self.renderer),
            path.to_path_buf(),
            self.config.max_pages,
        )
        .await;
        if pages.is_empty() {
            info!("No usable pages in {}", path.display());
            return ClassificationOutcome::failed(FailureKind::NoUsablePages, UNUSABLE_INPUT);
        }

        // ── Step 2: Quality gate ─────────────────────────────────────────
        let assessed = match self.assess(pages).await {
            Some(assessed) => assessed,
            None => {
                return ClassificationOutcome::failed(
                    FailureKind::NoUsablePages,
                    "quality assessment task failed",
                )
            }
        };
        let reports: Vec<PageReport> = assessed
            .iter()
            .map(|(page, verdict)| PageReport {
                page_index: page.index,
                verdict: verdict.clone(),
            })
            .collect();

        let total = assessed.len();
        let mut good = Vec::with_capacity(total);
        let mut bad = Vec::new();
        for (page, verdict) in assessed {
            if verdict.is_good() {
                good.push(page);
            } else {
                warn!(
                    "Dropping page {} of {}: {}",
                    page.index + 1,
                    path.display(),
                    verdict.failed_checks().join(", ")
                );
                bad.push(page);
            }
        }

        let survivors = if !good.is_empty() {
            good
        } else if self.config.short_circuit_poor_quality {
            info!("All {} page(s) of {} failed the quality gate", total, path.display());
            return ClassificationOutcome::poor_image_quality(
                format!("all {} page(s) failed the quality gate", total),
                reports,
            );
        } else {
            warn!("Every page failed the quality gate; submitting them anyway");
            bad
        };

        // ── Step 3: Encode ───────────────────────────────────────────────
        let payload = encode::encode(&survivors, self.config.jpeg_quality);
        drop(survivors);
        if payload.is_empty() {
            return ClassificationOutcome {
                pages: reports,
                ..ClassificationOutcome::failed(FailureKind::NoUsablePages, UNUSABLE_INPUT)
            };
        }

        // ── Step 4: Remote classification ────────────────────────────────
        let prompt = self
            .config
            .prompt
            .as_deref()
            .unwrap_or(CLASSIFICATION_PROMPT);
        let result = self.client.classify(&payload, prompt).await;

        let outcome = interpret(result, reports);
        info!(
            "Classified {} as {} in {:?} ({} attempt(s))",
            path.display(),
            outcome
                .label
                .map(|l| l.canonical_name().to_string())
                .unwrap_or_else(|| format!("{:?}", outcome.failure)),
            start.elapsed(),
            outcome.attempts
        );
        outcome
    }

    /// Score every page on the blocking pool, keeping page order.
    async fn assess(&self, pages: Vec<PageImage>) -> Option<Vec<(PageImage, QualityVerdict)>> {
        let assessor = Arc::clone(&self.assessor);
        let task = tokio::task::spawn_blocking(move || {
            pages
                .into_iter()
                .map(|page| {
                    let verdict = assessor.assess(&page);
                    (page, verdict)
                })
                .collect::<Vec<_>>()
        });
        match task.await {
            Ok(assessed) => Some(assessed),
            Err(e) => {
                warn!("Quality assessment task panicked: {}", e);
                None
            }
        }
    }
}

/// Turn the client result into the final outcome.
fn interpret(result: ClientResult, pages: Vec<PageReport>) -> ClassificationOutcome {
    match result {
        ClientResult::Answered {
            response:
                ParsedResponse::Labelled {
                    label, raw_json, ..
                },
            attempts,
        } => match DocumentLabel::from_model_label(&label) {
            Some(known) => ClassificationOutcome::labelled(known, raw_json, attempts, pages),
            None => {
                warn!("Model answered with unknown label '{}'", label);
                ClassificationOutcome {
                    raw_response_json: Some(raw_json),
                    attempts,
                    pages,
                    ..ClassificationOutcome::failed(
                        FailureKind::UnrecognizedLabel,
                        format!("unrecognized label '{}'", label),
                    )
                }
            }
        },
        ClientResult::Answered {
            response: ParsedResponse::ParseError(diagnostic),
            attempts,
        } => {
            warn!("{}", diagnostic);
            ClassificationOutcome {
                attempts,
                pages,
                ..ClassificationOutcome::failed(FailureKind::ParseError, diagnostic)
            }
        }
        ClientResult::Failed {
            kind,
            diagnostic,
            attempts,
        } => {
            warn!("{}", diagnostic);
            ClassificationOutcome {
                attempts,
                pages,
                ..ClassificationOutcome::failed(kind, diagnostic)
            }
        }
    }
}
