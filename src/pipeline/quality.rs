//! Page-quality gate.
//!
//! A page is worth sending to the model only if it passes three independent
//! checks, combined with AND:
//!
//! | Check     | Measure                                         | Good when            |
//! |-----------|-------------------------------------------------|----------------------|
//! | focus     | variance of the 3x3 Laplacian response          | `>= min_focus_variance` |
//! | histogram | coefficient of variation of the normalised histogram | `> min_histogram_spread` |
//! | text      | mean OCR word confidence                        | `>= min_text_confidence` |
//!
//! The scoring functions are pure; [`QualityVerdict::from_scores`] applies the
//! thresholds, so the combination rule is testable without images.

use crate::config::QualityThresholds;
use crate::pipeline::ocr::{mean_confidence, TextRecognizer};
use crate::pipeline::render::PageImage;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Good,
    Bad,
}

impl Verdict {
    fn from_pass(pass: bool) -> Self {
        if pass {
            Verdict::Good
        } else {
            Verdict::Bad
        }
    }
}

/// Outcome of the text-confidence check before thresholds are applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TextScore {
    /// No recogniser configured; the check passes.
    Disabled,
    /// Mean word confidence (0 when no words were found).
    Measured(f64),
    /// The recogniser could not run; the check fails.
    Failed,
}

/// Raw sub-scores of one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub focus_variance: f64,
    pub histogram_spread: f64,
    pub text: TextScore,
}

/// Combined verdict plus the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub verdict: Verdict,
    pub scores: QualityScores,
    pub focus: Verdict,
    pub histogram: Verdict,
    pub text: Verdict,
}

impl QualityVerdict {
    pub fn from_scores(scores: QualityScores, thresholds: &QualityThresholds) -> Self {
        let focus = Verdict::from_pass(scores.focus_variance >= thresholds.min_focus_variance);
        let histogram =
            Verdict::from_pass(scores.histogram_spread > thresholds.min_histogram_spread);
        let text = match scores.text {
            TextScore::Disabled => Verdict::Good,
            TextScore::Measured(avg) => Verdict::from_pass(avg >= thresholds.min_text_confidence),
            TextScore::Failed => Verdict::Bad,
        };

        let all_good = [focus, histogram, text].iter().all(|v| *v == Verdict::Good);
        Self {
            verdict: Verdict::from_pass(all_good),
            scores,
            focus,
            histogram,
            text,
        }
    }

    pub fn is_good(&self) -> bool {
        self.verdict == Verdict::Good
    }

    /// Short description of every failed check, for logs and diagnostics.
    pub fn failed_checks(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.focus == Verdict::Bad {
            out.push(format!("blurry (focus {:.1})", self.scores.focus_variance));
        }
        if self.histogram == Verdict::Bad {
            out.push(format!(
                "low contrast (histogram spread {:.3})",
                self.scores.histogram_spread
            ));
        }
        if self.text == Verdict::Bad {
            match self.scores.text {
                TextScore::Measured(avg) => {
                    out.push(format!("illegible text (confidence {:.1})", avg))
                }
                _ => out.push("text recognition failed".to_string()),
            }
        }
        out
    }
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
///
/// Returns 0 for images smaller than 3x3.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let px = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let response =
                px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += response;
            sum_sq += response * response;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    (sum_sq / count as f64 - mean * mean).max(0.0)
}

/// Coefficient of variation of the 256-bin histogram normalised by its peak.
///
/// A flat histogram (every level equally common) scores 0; a page made of a
/// few dominant levels, like ink on paper, scores high.
pub fn histogram_spread(img: &GrayImage) -> f64 {
    let mut bins = [0u64; 256];
    for p in img.pixels() {
        bins[p.0[0] as usize] += 1;
    }

    let peak = bins.iter().copied().max().unwrap_or(0);
    if peak == 0 {
        return 0.0;
    }

    let normalised: Vec<f64> = bins.iter().map(|&c| c as f64 / peak as f64).collect();
    let n = normalised.len() as f64;
    let mean = normalised.iter().sum::<f64>() / n;
    let variance = normalised.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

/// Applies the three checks to rendered pages.
pub struct QualityAssessor {
    thresholds: QualityThresholds,
    recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl QualityAssessor {
    /// `recognizer = None` disables the text-confidence check.
    pub fn new(thresholds: QualityThresholds, recognizer: Option<Arc<dyn TextRecognizer>>) -> Self {
        Self {
            thresholds,
            recognizer,
        }
    }

    /// Score one page. Blocking: runs OCR when a recogniser is configured.
    pub fn assess(&self, page: &PageImage) -> QualityVerdict {
        let gray = page.image.to_luma8();
        let focus_variance = laplacian_variance(&gray);
        let histogram_spread = histogram_spread(&gray);

        let text = match &self.recognizer {
            None => TextScore::Disabled,
            Some(recognizer) => match recognizer.token_confidences(&page.image) {
                Ok(confidences) => TextScore::Measured(mean_confidence(&confidences)),
                Err(e) => {
                    warn!("Text recognition failed on page {}: {}", page.index + 1, e);
                    TextScore::Failed
                }
            },
        };

        let verdict = QualityVerdict::from_scores(
            QualityScores {
                focus_variance,
                histogram_spread,
                text,
            },
            &self.thresholds,
        );
        debug!(
            page = page.index + 1,
            focus = focus_variance,
            spread = histogram_spread,
            verdict = ?verdict.verdict,
            "Assessed page quality"
        );
        verdict
    }
}
