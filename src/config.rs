//! Configuration types for document classification.
//!
//! All pipeline behaviour is controlled through [`ClassifierConfig`], built
//! via its [`ClassifierConfigBuilder`]. Everything the pipeline needs from the
//! outside world (API key, model, thresholds, staging directory) is passed in
//! here explicitly; the library itself never reads environment variables.
//! The CLI maps `DOCCLASS_*` / `ANTHROPIC_API_KEY` onto the builder.

use crate::error::ClassifierError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Pages rendered per document. Classification only needs the first few
/// pages; later pages are never rasterised.
pub const DEFAULT_MAX_PAGES: usize = 4;

/// Default model for the Anthropic transport.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default Anthropic Messages endpoint.
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Configuration for a [`crate::classify::Classifier`].
///
/// # Example
/// ```rust
/// use docclass::ClassifierConfig;
/// use std::time::Duration;
///
/// let config = ClassifierConfig::builder()
///     .api_key("sk-ant-…")
///     .retry_limit(3)
///     .base_delay(Duration::from_secs(4))
///     .min_text_confidence(10.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.retry.retry_limit, 3);
/// ```
#[derive(Clone)]
pub struct ClassifierConfig {
    /// Maximum number of pages rendered and submitted. Range 1–4. Default: 4.
    pub max_pages: usize,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 1600.
    ///
    /// Caps both the OCR cost of the quality check and the payload size.
    pub max_rendered_pixels: u32,

    /// JPEG quality (1–100) used by the payload encoder. Default: 75.
    pub jpeg_quality: u8,

    /// Retry/backoff policy for the classification call.
    pub retry: RetryPolicy,

    /// Thresholds for the three page-quality sub-checks.
    pub quality: QualityThresholds,

    /// Run the text-recognition sub-check. Default: true.
    ///
    /// When disabled the check is skipped and treated as passing.
    pub ocr_enabled: bool,

    /// Tesseract language string. Default: `eng+fra+nld`.
    ///
    /// The scanned contracts are mostly English, French or Dutch.
    pub ocr_languages: String,

    /// Skip the remote call when every page fails the quality gate. Default: true.
    ///
    /// When false, pages are submitted even if all of them were judged Bad.
    pub short_circuit_poor_quality: bool,

    /// LLM provider name: `anthropic` (direct HTTP) or any name understood by
    /// `edgequake_llm::ProviderFactory`. Default: `anthropic`.
    pub provider_name: String,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// API key for the Anthropic transport.
    pub api_key: Option<String>,

    /// Messages endpoint for the Anthropic transport. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// Maximum tokens in the model reply. Default: 1000.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Classification must be repeatable; any creativity only adds label noise.
    pub temperature: f32,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom system instruction. If None, uses the built-in one.
    pub system_instruction: Option<String>,

    /// Custom classification prompt. If None, uses the built-in template.
    pub prompt: Option<String>,

    /// Directory where rendered pages are staged for audit. Default: None.
    pub staging_dir: Option<PathBuf>,

    /// Directory containing the pdfium shared library. If None, the system
    /// library search path is used.
    pub pdfium_lib_dir: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_rendered_pixels: 1600,
            jpeg_quality: 75,
            retry: RetryPolicy::default(),
            quality: QualityThresholds::default(),
            ocr_enabled: true,
            ocr_languages: "eng+fra+nld".to_string(),
            short_circuit_poor_quality: true,
            provider_name: "anthropic".to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            max_tokens: 1000,
            temperature: 0.0,
            api_timeout_secs: 120,
            system_instruction: None,
            prompt: None,
            staging_dir: None,
            pdfium_lib_dir: None,
        }
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("max_pages", &self.max_pages)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("retry", &self.retry)
            .field("quality", &self.quality)
            .field("ocr_enabled", &self.ocr_enabled)
            .field("ocr_languages", &self.ocr_languages)
            .field("short_circuit_poor_quality", &self.short_circuit_poor_quality)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("staging_dir", &self.staging_dir)
            .finish()
    }
}

impl ClassifierConfig {
    /// Create a new builder for `ClassifierConfig`.
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClassifierConfig`].
#[derive(Debug)]
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl ClassifierConfigBuilder {
    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn retry_limit(mut self, n: u32) -> Self {
        self.config.retry.retry_limit = n;
        self
    }

    pub fn base_delay(mut self, d: Duration) -> Self {
        self.config.retry.base_delay = d;
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.config.retry.max_delay = d;
        self
    }

    pub fn min_focus_variance(mut self, v: f64) -> Self {
        self.config.quality.min_focus_variance = v;
        self
    }

    pub fn min_histogram_spread(mut self, v: f64) -> Self {
        self.config.quality.min_histogram_spread = v;
        self
    }

    pub fn min_text_confidence(mut self, v: f64) -> Self {
        self.config.quality.min_text_confidence = v;
        self
    }

    pub fn ocr_enabled(mut self, v: bool) -> Self {
        self.config.ocr_enabled = v;
        self
    }

    pub fn ocr_languages(mut self, langs: impl Into<String>) -> Self {
        self.config.ocr_languages = langs.into();
        self
    }

    pub fn short_circuit_poor_quality(mut self, v: bool) -> Self {
        self.config.short_circuit_poor_quality = v;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_instruction(mut self, text: impl Into<String>) -> Self {
        self.config.system_instruction = Some(text.into());
        self
    }

    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.config.prompt = Some(text.into());
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn pdfium_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClassifierConfig, ClassifierError> {
        let c = &self.config;
        if c.max_pages == 0 || c.max_pages > DEFAULT_MAX_PAGES {
            return Err(ClassifierError::InvalidConfig(format!(
                "max_pages must be 1–{}, got {}",
                DEFAULT_MAX_PAGES, c.max_pages
            )));
        }
        if c.retry.retry_limit == 0 {
            return Err(ClassifierError::InvalidConfig(
                "retry_limit must be ≥ 1".into(),
            ));
        }
        if c.retry.base_delay > c.retry.max_delay {
            return Err(ClassifierError::InvalidConfig(format!(
                "base_delay ({:?}) exceeds max_delay ({:?})",
                c.retry.base_delay, c.retry.max_delay
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ClassifierError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Policies ─────────────────────────────────────────────────────────────

/// Capped exponential backoff for the classification call.
///
/// `delay(n) = min(max_delay, base_delay * 2^n)` where `n` is the 0-based
/// number of the attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. Default: 5.
    pub retry_limit: u32,
    /// Default: 6 s.
    pub base_delay: Duration,
    /// Default: 60 s.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 5,
            base_delay: Duration::from_secs(6),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        // 2^31 * any non-zero base already saturates; avoid shift overflow.
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Pass thresholds for the page-quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Laplacian variance at or above this is in focus. Default: 100.
    pub min_focus_variance: f64,
    /// Histogram coefficient of variation strictly above this passes. Default: 0.5.
    pub min_histogram_spread: f64,
    /// Mean OCR token confidence (0–100) at or above this passes. Default: 30.
    pub min_text_confidence: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_focus_variance: 100.0,
            min_histogram_spread: 0.5,
            min_text_confidence: 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_matches_documented_sequence() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(6));
        assert_eq!(policy.backoff(1), Duration::from_secs(12));
        assert_eq!(policy.backoff(2), Duration::from_secs(24));
        assert_eq!(policy.backoff(3), Duration::from_secs(48));
        assert_eq!(policy.backoff(5), Duration::from_secs(60));
    }

    #[test]
    fn backoff_is_monotonic_and_capped() {
        let policy = RetryPolicy {
            retry_limit: 5,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
        };
        let delays: Vec<Duration> = (0..64).map(|n| policy.backoff(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(delays[63], policy.max_delay);
    }

    #[test]
    fn builder_rejects_too_many_pages() {
        let err = ClassifierConfig::builder().max_pages(5).build().unwrap_err();
        assert!(err.to_string().contains("max_pages"));
    }

    #[test]
    fn builder_rejects_zero_retry_limit() {
        assert!(ClassifierConfig::builder().retry_limit(0).build().is_err());
    }

    #[test]
    fn builder_rejects_base_above_max() {
        let err = ClassifierConfig::builder()
            .base_delay(Duration::from_secs(90))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("base_delay"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ClassifierConfig::builder()
            .api_key("sk-ant-secret")
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-ant-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn text_confidence_is_tunable() {
        let config = ClassifierConfig::builder()
            .min_text_confidence(10.0)
            .build()
            .unwrap();
        assert_eq!(config.quality.min_text_confidence, 10.0);
        assert_eq!(config.quality.min_focus_variance, 100.0);
    }
}
