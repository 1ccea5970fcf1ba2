//! Text-confidence measurement through an OCR engine.
//!
//! The quality gate only needs one number per page: the mean confidence the
//! recogniser assigns to the words it finds. [`TextRecognizer`] abstracts the
//! engine so tests can inject fixed confidences. [`TesseractCli`] shells out
//! to the `tesseract` binary and reads its TSV report; with the `ocr` feature,
//! [`TesseractLib`] links libtesseract and reads the same report in-process.

use crate::error::RecognizerError;
use image::DynamicImage;
use std::process::Command;
use tracing::debug;

/// Word-level text recogniser.
pub trait TextRecognizer: Send + Sync {
    /// Per-token confidence values in `0..=100` for every recognised word.
    fn token_confidences(&self, image: &DynamicImage) -> Result<Vec<f32>, RecognizerError>;
}

/// Mean of the non-negative token confidences, or `0.0` when there are none.
///
/// Negative values are "no confidence" sentinels (tesseract uses `-1`) and
/// do not count, whichever recogniser produced them.
pub fn mean_confidence(confidences: &[f32]) -> f64 {
    let (sum, count) = confidences
        .iter()
        .filter(|&&c| c >= 0.0)
        .fold((0.0f64, 0usize), |(sum, n), &c| (sum + c as f64, n + 1));
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Extract word confidences from a tesseract TSV report.
///
/// Only level-5 (word) rows with a non-empty word count; the `-1` sentinel
/// tesseract emits for structural rows is skipped.
pub fn parse_tsv_confidences(tsv: &str) -> Vec<f32> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            if cols[11].trim().is_empty() {
                return None;
            }
            let conf: f32 = cols[10].trim().parse().ok()?;
            (conf >= 0.0).then_some(conf)
        })
        .collect()
}

/// Greyscale PNG bytes of `image`, the form both tesseract backends consume.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, RecognizerError> {
    let mut png = Vec::new();
    image
        .to_luma8()
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| RecognizerError::Staging(e.to_string()))?;
    Ok(png)
}

/// [`TextRecognizer`] that runs the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: String,
    languages: String,
}

impl TesseractCli {
    /// `languages` uses tesseract syntax, e.g. `eng+fra+nld`.
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            program: "tesseract".to_string(),
            languages: languages.into(),
        }
    }

    /// Use a specific binary instead of `tesseract` on `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl TextRecognizer for TesseractCli {
    fn token_confidences(&self, image: &DynamicImage) -> Result<Vec<f32>, RecognizerError> {
        let staged = tempfile::Builder::new()
            .prefix("docclass-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| RecognizerError::Staging(e.to_string()))?;

        std::fs::write(staged.path(), encode_png(image)?)
            .map_err(|e| RecognizerError::Staging(e.to_string()))?;

        let output = Command::new(&self.program)
            .arg(staged.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("tsv")
            .output()
            .map_err(|source| RecognizerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RecognizerError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let confidences = parse_tsv_confidences(&String::from_utf8_lossy(&output.stdout));
        debug!("tesseract recognised {} words", confidences.len());
        Ok(confidences)
    }
}

/// [`TextRecognizer`] bound to libtesseract.
#[cfg(feature = "ocr")]
#[derive(Debug, Clone)]
pub struct TesseractLib {
    languages: String,
    tessdata_dir: Option<String>,
}

#[cfg(feature = "ocr")]
impl TesseractLib {
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
            tessdata_dir: None,
        }
    }

    /// Read traineddata from `dir` instead of the library's default location.
    pub fn with_tessdata_dir(mut self, dir: impl Into<String>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }
}

#[cfg(feature = "ocr")]
impl TextRecognizer for TesseractLib {
    fn token_confidences(&self, image: &DynamicImage) -> Result<Vec<f32>, RecognizerError> {
        let png = encode_png(image)?;
        let engine =
            tesseract::Tesseract::new(self.tessdata_dir.as_deref(), Some(self.languages.as_str()))
                .map_err(|e| RecognizerError::Engine(format!("{e:?}")))?;
        let mut engine = engine
            .set_image_from_mem(&png)
            .map_err(|e| RecognizerError::Engine(format!("{e:?}")))?;
        let tsv = engine
            .get_tsv_text(0)
            .map_err(|e| RecognizerError::Engine(format!("{e:?}")))?;

        let confidences = parse_tsv_confidences(&tsv);
        debug!("libtesseract recognised {} words", confidences.len());
        Ok(confidences)
    }
}

/// The recogniser used when the text check is enabled: the linked library
/// with the `ocr` feature, the command-line tool otherwise.
pub fn default_recognizer(languages: &str) -> std::sync::Arc<dyn TextRecognizer> {
    #[cfg(feature = "ocr")]
    {
        std::sync::Arc::new(TesseractLib::new(languages))
    }
    #[cfg(not(feature = "ocr"))]
    {
        std::sync::Arc::new(TesseractCli::new(languages))
    }
}
