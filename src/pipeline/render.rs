//! Document rendering: turn a PDF or raster image into at most `max_pages`
//! page images, in page order.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to call from async contexts. [`render_document`]
//! moves the work onto tokio's blocking pool.
//!
//! ## Failure contract
//!
//! Rendering never fails outward. Unsupported formats, corrupt files and an
//! unavailable pdfium library are logged and produce an empty vector, which
//! the orchestrator reads as "nothing to classify".

use crate::config::ClassifierConfig;
use crate::error::RenderError;
use crate::pipeline::input::{check_pdf_magic, detect_input_kind, InputKind};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One rendered page, owned by the current pipeline run.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based page index within the source document.
    pub index: usize,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Rasterises the leading pages of a PDF.
///
/// Implementations must not touch pages at or beyond `max_pages`.
pub trait PdfRasterizer: Send + Sync {
    fn rasterize(
        &self,
        path: &Path,
        max_pages: usize,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, RenderError>;
}

/// Render pages `0..min(total_pages, max_pages)` with `render_page`, in order.
///
/// The first failing page aborts the document: a partially readable PDF is
/// treated like an unreadable one.
pub fn render_leading<F>(
    total_pages: usize,
    max_pages: usize,
    mut render_page: F,
) -> Result<Vec<DynamicImage>, RenderError>
where
    F: FnMut(usize) -> Result<DynamicImage, RenderError>,
{
    let count = total_pages.min(max_pages);
    info!(
        "Document has {} pages, rendering the first {}",
        total_pages, count
    );
    (0..count).map(&mut render_page).collect()
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`PdfRasterizer`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    lib_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind to `libpdfium` in `lib_dir`, or to the system library when `None`.
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }

    fn bind(&self) -> Result<Pdfium, RenderError> {
        let bindings = match &self.lib_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| RenderError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        path: &Path,
        max_pages: usize,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, RenderError> {
        let pdfium = self.bind()?;

        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| RenderError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        let pages = document.pages();
        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        render_leading(pages.len() as usize, max_pages, |idx| {
            let page = pages
                .get(idx as u16)
                .map_err(|e| RenderError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                RenderError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            Ok(image)
        })
    }
}

// ── Renderer ─────────────────────────────────────────────────────────────

/// The document renderer used by the orchestrator.
pub struct PageRenderer {
    rasterizer: Arc<dyn PdfRasterizer>,
    max_rendered_pixels: u32,
    staging_dir: Option<PathBuf>,
}

impl PageRenderer {
    /// Renderer using pdfium, configured from `config`.
    pub fn new(config: &ClassifierConfig) -> Self {
        Self::with_rasterizer(
            Arc::new(PdfiumRasterizer::new(config.pdfium_lib_dir.clone())),
            config,
        )
    }

    /// Renderer with a custom PDF backend.
    pub fn with_rasterizer(rasterizer: Arc<dyn PdfRasterizer>, config: &ClassifierConfig) -> Self {
        Self {
            rasterizer,
            max_rendered_pixels: config.max_rendered_pixels,
            staging_dir: config.staging_dir.clone(),
        }
    }

    /// Render up to `max_pages` pages of `path`. Blocking.
    ///
    /// Returns an empty vector for unsupported or unreadable input.
    pub fn render(&self, path: &Path, max_pages: usize) -> Vec<PageImage> {
        let images = match self.try_render(path, max_pages) {
            Ok(images) => images,
            Err(e) => {
                warn!("Failed to render '{}': {}", path.display(), e);
                return Vec::new();
            }
        };

        let pages: Vec<PageImage> = images
            .into_iter()
            .take(max_pages)
            .enumerate()
            .map(|(index, image)| PageImage { index, image })
            .collect();

        if let Some(dir) = &self.staging_dir {
            stage_pages(dir, path, &pages);
        }
        pages
    }

    fn try_render(&self, path: &Path, max_pages: usize) -> Result<Vec<DynamicImage>, RenderError> {
        match detect_input_kind(path) {
            InputKind::Pdf => {
                check_pdf_magic(path)?;
                self.rasterizer
                    .rasterize(path, max_pages, self.max_rendered_pixels)
            }
            InputKind::Raster(_) => {
                let image = image::open(path).map_err(|source| RenderError::Decode {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(vec![self.cap_size(image)])
            }
            InputKind::Unsupported => {
                warn!("Unsupported file type for classification: {}", path.display());
                Ok(Vec::new())
            }
        }
    }

    /// Downscale oversized photos so they match PDF renders.
    fn cap_size(&self, image: DynamicImage) -> DynamicImage {
        let max = self.max_rendered_pixels;
        if image.width() <= max && image.height() <= max {
            return image;
        }
        debug!(
            "Downscaling {}x{} image to fit {} px",
            image.width(),
            image.height(),
            max
        );
        image.resize(max, max, image::imageops::FilterType::Triangle)
    }
}

/// Render on the blocking pool.
pub async fn render_document(
    renderer: Arc<PageRenderer>,
    path: PathBuf,
    max_pages: usize,
) -> Vec<PageImage> {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || renderer.render(&path, max_pages)).await {
        Ok(pages) => pages,
        Err(e) => {
            warn!("Render task for '{}' panicked: {}", shown, e);
            Vec::new()
        }
    }
}

/// Write audit copies of rendered pages. Failures are logged only.
fn stage_pages(staging_dir: &Path, source: &Path, pages: &[PageImage]) {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let dir = staging_dir.join(&stem);

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Cannot create staging directory '{}': {}", dir.display(), e);
        return;
    }

    for page in pages {
        let target = dir.join(format!("{}_page_{}.jpeg", stem, page.index + 1));
        if let Err(e) = page
            .image
            .to_rgb8()
            .save_with_format(&target, image::ImageFormat::Jpeg)
        {
            warn!("Failed to stage '{}': {}", target.display(), e);
        }
    }
}
