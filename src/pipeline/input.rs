//! Input kind detection: decide how a document path should be rendered.
//!
//! The decision is extension based, matching how files arrive in deal
//! folders. Anything that is not a PDF, JPEG or PNG is
//! [`InputKind::Unsupported`], which the renderer turns into "no pages"
//! rather than an error.

use crate::error::RenderError;
use std::io::Read;
use std::path::Path;

/// How a document is turned into pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Paginated PDF.
    Pdf,
    /// A single raster image.
    Raster(image::ImageFormat),
    /// Anything else.
    Unsupported,
}

/// Classify a path by its (case-insensitive) extension.
pub fn detect_input_kind(path: &Path) -> InputKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("pdf") => InputKind::Pdf,
        Some("jpg") | Some("jpeg") => InputKind::Raster(image::ImageFormat::Jpeg),
        Some("png") => InputKind::Raster(image::ImageFormat::Png),
        _ => InputKind::Unsupported,
    }
}

/// Whether the batch driver should attempt this file at all.
pub fn is_supported(path: &Path) -> bool {
    detect_input_kind(path) != InputKind::Unsupported
}

/// Verify the PDF magic bytes so pdfium is never handed a mislabelled file.
pub fn check_pdf_magic(path: &Path) -> Result<(), RenderError> {
    let mut f = std::fs::File::open(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(RenderError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_kinds_case_insensitively() {
        assert_eq!(detect_input_kind(Path::new("a/b/scan.PDF")), InputKind::Pdf);
        assert_eq!(
            detect_input_kind(Path::new("scan.jpg")),
            InputKind::Raster(image::ImageFormat::Jpeg)
        );
        assert_eq!(
            detect_input_kind(Path::new("scan.JPEG")),
            InputKind::Raster(image::ImageFormat::Jpeg)
        );
        assert_eq!(
            detect_input_kind(Path::new("scan.png")),
            InputKind::Raster(image::ImageFormat::Png)
        );
        assert_eq!(detect_input_kind(Path::new("notes.txt")), InputKind::Unsupported);
        assert_eq!(detect_input_kind(Path::new("no_extension")), InputKind::Unsupported);
    }

    #[test]
    fn only_pdf_jpeg_png_are_supported() {
        for name in ["a.pdf", "b.JPG", "c.jpeg", "d.png"] {
            assert!(is_supported(Path::new(name)), "{name}");
        }
        for name in ["e.tiff", "f.docx", "g.txt", "h"] {
            assert!(!is_supported(Path::new(name)), "{name}");
        }
    }

    #[test]
    fn rejects_mislabelled_pdf() {
        let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        tmp.write_all(b"GIF89a not a pdf").unwrap();
        let err = check_pdf_magic(tmp.path()).unwrap_err();
        assert!(matches!(err, RenderError::NotAPdf { .. }));
    }

    #[test]
    fn accepts_pdf_header() {
        let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        tmp.write_all(b"%PDF-1.4\n").unwrap();
        assert!(check_pdf_magic(tmp.path()).is_ok());
    }
}
