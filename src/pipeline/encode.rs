//! Image encoding: `DynamicImage` → base64 JPEG ready for the request body.
//!
//! Classification needs layout and headings, not pixel-exact glyphs, so pages
//! are sent as lossy JPEG (quality 75 by default). That keeps a four-page
//! request well under the API's payload limits.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::{debug, warn};

use crate::pipeline::render::PageImage;

/// Upper bound on images in one request, whatever the caller passes in.
pub const MAX_PAYLOAD_IMAGES: usize = 4;

pub const JPEG_MIME: &str = "image/jpeg";

/// One page, encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub page_index: usize,
    pub mime_type: String,
    /// Base64 (standard alphabet, padded).
    pub data: String,
}

impl EncodedImage {
    /// Convert to the `edgequake-llm` attachment type.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data.clone(), self.mime_type.clone())
    }
}

/// Ordered images for one classification request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedPayload {
    images: Vec<EncodedImage>,
}

impl EncodedPayload {
    /// Drop failed entries, keep order, cap at [`MAX_PAYLOAD_IMAGES`].
    pub fn from_entries(entries: Vec<Option<EncodedImage>>) -> Self {
        let images: Vec<EncodedImage> = entries
            .into_iter()
            .flatten()
            .take(MAX_PAYLOAD_IMAGES)
            .collect();
        Self { images }
    }

    pub fn images(&self) -> &[EncodedImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Encode one image as base64 JPEG. Alpha is dropped first.
pub fn encode_image(img: &DynamicImage, quality: u8) -> Result<String, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        rgb.width(),
        rgb.height(),
        b64.len()
    );
    Ok(b64)
}

/// Encode each page; a failure yields `None` for that page only.
pub fn encode_pages(pages: &[PageImage], quality: u8) -> Vec<Option<EncodedImage>> {
    pages
        .iter()
        .map(|page| match encode_image(&page.image, quality) {
            Ok(data) => Some(EncodedImage {
                page_index: page.index,
                mime_type: JPEG_MIME.to_string(),
                data,
            }),
            Err(e) => {
                warn!("Failed to encode page {}: {}", page.index + 1, e);
                None
            }
        })
        .collect()
}

/// Encode pages into a request payload.
pub fn encode(pages: &[PageImage], quality: u8) -> EncodedPayload {
    EncodedPayload::from_entries(encode_pages(pages, quality))
}
