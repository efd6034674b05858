//! Image encoding: `DynamicImage` → base64 PNG ready for a JSON request body.
//!
//! PNG is lossless; text crispness matters more than payload size for
//! transcription accuracy.

use crate::error::PageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// MIME type of every encoded page.
pub const PNG_MIME: &str = "image/png";

/// One rasterised page, PNG-encoded and base64-wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Base64 (standard alphabet) of the PNG bytes.
    pub base64: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl EncodedPage {
    /// The page as a `data:` URL for the `image_url` content part.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(page_num: usize, img: &DynamicImage) -> Result<EncodedPage, PageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PageError::EncodeFailed {
            page: page_num,
            detail: e.to_string(),
        })?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Page {}: encoded {}x{} image → {} bytes base64",
        page_num,
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(EncodedPage {
        page_num,
        base64: b64,
        mime_type: PNG_MIME,
        width: img.width(),
        height: img.height(),
    })
}
