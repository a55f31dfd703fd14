//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! PNG is lossless; JPEG artefacts around small digits are exactly what turns
//! `$18.00` into `$13.00`. `detail: "high"` lets GPT-4-class models tile the
//! page at full resolution instead of a single 512 px overview.

use crate::error::ReceiptOcrError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the VLM API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode every page, failing on the first page that cannot be encoded.
///
/// A receipt with a missing page would silently drop line items, so there is
/// no partial result here.
pub fn encode_pages(pages: &[DynamicImage]) -> Result<Vec<ImageData>, ReceiptOcrError> {
    pages
        .iter()
        .enumerate()
        .map(|(idx, img)| {
            encode_page(img).map_err(|e| ReceiptOcrError::EncodingFailed {
                page: idx + 1,
                detail: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[..4], b"\x89PNG");
    }

    #[test]
    fn encode_pages_keeps_order_and_count() {
        let pages: Vec<DynamicImage> = (1..=3)
            .map(|w| DynamicImage::ImageRgb8(RgbImage::new(w, 2)))
            .collect();
        let encoded = encode_pages(&pages).unwrap();
        assert_eq!(encoded.len(), 3);
        assert!(encoded.iter().all(|d| d.mime_type == "image/png"));
    }
}
