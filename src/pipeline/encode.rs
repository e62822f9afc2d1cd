//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! PNG keeps digits crisp; JPEG ringing around small print is exactly what
//! turns an `8` into a `3` in an amount column. `detail: "high"` asks
//! tiling providers for the full tile budget so fine print survives.

use crate::error::{truncate_detail, StatementError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode one rasterised page for the multimodal request body.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode every page, in order. One unencodable page fails the document.
pub fn encode_pages(
    file: &str,
    pages: impl IntoIterator<Item = DynamicImage>,
) -> Result<Vec<ImageData>, StatementError> {
    pages
        .into_iter()
        .enumerate()
        .map(|(idx, img)| {
            encode_page(&img).map_err(|e| StatementError::Render {
                file: file.to_string(),
                detail: truncate_detail(&format!("page {}: image encoding failed: {e}", idx + 1)),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image() {
        let data = encode_page(&red(10, 10)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[..4], b"\x89PNG");
    }

    #[test]
    fn encode_pages_keeps_order() {
        let encoded = encode_pages("x.pdf", vec![red(1, 1), red(2, 2)]).unwrap();
        assert_eq!(encoded.len(), 2);
        let second = STANDARD.decode(&encoded[1].data).unwrap();
        let img = image::load_from_memory(&second).unwrap();
        assert_eq!(img.width(), 2);
    }
}
