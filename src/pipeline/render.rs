//! PDF rasterisation: render every page of a decrypted statement via pdfium.
//!
//! Pages are rendered at twice their native size. Statement tables use small
//! print; at 1× the model misreads digits in the amount columns, at 2× a
//! letter-size page comes out around 1224 × 1584 px, which is legible and
//! still well inside provider image limits.
//!
//! The `Pdfium` handle is `!Send`, so it is bound per document on the worker
//! thread. The OS caches the `dlopen`, which makes repeat binds cheap.

use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Resolution multiplier applied to both page dimensions.
pub const RENDER_SCALE: f32 = 2.0;

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rendered pages of one document, in page order.
///
/// Single-pass: images are handed out by value and cannot be replayed.
#[derive(Debug)]
pub struct PageImages {
    inner: std::vec::IntoIter<DynamicImage>,
}

impl PageImages {
    pub fn from_images(images: Vec<DynamicImage>) -> Self {
        Self {
            inner: images.into_iter(),
        }
    }
}

impl Iterator for PageImages {
    type Item = DynamicImage;

    fn next(&mut self) -> Option<DynamicImage> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for PageImages {}

/// Bind the pdfium library.
///
/// Discovery order:
/// 1. `PDFIUM_LIB_PATH` (explicit path to the library file)
/// 2. Alongside the running executable
/// 3. System library search paths
pub fn load_pdfium() -> Result<Pdfium, String> {
    if let Ok(path) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        debug!(path = %path, "Loading pdfium from {}", PDFIUM_LIB_PATH_ENV);
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| format!("cannot load pdfium from {path}: {e}"))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %dir.display(), "Loaded pdfium beside the executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| format!("pdfium library not found: {e}"))?;
    Ok(Pdfium::new(bindings))
}

/// Render every page of `pdf_path` at [`RENDER_SCALE`].
///
/// Any page failing to render fails the whole document: a statement with a
/// missing page would silently lose transactions.
pub fn render_pages(pdfium: &Pdfium, pdf_path: &Path) -> Result<PageImages, PdfiumError> {
    let document = pdfium.load_pdf_from_file(pdf_path, None)?;
    let render_config = PdfRenderConfig::new().scale_page_by_factor(RENDER_SCALE);

    let pages = document.pages();
    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let image = page.render_with_config(&render_config)?.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(PageImages::from_images(images))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn blank(w: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, 4, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn page_images_preserve_order_and_len() {
        let mut pages = PageImages::from_images(vec![blank(1), blank(2), blank(3)]);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages.next().map(|i| i.width()), Some(1));
        assert_eq!(pages.len(), 2);
        let rest: Vec<u32> = pages.map(|i| i.width()).collect();
        assert_eq!(rest, vec![2, 3]);
    }
}
