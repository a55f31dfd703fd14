//! PDF rasterisation: render the first pages of a PDF to `DynamicImage`s.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-aware. [`render_pages`] runs the renderer on Tokio's blocking pool so
//! a slow scan never stalls the worker threads serving other requests.
//!
//! ## Why a trait?
//!
//! [`PageRenderer`] is the seam between the HTTP pipeline and pdfium. The
//! service uses [`PdfiumRenderer`]; tests substitute an in-memory renderer
//! so the handler can be exercised without the native library.

use crate::config::ServiceConfig;
use crate::error::ReceiptOcrError;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Renders the leading pages of an in-memory PDF.
///
/// Implementations are called from a blocking thread and may block freely.
pub trait PageRenderer: Send + Sync {
    /// Render pages `0..min(page_count, max_pages)` in order.
    fn render(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, ReceiptOcrError>;
}

/// Rasterise up to `max_pages` pages on the blocking pool.
///
/// Fails with [`ReceiptOcrError::NoPagesRendered`] when the renderer returns
/// nothing, so every renderer gets the same empty-document behaviour.
pub async fn render_pages(
    renderer: Arc<dyn PageRenderer>,
    pdf: Vec<u8>,
    max_pages: usize,
) -> Result<Vec<DynamicImage>, ReceiptOcrError> {
    let pages = tokio::task::spawn_blocking(move || renderer.render(&pdf, max_pages))
        .await
        .map_err(|e| ReceiptOcrError::Internal(format!("Render task panicked: {}", e)))??;

    if pages.is_empty() {
        return Err(ReceiptOcrError::NoPagesRendered);
    }
    Ok(pages)
}

/// Production renderer backed by the pdfium shared library.
///
/// The library is bound on first use and the handle is shared by every
/// request afterwards.
pub struct PdfiumRenderer {
    lib_path: Option<PathBuf>,
    dpi: u32,
    max_rendered_pixels: u32,
    pdfium: OnceCell<Pdfium>,
}

impl PdfiumRenderer {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            lib_path: config.pdfium_lib_path.clone(),
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            pdfium: OnceCell::new(),
        }
    }

    /// Bind pdfium once to surface a missing library at startup rather than
    /// on the first request.
    pub fn check_binding(&self) -> Result<(), ReceiptOcrError> {
        self.pdfium().map(|_| ())
    }

    fn pdfium(&self) -> Result<&Pdfium, ReceiptOcrError> {
        self.pdfium.get_or_try_init(|| self.bind())
    }

    fn bind(&self) -> Result<Pdfium, ReceiptOcrError> {
        let bindings = match &self.lib_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ReceiptOcrError::PdfiumBindingFailed(format!("{:?}", e)))?;

        match &self.lib_path {
            Some(path) => info!("Bound pdfium from {}", path.display()),
            None => info!("Bound pdfium from the system library path"),
        }
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, ReceiptOcrError> {
        let pdfium = self.pdfium()?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| classify_load_error(format!("{:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        let count = total_pages.min(max_pages);
        info!("PDF loaded: {} pages, rendering {}", total_pages, count);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let mut results = Vec::with_capacity(count);
        for idx in 0..count {
            let page = pages
                .get(idx as u16)
                .map_err(|e| ReceiptOcrError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ReceiptOcrError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            // Flatten to RGB: the model gains nothing from an alpha channel.
            let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            results.push(image);
        }

        Ok(results)
    }
}

/// Map a pdfium load failure onto the request-level error.
fn classify_load_error(detail: String) -> ReceiptOcrError {
    if detail.contains("Password") || detail.contains("password") {
        ReceiptOcrError::PasswordProtected
    } else {
        ReceiptOcrError::CorruptPdf { detail }
    }
}
