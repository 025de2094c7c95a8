//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! Tokio workers keep serving LLM calls while a document renders.
//!
//! ## DPI and the pixel cap
//!
//! Pages are scaled by `dpi / 72` (PDF user space is 72 units per inch), so
//! an A4 page at 300 DPI comes out around 2480 × 3508 px, which is what
//! tesseract expects. `max_rendered_pixels` bounds either edge so an
//! oversized page cannot exhaust memory.

use crate::error::InvoiceError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Rasterise every page of a PDF held in memory.
///
/// # Returns
/// `(page_number, image)` pairs in physical order, page numbers 1-based.
pub async fn render_pages(
    bytes: Vec<u8>,
    name: &str,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<(u32, DynamicImage)>, InvoiceError> {
    let name = name.to_string();
    tokio::task::spawn_blocking(move || render_pages_blocking(&bytes, &name, dpi, max_pixels))
        .await
        .map_err(|e| InvoiceError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    bytes: &[u8],
    name: &str,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<(u32, DynamicImage)>, InvoiceError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| InvoiceError::CorruptPdf {
            name: name.to_string(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    info!("PDF '{}' loaded: {} pages", name, pages.len());

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let page_number = idx as u32 + 1;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            InvoiceError::RasterisationFailed {
                page: page_number,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );
        results.push((page_number, image));
    }

    Ok(results)
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` when set, else a copy in the working
/// directory, else the system library.
fn bind_pdfium() -> Result<Pdfium, InvoiceError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.is_empty() {
            return Pdfium::bind_to_library(PathBuf::from(&path))
                .map(Pdfium::new)
                .map_err(|e| InvoiceError::PdfiumBindingFailed(format!("{path}: {e:?}")));
        }
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| InvoiceError::PdfiumBindingFailed(format!("{e:?}")))
}
