//! Page rasterisation behind the [`PageRenderer`] seam.
//!
//! [`PdfiumRenderer`] is the production implementation. pdfium is blocking
//! and CPU-bound, so the extractor calls `render_page` from
//! `tokio::task::spawn_blocking`. Tests substitute a renderer that returns
//! synthetic images and never touches pdfium.
//!
//! The longest edge is capped at `max_rendered_pixels` regardless of DPI so
//! an oversized page cannot produce a 12,000 px image.

use crate::error::{PageError, Pdf2TocError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Renders single pages of one document.
pub trait PageRenderer: Send + Sync {
    /// Total pages in the document.
    fn page_count(&self) -> usize;

    /// Render the 0-indexed page `index`.
    fn render_page(&self, index: usize, dpi: u32, max_pixels: u32) -> Result<DynamicImage, PageError>;
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2TocError> {
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        let lib = Pdfium::pdfium_platform_library_name_at_path(&dir);
        match Pdfium::bind_to_library(&lib) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", lib.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => debug!("pdfium at {} unusable: {:?}", lib.display(), e),
        }
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| Pdf2TocError::PdfiumBindingFailed(format!("{e:?}")))
}

/// pdfium-backed renderer for a file on disk.
///
/// `Pdfium` is not `Send`, so the binding is made on the blocking thread for
/// each call and only the path and page count are kept.
pub struct PdfiumRenderer {
    path: PathBuf,
    page_count: usize,
}

impl PdfiumRenderer {
    /// Bind pdfium and open `path` once to learn its page count.
    pub fn open(path: &Path) -> Result<Self, Pdf2TocError> {
        let pdfium = bind_pdfium()?;
        let page_count = load(&pdfium, path)?.pages().len() as usize;
        info!("PDF loaded: {} pages", page_count);
        Ok(Self {
            path: path.to_path_buf(),
            page_count,
        })
    }
}

fn load<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, Pdf2TocError> {
    pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_ascii_lowercase().contains("password") {
            Pdf2TocError::EncryptedPdf {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2TocError::CorruptPdf {
                path: path.to_path_buf(),
                detail,
            }
        }
    })
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render_page(&self, index: usize, dpi: u32, max_pixels: u32) -> Result<DynamicImage, PageError> {
        let page_num = index + 1;
        let failed = |detail: String| PageError::RenderFailed {
            page: page_num,
            detail,
        };

        let pdfium = bind_pdfium().map_err(|e| failed(e.to_string()))?;
        let document = load(&pdfium, &self.path).map_err(|e| failed(e.to_string()))?;
        let page = document
            .pages()
            .get(index as u16)
            .map_err(|e| failed(format!("{e:?}")))?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("{e:?}")))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
