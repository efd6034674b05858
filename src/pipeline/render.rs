//! Page rasterisation: the [`PageSource`] seam and its pdfium implementation.
//!
//! pdfium is not async-safe, so every call runs on
//! `tokio::task::spawn_blocking`. A `PdfDocument` borrows its `Pdfium`
//! instance and cannot cross the blocking-task boundary, so
//! [`PdfiumRasterizer`] keeps only the path and reopens the file for each
//! page. Pages are rendered one at a time, so the reopen cost is paid once
//! per inference call at most.

use crate::error::{PageError, ScribeError};
use crate::pipeline::input;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable pointing at an existing pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// A document whose pages can be rendered to images.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Total number of pages, fixed when the source was opened.
    fn page_count(&self) -> usize;

    /// Render the page at zero-based `index`, scaling both axes by `scale`.
    async fn render(&self, index: usize, scale: f32) -> Result<DynamicImage, PageError>;
}

/// [`PageSource`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    path: PathBuf,
    password: Option<String>,
    page_count: usize,
}

impl PdfiumRasterizer {
    /// Validate and open the PDF at `path`, reading its page count.
    ///
    /// Every failure here is run-level: the document cannot be processed.
    pub async fn open(path: impl AsRef<Path>, password: Option<&str>) -> Result<Self, ScribeError> {
        let path = input::resolve_local(path)?;
        let pwd = password.map(str::to_string);

        let page_count = {
            let path = path.clone();
            let pwd = pwd.clone();
            tokio::task::spawn_blocking(move || count_pages_blocking(&path, pwd.as_deref()))
                .await
                .map_err(|e| ScribeError::Internal(format!("Open task panicked: {}", e)))??
        };
        info!("PDF loaded: {} ({} pages)", path.display(), page_count);

        Ok(Self {
            path,
            password: pwd,
            page_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PageSource for PdfiumRasterizer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    async fn render(&self, index: usize, scale: f32) -> Result<DynamicImage, PageError> {
        let path = self.path.clone();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || {
            render_page_blocking(&path, password.as_deref(), index, scale)
        })
        .await
        .map_err(|e| PageError::RenderFailed {
            page: index + 1,
            detail: format!("render task panicked: {}", e),
        })?
    }
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the working directory, then the system library.
fn bind_pdfium() -> Result<Pdfium, ScribeError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(lib) if !lib.is_empty() => Pdfium::bind_to_library(&lib),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ScribeError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn load_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> ScribeError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            ScribeError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            ScribeError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        ScribeError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn count_pages_blocking(pdf_path: &Path, password: Option<&str>) -> Result<usize, ScribeError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password, e))?;
    Ok(document.pages().len() as usize)
}

fn render_page_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    index: usize,
    scale: f32,
) -> Result<DynamicImage, PageError> {
    let page_num = index + 1;
    let fail = |detail: String| PageError::RenderFailed {
        page: page_num,
        detail,
    };

    let pdfium = bind_pdfium().map_err(|e| fail(e.to_string()))?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| fail(format!("{:?}", e)))?;

    let page = document
        .pages()
        .get(index as u16)
        .map_err(|e| fail(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| fail(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} at {}x → {}x{} px",
        page_num,
        scale,
        image.width(),
        image.height()
    );

    Ok(image)
}
