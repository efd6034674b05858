//! Error types for the pdfscribe library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScribeError`]: **Run-level**. The document cannot be processed at
//!   all (missing file, not a PDF, wrong password, no API key). The
//!   [`crate::extract::Extractor`] turns these into the degraded
//!   [`crate::output::ResultDocument::Failed`] form so callers still get a
//!   well-formed artifact.
//!
//! * [`PageError`]: **Page-level**. A single page could not be rendered,
//!   encoded, or transcribed. Recorded on that page's
//!   [`crate::output::PageResult`]; the run continues with the next page.

use std::path::PathBuf;
use thiserror::Error;

/// All run-level errors returned by the pdfscribe library.
#[derive(Debug, Error)]
pub enum ScribeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Inference errors ──────────────────────────────────────────────────
    /// No API credential was configured for the HTTP inference client.
    #[error("No API key configured.\nSet PDFSCRIBE_API_KEY (or SILICONFLOW_API_KEY) or pass --api-key.")]
    MissingApiKey,

    /// The named LLM provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    /// The page could not be rasterised.
    #[error("rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rendered image could not be PNG-encoded.
    #[error("image encoding failed for page {page}: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// Every attempt allowed for the page failed.
    #[error("page {page} failed after {attempts} attempts: {detail}")]
    Exhausted {
        page: usize,
        attempts: u32,
        detail: String,
    },
}

impl PageError {
    /// The 1-indexed page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::Exhausted { page, .. } => *page,
        }
    }

    /// The underlying failure description, without the page prefix.
    pub fn detail(&self) -> &str {
        match self {
            PageError::RenderFailed { detail, .. }
            | PageError::EncodeFailed { detail, .. }
            | PageError::Exhausted { detail, .. } => detail,
        }
    }
}
