//! # pdfscribe
//!
//! Transcribe PDF documents page by page with a Vision Language Model.
//!
//! Each page is rasterised, PNG-encoded, and sent to an OpenAI-compatible
//! chat-completions endpoint with a verbatim-transcription instruction. The
//! answers are collected into a single JSON [`ResultDocument`] that reports
//! success per page and for the whole run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Open    validate path, count pages via pdfium
//!  ├─ 2. Render  rasterise page N at the configured scale (spawn_blocking)
//!  ├─ 3. Encode  PNG → base64 data URL
//!  ├─ 4. VLM     one request, retried by a bounded state machine
//!  ├─ 5. Pace    fixed pause before page N + 1
//!  └─ 6. Output  pages + full transcript + statistics as JSON
//! ```
//!
//! Pages are processed strictly in order. Transient failures are retried up
//! to `max_attempts`; HTTP 429 responses wait at least 30 s and do not spend
//! the attempt budget. A page that still fails becomes an error entry and the
//! run continues; only a document that cannot be opened yields
//! `success: false`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfscribe::{ExtractionConfig, Extractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from PDFSCRIBE_API_KEY, falling back to SILICONFLOW_API_KEY
//!     let config = ExtractionConfig::builder().api_key_from_env().build()?;
//!     let extractor = Extractor::new(config)?;
//!     let result = extractor.extract_file("scan.pdf", None).await;
//!     println!("{}", result.to_json_pretty()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfscribe` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{PageError, ScribeError};
pub use extract::{extract, extract_sync, Extractor};
pub use output::{
    CompletedDocument, DocumentJob, FailedDocument, PageResult, ResultDocument, RunStatistics,
};
pub use pipeline::client::{HttpInferenceClient, InferenceClient, InferenceOutcome};
pub use pipeline::encode::EncodedPage;
pub use pipeline::provider::ProviderClient;
pub use pipeline::render::{PageSource, PdfiumRasterizer};
pub use pipeline::retry::{PageState, RetryPolicy, Transition, WaitReason};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
