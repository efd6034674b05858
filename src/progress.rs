//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks the document. Pages are processed strictly
//! in order, so events for page N always precede events for page N + 1.
//!
//! # Example
//!
//! ```rust
//! use pdfscribe::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, characters: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} chars)", page_num, total_pages, characters);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .api_key("sk-test")
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::retry::WaitReason;
use std::sync::Arc;
use std::time::Duration;

/// Called by the extraction pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the document is opened, before the first page.
    fn on_document_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is rasterised.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called before each inference request for a page.
    ///
    /// `attempt` is 1-indexed. Retries after a rate limit report the same
    /// attempt number again.
    fn on_attempt(&self, page_num: usize, attempt: u32, max_attempts: u32) {
        let _ = (page_num, attempt, max_attempts);
    }

    /// Called before the pipeline sleeps.
    ///
    /// `page_num` is the page that will be attempted after the wait.
    fn on_wait(&self, page_num: usize, reason: WaitReason, delay: Duration) {
        let _ = (page_num, reason, delay);
    }

    /// Called when a page produced text.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, characters: usize) {
        let _ = (page_num, total_pages, characters);
    }

    /// Called when a page ended as an error entry.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has reached a terminal state.
    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
