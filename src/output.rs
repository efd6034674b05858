//! Result types: the JSON artifact produced for every extraction run.
//!
//! [`ResultDocument`] is always serialisable, including the degraded
//! [`FailedDocument`] form, so a caller can parse the output of any run.

use crate::error::PageError;
use crate::prompts::page_marker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Metadata fixed when the document is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentJob {
    /// Where the document came from (usually its path).
    pub source: String,
    /// Display filename reported back to the caller.
    pub filename: String,
    /// Number of pages, determined at open time.
    pub total_pages: usize,
    /// Model identifier used for every page.
    pub model: String,
    /// When the run was submitted.
    pub processed_date: DateTime<Utc>,
}

impl DocumentJob {
    pub fn new(
        source: impl Into<String>,
        filename: impl Into<String>,
        total_pages: usize,
        model: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            filename: filename.into(),
            total_pages,
            model: model.into(),
            processed_date: Utc::now(),
        }
    }
}

/// The outcome of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_number: usize,
    /// Transcribed text, or a synthetic failure message when `error` is set.
    pub content: String,
    /// Character count of `content`; always 0 for failed pages.
    pub characters: usize,
    /// Whether this page failed.
    pub error: bool,
    /// Underlying failure detail, present only on failed pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl PageResult {
    /// A page whose text was extracted.
    pub fn succeeded(page_number: usize, text: String) -> Self {
        Self {
            page_number,
            characters: text.chars().count(),
            content: text,
            error: false,
            error_detail: None,
        }
    }

    /// A page that ended in `err`.
    pub fn failed(err: &PageError) -> Self {
        let page_number = err.page();
        let content = match err {
            PageError::Exhausted { attempts, .. } => format!(
                "Page {} OCR failed: no usable response after {} attempts",
                page_number, attempts
            ),
            PageError::RenderFailed { detail, .. } | PageError::EncodeFailed { detail, .. } => {
                format!("Page {} processing error: {}", page_number, detail)
            }
        };
        Self {
            page_number,
            content,
            characters: 0,
            error: true,
            error_detail: Some(err.detail().to_string()),
        }
    }
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Sum of `characters` over successful pages.
    pub total_characters: usize,
    pub successful_pages: usize,
    pub failed_pages: usize,
    /// Wall-clock seconds from the first page to the end of the run.
    pub processing_time: f64,
}

impl RunStatistics {
    /// Fold one page into the counters.
    pub fn record(&mut self, page: &PageResult) {
        if page.error {
            self.failed_pages += 1;
        } else {
            self.successful_pages += 1;
            self.total_characters += page.characters;
        }
    }
}

/// The artifact of a run that got past opening the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedDocument {
    pub success: bool,
    pub document_info: DocumentJob,
    pub pages: Vec<PageResult>,
    /// Every page's content behind its `=== page N ===` marker, trimmed.
    pub full_content: String,
    pub stats: RunStatistics,
}

/// The degraded artifact of a run that could not open the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub success: bool,
    pub error: String,
    pub filename: String,
}

/// Result of one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultDocument {
    Completed(CompletedDocument),
    Failed(FailedDocument),
}

impl ResultDocument {
    /// Build the degraded form for a run-level failure.
    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        ResultDocument::Failed(FailedDocument {
            success: false,
            error: error.into(),
            filename: filename.into(),
        })
    }

    /// The top-level `success` flag.
    pub fn is_success(&self) -> bool {
        match self {
            ResultDocument::Completed(doc) => doc.success,
            ResultDocument::Failed(doc) => doc.success,
        }
    }

    /// Per-page results; empty for the degraded form.
    pub fn pages(&self) -> &[PageResult] {
        match self {
            ResultDocument::Completed(doc) => &doc.pages,
            ResultDocument::Failed(_) => &[],
        }
    }

    /// Run statistics, if the run got past opening the document.
    pub fn stats(&self) -> Option<&RunStatistics> {
        match self {
            ResultDocument::Completed(doc) => Some(&doc.stats),
            ResultDocument::Failed(_) => None,
        }
    }

    /// Pretty-printed JSON of the artifact.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Accumulates page results in order and produces the final [`ResultDocument`].
#[derive(Debug)]
pub struct DocumentAssembler {
    job: DocumentJob,
    pages: Vec<PageResult>,
    full_content: String,
    stats: RunStatistics,
    started: Instant,
}

impl DocumentAssembler {
    pub fn new(job: DocumentJob) -> Self {
        let capacity = job.total_pages;
        Self {
            job,
            pages: Vec::with_capacity(capacity),
            full_content: String::new(),
            stats: RunStatistics::default(),
            started: Instant::now(),
        }
    }

    /// Append the next page. Pages must arrive in ascending order.
    pub fn push(&mut self, page: PageResult) {
        debug_assert_eq!(page.page_number, self.pages.len() + 1);
        self.full_content.push_str("\n\n");
        self.full_content.push_str(&page_marker(page.page_number));
        self.full_content.push('\n');
        self.full_content.push_str(&page.content);
        self.stats.record(&page);
        self.pages.push(page);
    }

    /// Counters so far.
    pub fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn finish(mut self) -> ResultDocument {
        self.stats.processing_time = self.started.elapsed().as_secs_f64();
        ResultDocument::Completed(CompletedDocument {
            success: true,
            document_info: self.job,
            pages: self.pages,
            full_content: self.full_content.trim().to_string(),
            stats: self.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(pages: usize) -> DocumentJob {
        DocumentJob::new("/tmp/a.pdf", "a.pdf", pages, "test-model")
    }

    #[test]
    fn succeeded_counts_chars_not_bytes() {
        let p = PageResult::succeeded(1, "héllo 世界".into());
        assert_eq!(p.characters, 8);
        assert!(!p.error);
        assert!(p.error_detail.is_none());
    }

    #[test]
    fn exhausted_page_has_synthetic_message() {
        let p = PageResult::failed(&PageError::Exhausted {
            page: 2,
            attempts: 3,
            detail: "HTTP 503".into(),
        });
        assert!(p.error);
        assert_eq!(p.characters, 0);
        assert!(p.content.contains("Page 2"));
        assert!(p.content.contains("3 attempts"));
        assert_eq!(p.error_detail.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn render_failure_page_carries_detail_in_content() {
        let p = PageResult::failed(&PageError::RenderFailed {
            page: 5,
            detail: "bad xobject".into(),
        });
        assert_eq!(p.content, "Page 5 processing error: bad xobject");
        assert_eq!(p.page_number, 5);
    }

    #[test]
    fn assembler_builds_full_content_and_stats() {
        let mut asm = DocumentAssembler::new(job(2));
        asm.push(PageResult::succeeded(1, "  alpha".into()));
        asm.push(PageResult::failed(&PageError::Exhausted {
            page: 2,
            attempts: 3,
            detail: "timeout".into(),
        }));
        let doc = asm.finish();

        let ResultDocument::Completed(doc) = doc else {
            panic!("expected completed document");
        };
        assert!(doc.success);
        assert_eq!(
            doc.full_content,
            format!(
                "=== page 1 ===\n  alpha\n\n=== page 2 ===\n{}",
                doc.pages[1].content
            )
        );
        assert_eq!(doc.stats.total_characters, 7);
        assert_eq!(doc.stats.successful_pages, 1);
        assert_eq!(doc.stats.failed_pages, 1);
        assert!(doc.stats.processing_time >= 0.0);
    }

    #[test]
    fn failed_document_json_shape() {
        let doc = ResultDocument::failed("scan.pdf", "PDF processing failed: corrupt");
        let v: serde_json::Value = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["filename"], "scan.pdf");
        assert!(v["error"].as_str().unwrap().contains("corrupt"));
        assert!(v.get("pages").is_none());
        assert!(doc.pages().is_empty());
        assert!(doc.stats().is_none());
    }

    #[test]
    fn completed_document_json_shape() {
        let mut asm = DocumentAssembler::new(job(1));
        asm.push(PageResult::succeeded(1, "text".into()));
        let doc = asm.finish();
        let v: serde_json::Value = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["document_info"]["filename"], "a.pdf");
        assert_eq!(v["document_info"]["total_pages"], 1);
        assert_eq!(v["document_info"]["model"], "test-model");
        assert_eq!(v["pages"][0]["page_number"], 1);
        assert_eq!(v["pages"][0]["error"], false);
        assert!(v["pages"][0].get("error_detail").is_none());
        assert_eq!(v["stats"]["total_characters"], 4);

        let back: ResultDocument = serde_json::from_value(v).unwrap();
        assert_eq!(back, doc);
    }
}
