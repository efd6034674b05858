//! End-to-end integration tests for pdfscribe.
//!
//! These tests use real PDF files in `./test_cases/`, need a pdfium library,
//! and make live Vision LLM calls. They are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFSCRIBE_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_open_ -- --nocapture

use pdfscribe::{
    extract, ExtractionConfig, Extractor, PageSource, PdfiumRasterizer, ResultDocument,
    ScribeError,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Live config: few attempts and a short page pause to keep runs quick.
fn live_config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .api_key_from_env()
        .max_attempts(2)
        .page_delay_secs(1)
        .build()
        .expect("PDFSCRIBE_API_KEY or SILICONFLOW_API_KEY must be set")
}

/// Assert the document is complete and internally consistent.
fn assert_document_consistent(doc: &ResultDocument, context: &str) {
    let ResultDocument::Completed(doc) = doc else {
        panic!("[{context}] expected a completed document, got {doc:?}");
    };
    assert!(doc.success, "[{context}] success must be true");
    assert_eq!(
        doc.pages.len(),
        doc.document_info.total_pages,
        "[{context}] one entry per page"
    );
    for (i, page) in doc.pages.iter().enumerate() {
        assert_eq!(page.page_number, i + 1, "[{context}] page order");
        let marker = format!("=== page {} ===", i + 1);
        assert!(
            doc.full_content.contains(&marker),
            "[{context}] full_content missing {marker}"
        );
    }
    assert_eq!(
        doc.stats.successful_pages + doc.stats.failed_pages,
        doc.document_info.total_pages,
        "[{context}] counters must cover every page"
    );
    println!(
        "[{context}] ✓  {}/{} pages, {} chars, {:.1}s",
        doc.stats.successful_pages,
        doc.document_info.total_pages,
        doc.stats.total_characters,
        doc.stats.processing_time
    );
}

// ── Open tests (pdfium, no LLM) ──────────────────────────────────────────────

#[tokio::test]
async fn test_open_irs_form() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));

    let source = PdfiumRasterizer::open(&path, None)
        .await
        .expect("open() should succeed");
    assert_eq!(source.page_count(), 2, "IRS form should have 2 pages");

    let image = source.render(0, 1.0).await.expect("page 1 should render");
    assert!(image.width() > 0 && image.height() > 0);
}

#[tokio::test]
async fn test_open_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let result = PdfiumRasterizer::open("/definitely/not/a/real/file.pdf", None).await;
    assert!(matches!(result, Err(ScribeError::FileNotFound { .. })));
}

#[tokio::test]
async fn test_render_scale_grows_bitmap() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));

    let source = PdfiumRasterizer::open(&path, None).await.expect("open");
    let small = source.render(0, 1.0).await.expect("render at 1x");
    let large = source.render(0, 2.0).await.expect("render at 2x");
    assert!(large.width() > small.width());
}

// ── Transcription tests (need a live endpoint) ──────────────────────────────

/// Transcribe the IRS form and check the text looks like a tax form.
#[tokio::test]
async fn test_extract_irs_form() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));
    let out_path = output_dir().join("irs_form_1040.json");

    let extractor = Extractor::new(live_config()).expect("extractor");
    let doc = extractor
        .extract_to_file(&path, Some("irs_form_1040.pdf"), &out_path)
        .await
        .expect("result should be written");

    assert_document_consistent(&doc, "irs_form");
    let ResultDocument::Completed(ref completed) = doc else {
        unreachable!()
    };
    let lower = completed.full_content.to_lowercase();
    assert!(
        lower.contains("income") || lower.contains("tax") || lower.contains("1040"),
        "IRS form should mention 'income', 'tax', or '1040'"
    );

    let written = std::fs::read_to_string(&out_path).expect("output file");
    let back: ResultDocument = serde_json::from_str(&written).expect("valid JSON");
    assert_eq!(back.pages(), doc.pages());
    println!("[irs_form] Saved to {}", out_path.display());
}

/// A bad key yields error pages, not a failed run.
#[tokio::test]
async fn test_extract_with_bad_key_marks_pages_failed() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));

    let config = ExtractionConfig::builder()
        .api_key("sk-invalid")
        .max_attempts(1)
        .page_delay_secs(0)
        .build()
        .expect("valid config");

    let doc = extract(&path, None, &config).await;
    assert_document_consistent(&doc, "bad_key");
    assert!(doc.pages().iter().all(|p| p.error));
    assert_eq!(doc.stats().map(|s| s.successful_pages), Some(0));
}

/// Non-PDF input produces the degraded document shape.
#[tokio::test]
async fn test_extract_non_pdf_is_degraded() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = dir.path().join("notes.pdf");
    std::fs::write(&fake, b"plain text, not a pdf").expect("write");

    let config = ExtractionConfig::builder()
        .api_key("sk-test")
        .build()
        .expect("valid config");
    let doc = extract(&fake, None, &config).await;
    let json: serde_json::Value =
        serde_json::from_str(&doc.to_json_pretty().expect("json")).expect("parse");
    assert_eq!(json["success"], false);
    assert_eq!(json["filename"], "notes.pdf");
    assert!(json["error"].as_str().unwrap_or("").contains("PDF processing failed"));
}
