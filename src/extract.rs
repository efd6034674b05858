//! Document pipeline: walk every page in order and assemble the result.
//!
//! Pages are processed strictly one after another. Each page is rendered,
//! encoded, and driven through the retry state machine to a terminal state
//! before the next one starts, with a fixed pause between pages to stay
//! under the service's rate limit. Page-level failures become error entries;
//! only a document that cannot be opened ends the run early, and even then
//! the caller receives a [`ResultDocument`].

use crate::config::ExtractionConfig;
use crate::error::{PageError, ScribeError};
use crate::output::{DocumentAssembler, DocumentJob, PageResult, ResultDocument};
use crate::pipeline::client::{HttpInferenceClient, InferenceClient};
use crate::pipeline::encode::{self, EncodedPage};
use crate::pipeline::input;
use crate::pipeline::provider::ProviderClient;
use crate::pipeline::render::{PageSource, PdfiumRasterizer};
use crate::pipeline::retry::{self, RetryPolicy, WaitReason};
use crate::progress::{ExtractionProgressCallback, NoopProgressCallback};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Runs extraction with one configuration and one inference client.
///
/// An `Extractor` holds no per-run state, so it can be reused for many
/// documents; each run builds its own [`ResultDocument`].
pub struct Extractor {
    config: ExtractionConfig,
    client: Arc<dyn InferenceClient>,
}

impl Extractor {
    /// Build an extractor, choosing the inference client from `config`.
    ///
    /// A configured `provider`/`provider_name` routes requests through
    /// `edgequake-llm`; otherwise they go straight to `config.endpoint`.
    pub fn new(config: ExtractionConfig) -> Result<Self, ScribeError> {
        let client: Arc<dyn InferenceClient> = if config.uses_provider() {
            Arc::new(ProviderClient::from_config(&config)?)
        } else {
            Arc::new(HttpInferenceClient::new(&config)?)
        };
        Ok(Self { config, client })
    }

    /// Build an extractor around an existing client.
    pub fn with_client(config: ExtractionConfig, client: Arc<dyn InferenceClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Open the PDF at `path` and extract every page.
    ///
    /// `filename` is the display name reported in the result; it defaults to
    /// the path's final component.
    pub async fn extract_file(&self, path: impl AsRef<Path>, filename: Option<&str>) -> ResultDocument {
        let path = path.as_ref();
        let filename = filename
            .map(str::to_string)
            .unwrap_or_else(|| input::display_filename(path));
        self.open_and_run(path, &path.display().to_string(), &filename)
            .await
    }

    /// Extract a PDF held in memory.
    ///
    /// The bytes are written to a managed [`tempfile`] that is removed when
    /// the run finishes.
    pub async fn extract_bytes(&self, bytes: &[u8], filename: &str) -> ResultDocument {
        let mut tmp = match tempfile::NamedTempFile::new() {
            Ok(t) => t,
            Err(e) => return fatal(filename, ScribeError::Internal(format!("tempfile: {e}"))),
        };
        if let Err(e) = tmp.write_all(bytes) {
            return fatal(filename, ScribeError::Internal(format!("tempfile write: {e}")));
        }
        self.open_and_run(tmp.path(), "<memory>", filename).await
    }

    /// Extract a PDF and write the JSON result to `output_path`.
    ///
    /// Uses an atomic write (temp file + rename). The document is returned
    /// whether or not the run succeeded; `Err` means only that the file could
    /// not be written.
    pub async fn extract_to_file(
        &self,
        path: impl AsRef<Path>,
        filename: Option<&str>,
        output_path: impl AsRef<Path>,
    ) -> Result<ResultDocument, ScribeError> {
        let doc = self.extract_file(path, filename).await;
        write_json_atomic(&doc, output_path.as_ref()).await?;
        Ok(doc)
    }

    /// Extract every page of an already-open `source`.
    pub async fn extract_source(
        &self,
        source: &dyn PageSource,
        source_id: &str,
        filename: &str,
    ) -> ResultDocument {
        let job = DocumentJob::new(source_id, filename, source.page_count(), &self.config.model);
        self.run(job, source).await
    }

    async fn open_and_run(&self, path: &Path, source_id: &str, filename: &str) -> ResultDocument {
        info!("Opening PDF: {} ({})", filename, source_id);
        match PdfiumRasterizer::open(path, self.config.password.as_deref()).await {
            Ok(source) => self.extract_source(&source, source_id, filename).await,
            Err(e) => fatal(filename, e),
        }
    }

    async fn run(&self, job: DocumentJob, source: &dyn PageSource) -> ResultDocument {
        let total = job.total_pages;
        let policy = RetryPolicy::from_config(&self.config);
        let noop = NoopProgressCallback;
        let progress: &dyn ExtractionProgressCallback = match self.config.progress_callback {
            Some(ref cb) => cb.as_ref(),
            None => &noop,
        };

        info!(
            "Starting extraction of '{}': {} pages, model {}",
            job.filename, total, job.model
        );
        progress.on_document_start(total);

        let mut assembler = DocumentAssembler::new(job);

        for index in 0..total {
            let page_num = index + 1;
            info!("Processing page {}/{}", page_num, total);
            progress.on_page_start(page_num, total);

            let outcome = match self.prepare_page(source, index).await {
                Ok(encoded) => {
                    retry::extract_page(self.client.as_ref(), &encoded, &policy, progress).await
                }
                Err(e) => Err(e),
            };

            let result = match outcome {
                Ok(text) => {
                    let page = PageResult::succeeded(page_num, text);
                    info!("Page {}: extracted {} characters", page_num, page.characters);
                    progress.on_page_complete(page_num, total, page.characters);
                    page
                }
                Err(e) => {
                    warn!("Page {}: failed: {}", page_num, e);
                    progress.on_page_error(page_num, total, &e.to_string());
                    PageResult::failed(&e)
                }
            };
            assembler.push(result);

            if page_num < total {
                let delay = self.config.page_delay();
                debug!("Waiting {}s before page {}", delay.as_secs(), page_num + 1);
                progress.on_wait(page_num + 1, WaitReason::PagePacing, delay);
                sleep(delay).await;
            }
        }

        let stats = assembler.stats();
        info!(
            "Extraction complete: {} succeeded, {} failed, {} characters",
            stats.successful_pages, stats.failed_pages, stats.total_characters
        );
        progress.on_document_complete(total, stats.successful_pages);

        assembler.finish()
    }

    /// Render and encode one page. Failures here are not retried.
    async fn prepare_page(
        &self,
        source: &dyn PageSource,
        index: usize,
    ) -> Result<EncodedPage, PageError> {
        let image = source.render(index, self.config.scale).await?;
        encode::encode_page(index + 1, &image)
    }
}

/// Extract the PDF at `path` with `config`.
///
/// Never fails: configuration errors and unopenable documents produce the
/// degraded [`ResultDocument::Failed`] form.
pub async fn extract(
    path: impl AsRef<Path>,
    filename: Option<&str>,
    config: &ExtractionConfig,
) -> ResultDocument {
    let path = path.as_ref();
    match Extractor::new(config.clone()) {
        Ok(extractor) => extractor.extract_file(path, filename).await,
        Err(e) => {
            let filename = filename
                .map(str::to_string)
                .unwrap_or_else(|| input::display_filename(path));
            fatal(&filename, e)
        }
    }
}

/// Synchronous wrapper around [`Extractor::extract_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    path: impl AsRef<Path>,
    filename: Option<&str>,
    config: ExtractionConfig,
) -> Result<ResultDocument, ScribeError> {
    let extractor = Extractor::new(config)?;
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| ScribeError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
    Ok(runtime.block_on(extractor.extract_file(path, filename)))
}

/// Write `doc` as pretty JSON to `path` via a temp file and rename.
pub async fn write_json_atomic(doc: &ResultDocument, path: &Path) -> Result<(), ScribeError> {
    let write_err = |source: std::io::Error| ScribeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = doc
        .to_json_pretty()
        .map_err(|e| ScribeError::Internal(format!("Failed to serialise result: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

fn fatal(filename: &str, err: ScribeError) -> ResultDocument {
    error!("PDF processing failed for '{}': {}", filename, err);
    ResultDocument::failed(filename, format!("PDF processing failed: {}", err))
}
