//! CLI binary for pdfscribe.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, prints the JSON result to stdout (or a file), and
//! sends all progress and log output to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfscribe::extract::write_json_atomic;
use pdfscribe::pipeline::input::display_filename;
use pdfscribe::{
    ExtractionConfig, ExtractionProgressCallback, Extractor, ProgressCallback, ResultDocument,
    WaitReason,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a bar on stderr plus one line per page event.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Transcribing");
        self.bar
            .println(bold(&format!("Starting transcription of {total_pages} pages…")));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_attempt(&self, page_num: usize, attempt: u32, max_attempts: u32) {
        self.bar
            .set_message(format!("page {page_num}, attempt {attempt}/{max_attempts}"));
    }

    fn on_wait(&self, page_num: usize, reason: WaitReason, delay: Duration) {
        if reason != WaitReason::PagePacing {
            self.bar.println(format!(
                "  {} Page {:>3}  {}, waiting {}s",
                yellow("…"),
                page_num,
                reason,
                delay.as_secs()
            ));
        }
        self.bar
            .set_message(format!("waiting {}s ({reason})", delay.as_secs()));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, characters: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{characters:>6} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} pages transcribed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages transcribed  ({} failed)",
                yellow("⚠"),
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe to stdout
  pdfscribe scan.pdf

  # Report a different display name and write the JSON to a file
  pdfscribe /tmp/upload-1234 --filename contract.pdf -o contract.json

  # Higher resolution, slower pacing
  pdfscribe --scale 3 --page-delay 5 scan.pdf

  # Route through an edgequake-llm provider instead of the raw endpoint
  pdfscribe --provider openai --model gpt-4.1-mini scan.pdf

OUTPUT:
  A JSON document is always printed, even when the PDF cannot be opened:
    {"success": true, "document_info": {...}, "pages": [...],
     "full_content": "...", "stats": {...}}
    {"success": false, "error": "...", "filename": "..."}
  Progress and logs go to stderr.

ENVIRONMENT VARIABLES:
  PDFSCRIBE_API_KEY       API key for the chat-completions endpoint
  SILICONFLOW_API_KEY     Fallback when PDFSCRIBE_API_KEY is unset
  PDFIUM_LIB_PATH         Path to the pdfium shared library
  RUST_LOG                Override log filtering
"#;

/// Transcribe PDF pages to JSON using a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdfscribe",
    version,
    about = "Transcribe PDF pages to structured JSON using a Vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Display filename reported in the result (defaults to the input's name).
    #[arg(long)]
    filename: Option<String>,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "PDFSCRIBE_OUTPUT")]
    output: Option<PathBuf>,

    /// API key (falls back to PDFSCRIBE_API_KEY, then SILICONFLOW_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// Chat-completions endpoint URL.
    #[arg(long, env = "PDFSCRIBE_ENDPOINT", default_value = pdfscribe::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Vision model identifier.
    #[arg(long, env = "PDFSCRIBE_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider (openai, anthropic, gemini, ollama, ...).
    #[arg(long, env = "PDFSCRIBE_PROVIDER")]
    provider: Option<String>,

    /// Rasterisation scale factor (0.5–6.0).
    #[arg(long, env = "PDFSCRIBE_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Attempts per page before it is recorded as failed.
    #[arg(long, env = "PDFSCRIBE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Seconds to wait after a transient error.
    #[arg(long, env = "PDFSCRIBE_RETRY_DELAY", default_value_t = 5)]
    retry_delay: u64,

    /// Seconds to wait after a request timeout.
    #[arg(long, env = "PDFSCRIBE_TIMEOUT_RETRY_DELAY", default_value_t = 10)]
    timeout_retry_delay: u64,

    /// Seconds to wait after HTTP 429 (minimum 30).
    #[arg(long, env = "PDFSCRIBE_RATE_LIMIT_BACKOFF", default_value_t = 30)]
    rate_limit_backoff: u64,

    /// Consecutive 429s that count as one failed attempt.
    #[arg(long, env = "PDFSCRIBE_MAX_RATE_LIMITS", default_value_t = 3)]
    max_rate_limits: u32,

    /// Seconds to pause between pages.
    #[arg(long, env = "PDFSCRIBE_PAGE_DELAY", default_value_t = 3)]
    page_delay: u64,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PDFSCRIBE_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Max output tokens per page.
    #[arg(long, env = "PDFSCRIBE_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDFSCRIBE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFSCRIBE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to a text file containing a custom instruction prompt.
    #[arg(long)]
    prompt: Option<PathBuf>,

    /// Print compact JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDFSCRIBE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all stderr output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let filename = cli
        .filename
        .clone()
        .unwrap_or_else(|| display_filename(&cli.input));

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    // Configuration problems still produce a well-formed result document.
    let result = match build_extractor(&cli, progress).await {
        Ok(extractor) => extractor.extract_file(&cli.input, Some(&filename)).await,
        Err(e) => ResultDocument::failed(&filename, format!("{e:#}")),
    };

    emit(&cli, &result).await?;

    if !cli.quiet && !show_progress {
        if let Some(stats) = result.stats() {
            eprintln!(
                "Transcribed {}/{} pages ({} characters) in {:.1}s",
                stats.successful_pages,
                stats.successful_pages + stats.failed_pages,
                stats.total_characters,
                stats.processing_time
            );
        }
    }

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Write the result to `--output` or stdout.
async fn emit(cli: &Cli, result: &ResultDocument) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let written = emit_to(cli.output.as_deref(), result, cli.compact, &mut handle).await?;
    if let Some(path) = written {
        if !cli.quiet {
            eprintln!("{} {}", dim("→"), bold(&path.display().to_string()));
        }
    }
    Ok(())
}

/// Write `result` to `output`, or to `stdout` when no file is given.
///
/// If the file cannot be written the document still goes to `stdout`
/// before the error is returned. Returns the file path on success.
async fn emit_to<'a>(
    output: Option<&'a Path>,
    result: &ResultDocument,
    compact: bool,
    stdout: &mut impl Write,
) -> Result<Option<&'a Path>> {
    if let Some(path) = output {
        match write_json_atomic(result, path).await {
            Ok(()) => return Ok(Some(path)),
            Err(e) => {
                write_json(result, compact, stdout)?;
                return Err(e).with_context(|| format!("Failed to write {}", path.display()));
            }
        }
    }
    write_json(result, compact, stdout)?;
    Ok(None)
}

fn write_json(result: &ResultDocument, compact: bool, out: &mut impl Write) -> Result<()> {
    let json = if compact {
        serde_json::to_string(result)
    } else {
        serde_json::to_string_pretty(result)
    }
    .context("Failed to serialise result")?;

    out.write_all(json.as_bytes())
        .and_then(|_| out.write_all(b"\n"))
        .context("Failed to write to stdout")?;
    Ok(())
}

/// Map CLI args to an `Extractor`.
async fn build_extractor(cli: &Cli, progress: Option<ProgressCallback>) -> Result<Extractor> {
    let instruction = if let Some(ref path) = cli.prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder()
        .endpoint(&cli.endpoint)
        .scale(cli.scale)
        .max_attempts(cli.max_attempts)
        .retry_delay_secs(cli.retry_delay)
        .timeout_retry_delay_secs(cli.timeout_retry_delay)
        .rate_limit_backoff_secs(cli.rate_limit_backoff)
        .max_consecutive_rate_limits(cli.max_rate_limits)
        .page_delay_secs(cli.page_delay)
        .request_timeout_secs(cli.timeout)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    builder = builder.api_key_from_env();

    if let Some(ref provider) = cli.provider {
        builder = builder
            .provider_name(provider)
            .model(cli.model.as_deref().unwrap_or("gpt-4.1-nano"));
    } else if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(text) = instruction {
        builder = builder.instruction(text);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid configuration")?;
    Extractor::new(config).context("Failed to initialise inference client")
}
