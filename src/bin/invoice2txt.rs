//! CLI binary for edgequake-invoice2txt.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints a per-file summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_invoice2txt::{
    BatchSummary, InvoicePipeline, OcrBackend, OutputMode, PipelineConfig,
    PipelineProgressCallback, ProcessOutput, ProgressCallback, TextSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per PDF that advances as pages are
/// elaborated, plus a log line per written invoice.
struct CliProgressCallback {
    bar: ProgressBar,
    page_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("OCR");
        bar.set_message("Reading scanned pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Elaborating");
        self.bar.reset_eta();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, pdf_file: &str, total_pages: usize) {
        self.page_errors.store(0, Ordering::SeqCst);
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{pdf_file}: {total_pages} pages"))
        ));
    }

    fn on_page_elaborated(&self, _page_number: u32, _total_pages: usize) {
        self.bar.inc(1);
    }

    fn on_page_failed(&self, page_number: u32, total_pages: usize, error: &str) {
        self.page_errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_number,
            total_pages,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_grouping_complete(&self, invoice_count: usize) {
        self.bar.set_prefix("Writing");
        self.bar.set_message(format!("{invoice_count} invoices"));
    }

    fn on_invoice_written(&self, invoice_id: &str, file_name: &str) {
        self.bar.println(format!(
            "  {} {:<24} {}",
            green("✓"),
            invoice_id,
            dim(file_name)
        ));
    }

    fn on_run_complete(&self, pdf_file: &str, files_written: usize) {
        let failed = self.page_errors.load(Ordering::SeqCst);
        self.bar.set_position(self.bar.length().unwrap_or(0));
        if failed == 0 {
            self.bar.println(format!(
                "{} {pdf_file}: {} invoice files written",
                green("✔"),
                bold(&files_written.to_string())
            ));
        } else {
            self.bar.println(format!(
                "{} {pdf_file}: {} invoice files written  ({} pages failed)",
                cyan("⚠"),
                bold(&files_written.to_string()),
                red(&failed.to_string())
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One file per invoice in ./output
  invoice2txt scans/march.pdf

  # Several PDFs, custom output directory
  invoice2txt scans/*.pdf --output-dir invoices

  # Raw combined page text instead of extracted fields
  invoice2txt --mode raw scans/march.pdf

  # German scans with a specific tesseract binary
  invoice2txt --lang deu --tesseract-cmd /opt/tesseract/bin/tesseract scan.pdf

  # Let a vision model do the OCR
  invoice2txt --ocr vision --provider openai --model gpt-4.1-mini scan.pdf

  # Download from a URL and print the JSON summary
  invoice2txt --json https://example.com/invoices/batch-07.pdf

OUTPUT:
  One <invoice number>.txt per invoice, as indented "key: value" lines:

    Invoice_ID: INV-100
    Invoice_Date: 2024-03-01
    Total: 1,250.00

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  INVOICE2TXT_*           Every flag, e.g. INVOICE2TXT_OUTPUT_DIR=invoices
  RUST_LOG                Log filter, e.g. RUST_LOG=edgequake_invoice2txt=debug
"#;

/// Split scanned invoice PDFs into one text file per invoice.
#[derive(Parser, Debug)]
#[command(
    name = "invoice2txt",
    version,
    about = "Split scanned invoice PDFs into one text file per invoice using OCR and an LLM",
    long_about = "OCR every page of one or more invoice PDFs, let an LLM work out which pages \
belong to which invoice number, and write one <invoice number>.txt per invoice with the \
extracted fields (or the combined page text). Supports OpenAI, Anthropic, Google Gemini, \
Azure OpenAI, and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs, processed in order.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory receiving one .txt file per invoice.
    #[arg(short, long, env = "INVOICE2TXT_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// What each invoice file contains.
    #[arg(long, env = "INVOICE2TXT_MODE", value_enum, default_value = "fields")]
    mode: ModeArg,

    /// Page text combined per invoice: raw OCR text or the elaboration.
    #[arg(long, env = "INVOICE2TXT_COMBINE_TEXT", value_enum, default_value = "raw")]
    combine_text: CombineArg,

    /// OCR engine.
    #[arg(long, env = "INVOICE2TXT_OCR", value_enum, default_value = "tesseract")]
    ocr: OcrArg,

    /// Tesseract executable name or path.
    #[arg(long, env = "INVOICE2TXT_TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: String,

    /// Tesseract language code(s), e.g. eng or eng+deu.
    #[arg(long, env = "INVOICE2TXT_LANG", default_value = "eng")]
    lang: String,

    /// Rendering DPI before OCR (72–600).
    #[arg(long, env = "INVOICE2TXT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "INVOICE2TXT_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "INVOICE2TXT_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INVOICE2TXT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "INVOICE2TXT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Transport retries per LLM call (0-10).
    #[arg(long, env = "INVOICE2TXT_MAX_RETRIES", default_value_t = 0,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,

    /// Elaboration calls in flight at once.
    #[arg(short, long, env = "INVOICE2TXT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Per-LLM-call timeout in seconds (no timeout when unset).
    #[arg(long, env = "INVOICE2TXT_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "INVOICE2TXT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the batch summary as JSON.
    #[arg(long, env = "INVOICE2TXT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE2TXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE2TXT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Fields,
    Raw,
}

impl From<ModeArg> for OutputMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Fields => OutputMode::ExtractedFields,
            ModeArg::Raw => OutputMode::RawText,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CombineArg {
    Raw,
    Elaborated,
}

impl From<CombineArg> for TextSource {
    fn from(v: CombineArg) -> Self {
        match v {
            CombineArg::Raw => TextSource::Raw,
            CombineArg::Elaborated => TextSource::Elaborated,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Tesseract,
    Vision,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress_cb: Option<(Arc<CliProgressCallback>, ProgressCallback)> = if show_progress {
        let cb = CliProgressCallback::new();
        Some((Arc::clone(&cb), cb as Arc<dyn PipelineProgressCallback>))
    } else {
        None
    };

    let config = build_config(&cli, progress_cb.as_ref().map(|(_, cb)| Arc::clone(cb)))?;
    let pipeline =
        InvoicePipeline::from_config(config).context("Failed to set up the invoice pipeline")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = pipeline.process_all(&cli.inputs).await;
    if let Some((bar, _)) = &progress_cb {
        bar.bar.finish_and_clear();
    }
    let outputs = result.context("Invoice processing failed")?;

    if cli.json {
        let summary = BatchSummary::from_outputs(&outputs);
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        for output in &outputs {
            print_summary(output);
        }
    }

    Ok(())
}

/// One summary block per processed file on stderr.
fn print_summary(output: &ProcessOutput) {
    let stats = &output.stats;
    let ids = output.output_ids();
    eprintln!(
        "{}  {}  →  {}",
        if output.skipped.is_empty() {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&output.pdf_file),
        if ids.is_empty() {
            red("no invoices")
        } else {
            ids.join(", ")
        }
    );
    eprintln!(
        "   {} pages  /  {} invoices  /  {} files  —  {}ms total",
        stats.total_pages, stats.invoices_grouped, stats.files_written, stats.total_duration_ms,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
    for skipped in &output.skipped {
        eprintln!("   {} {}", red("✗"), dim(&skipped.to_string()));
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let ocr = match cli.ocr {
        OcrArg::Tesseract => OcrBackend::Tesseract {
            command: cli.tesseract_cmd.clone(),
            language: cli.lang.clone(),
        },
        OcrArg::Vision => OcrBackend::Vision,
    };

    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .ocr(ocr)
        .output_dir(&cli.output_dir)
        .mode(cli.mode.into())
        .combine_text(cli.combine_text.into())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .elaboration_concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout);

    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
