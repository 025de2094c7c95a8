//! Configuration types for invoice processing.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Every knob lives in one struct so a run can
//! be logged, cloned into concurrent tasks, and reproduced.

use crate::error::InvoiceError;
use crate::model::TextSource;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for processing invoice PDFs.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_invoice2txt::{OutputMode, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .dpi(300)
///     .output_dir("invoices")
///     .mode(OutputMode::RawText)
///     .build()
///     .unwrap();
/// assert_eq!(config.output_dir.to_str(), Some("invoices"));
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rendering DPI used before OCR. Range: 72–600. Default: 300.
    ///
    /// Tesseract is tuned for roughly 300 DPI scans; lower values lose small
    /// print such as VAT numbers and line-item quantities.
    pub dpi: u32,

    /// Cap on either rendered image dimension, in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// OCR engine run on every rendered page. Default: Tesseract, English.
    pub ocr: OcrBackend,

    /// Directory that receives one `.txt` file per invoice. Default: `output`.
    pub output_dir: PathBuf,

    /// Whether to write extracted fields or the raw combined text.
    pub mode: OutputMode,

    /// Which page text the combiner concatenates. Default: raw OCR text.
    pub combine_text: TextSource,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per call. Default: 4096.
    pub max_tokens: usize,

    /// Transport retries per LLM call. Default: 0.
    ///
    /// A page or invoice whose call still fails is skipped, never retried
    /// at the stage level.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Number of elaboration calls in flight at once. Default: 1 (sequential).
    pub elaboration_concurrency: usize,

    /// Per-LLM-call timeout in seconds. Default: None (no timeout).
    pub api_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional receiver for per-page and per-invoice progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            ocr: OcrBackend::default(),
            output_dir: PathBuf::from("output"),
            mode: OutputMode::default(),
            combine_text: TextSource::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            elaboration_concurrency: 1,
            api_timeout_secs: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("ocr", &self.ocr)
            .field("output_dir", &self.output_dir)
            .field("mode", &self.mode)
            .field("combine_text", &self.combine_text)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("elaboration_concurrency", &self.elaboration_concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

/// Upper bound for [`PipelineConfig::max_retries`] set through the builder.
pub const MAX_RETRIES: u32 = 10;

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn ocr(mut self, backend: OcrBackend) -> Self {
        self.config.ocr = backend;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn combine_text(mut self, source: TextSource) -> Self {
        self.config.combine_text = source;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn elaboration_concurrency(mut self, n: usize) -> Self {
        self.config.elaboration_concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, InvoiceError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(InvoiceError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.elaboration_concurrency == 0 {
            return Err(InvoiceError::InvalidConfig(
                "Elaboration concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(InvoiceError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(InvoiceError::InvalidConfig(
                "Output directory must not be empty".into(),
            ));
        }
        if let OcrBackend::Tesseract { command, language } = &c.ocr {
            if command.trim().is_empty() || language.trim().is_empty() {
                return Err(InvoiceError::InvalidConfig(
                    "Tesseract command and language must not be empty".into(),
                ));
            }
        }
        if c.api_timeout_secs == Some(0) {
            return Err(InvoiceError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What the writer puts into each invoice file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// Ask the model for the invoice's fields and write them (default).
    #[default]
    ExtractedFields,
    /// Write `invoice_number` plus the combined page text as `content`.
    RawText,
}

/// OCR engine applied to each rendered page image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcrBackend {
    /// The `tesseract` command-line tool.
    Tesseract {
        /// Executable name or path.
        command: String,
        /// Tesseract language code, e.g. `eng` or `eng+deu`.
        language: String,
    },
    /// A vision-capable LLM transcribes the page image.
    Vision,
}

impl Default for OcrBackend {
    fn default() -> Self {
        OcrBackend::Tesseract {
            command: "tesseract".to_string(),
            language: "eng".to_string(),
        }
    }
}

impl OcrBackend {
    /// Short engine name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OcrBackend::Tesseract { .. } => "tesseract",
            OcrBackend::Vision => "vision",
        }
    }
}
