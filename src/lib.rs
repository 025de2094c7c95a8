//! # edgequake-invoice2txt
//!
//! Turn scanned invoice PDFs into one plain-text file per invoice.
//!
//! A scanned batch often holds several invoices back to back, some spanning
//! more than one page. This crate OCRs every page, asks an LLM to restate
//! each page, lets the model decide which pages belong to which invoice
//! number, and writes one `<invoice number>.txt` per invoice with either the
//! extracted fields or the combined page text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      load a local file or download from URL
//!  ├─ 2. OCR        pdfium rasterisation + tesseract (or a vision model)
//!  ├─ 3. Elaborate  one LLM call per page
//!  ├─ 4. Group      one LLM call: invoice number → page numbers
//!  ├─ 5. Combine    concatenate each invoice's pages
//!  ├─ 6. Extract    one LLM call per invoice for its fields
//!  └─ 7. Write      <output_dir>/<invoice number>.txt
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_invoice2txt::{InvoicePipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::builder().output_dir("invoices").build()?;
//!     let pipeline = InvoicePipeline::from_config(config)?;
//!     let output = pipeline.process_file("scans/march.pdf").await?;
//!     for file in &output.written {
//!         println!("{} → {}", file.invoice_id, file.path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice2txt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-invoice2txt = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrBackend, OutputMode, PipelineConfig, PipelineConfigBuilder};
pub use error::{GenerationError, InvoiceError, ItemError, ResponseError};
pub use model::{
    CombinedInvoiceText, ElaboratedPage, ExtractedInvoice, InvoiceGroups, Page, TextSource,
};
pub use output::{
    BatchSummary, FileSummary, ProcessOutput, RunStats, StageReport, WriteReport, WrittenFile,
};
pub use pipeline::llm::{Generation, LlmTextGenerator, Message, Role, TextGenerator};
pub use pipeline::ocr::{OcrEngine, PageTextSource, RenderedOcr};
pub use pipeline::write::{OutputRecord, OutputWriter};
pub use process::InvoicePipeline;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
