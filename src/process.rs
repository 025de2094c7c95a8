//! Orchestration entry points: one PDF in, one `.txt` per invoice out.
//!
//! ```text
//! bytes ─▶ OCR ─▶ elaborate ─▶ group ─▶ combine ─▶ extract* ─▶ write
//!                                                  (*fields mode only)
//! ```
//!
//! Only the entry points in this module return [`InvoiceError`]. Every stage
//! below them is fail-soft: a bad page or invoice is dropped, logged, and
//! reported in [`ProcessOutput::skipped`].

use crate::config::{OutputMode, PipelineConfig};
use crate::error::InvoiceError;
use crate::output::{BatchSummary, ProcessOutput, RunStats};
use crate::pipeline::combine::combine;
use crate::pipeline::elaborate::elaborate;
use crate::pipeline::extract::extract;
use crate::pipeline::group::group;
use crate::pipeline::input::{self, check_pdf_magic};
use crate::pipeline::llm::{LlmTextGenerator, MeteredGenerator, TextGenerator};
use crate::pipeline::ocr::{PageTextSource, RenderedOcr};
use crate::pipeline::write::{OutputRecord, OutputWriter};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// A configured invoice pipeline.
///
/// Holds the page text source, the text generator and the config; both
/// collaborators are injected so tests can run the whole flow in-process.
pub struct InvoicePipeline {
    source: Arc<dyn PageTextSource>,
    generator: Arc<dyn TextGenerator>,
    config: PipelineConfig,
}

impl InvoicePipeline {
    pub fn new(
        source: Arc<dyn PageTextSource>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            generator,
            config,
        }
    }

    /// Production wiring: pdfium + the configured OCR engine, and an LLM
    /// provider resolved from the config or the environment.
    ///
    /// # Errors
    /// [`InvoiceError::ProviderNotConfigured`] when no provider can be found.
    pub fn from_config(config: PipelineConfig) -> Result<Self, InvoiceError> {
        let source = RenderedOcr::from_config(&config)?;
        let generator = LlmTextGenerator::from_config(&config)?;
        Ok(Self::new(Arc::new(source), Arc::new(generator), config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one PDF held in memory.
    ///
    /// # Errors
    /// Fatal only: not a PDF, render/OCR failure, no pages, or an output
    /// directory that cannot be created. Per-page and per-invoice failures
    /// are reported in the returned [`ProcessOutput`].
    pub async fn process_pdf(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ProcessOutput, InvoiceError> {
        let span = info_span!("invoice_run", file = %filename);
        self.run(bytes, filename).instrument(span).await
    }

    async fn run(&self, bytes: &[u8], filename: &str) -> Result<ProcessOutput, InvoiceError> {
        let total_start = Instant::now();
        let config = &self.config;
        let progress = config.progress_callback.as_ref();
        check_pdf_magic(filename, bytes)?;
        info!("Starting invoice run");

        // ── Step 1: OCR ──────────────────────────────────────────────────
        let ocr_start = Instant::now();
        let pages = self
            .source
            .extract_pages(bytes, filename)
            .instrument(info_span!("ocr"))
            .await?;
        let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
        if pages.is_empty() {
            return Err(InvoiceError::NoPages {
                name: filename.to_string(),
            });
        }
        let total_pages = pages.len();
        info!("OCR produced {} pages", total_pages);
        if let Some(cb) = progress {
            cb.on_run_start(filename, total_pages);
        }

        let generator = MeteredGenerator::new(Arc::clone(&self.generator));
        let llm_start = Instant::now();

        // ── Step 2: Elaborate ────────────────────────────────────────────
        let elaborated = elaborate(
            &generator,
            &pages,
            config.elaboration_concurrency,
            progress,
        )
        .instrument(info_span!("elaborate"))
        .await;
        if elaborated.is_empty() {
            warn!("No page could be elaborated");
        }

        // ── Step 3: Group ────────────────────────────────────────────────
        let groups = group(&generator, &elaborated.items)
            .instrument(info_span!("group"))
            .await;
        if let Some(cb) = progress {
            cb.on_grouping_complete(groups.len());
        }

        // ── Step 4: Combine ──────────────────────────────────────────────
        let combined = {
            let _span = info_span!("combine").entered();
            combine(&groups, &elaborated.items, total_pages, config.combine_text)
        };

        // ── Step 5: Extract (fields mode) ────────────────────────────────
        let mut skipped = elaborated.skipped.clone();
        let mut invoices_extracted = 0;
        let records: Vec<OutputRecord> = match config.mode {
            OutputMode::ExtractedFields => {
                let extracted = extract(&generator, &combined)
                    .instrument(info_span!("extract"))
                    .await;
                invoices_extracted = extracted.items.len();
                skipped.extend(extracted.skipped);
                extracted.items.into_iter().map(OutputRecord::from).collect()
            }
            OutputMode::RawText => combined
                .iter()
                .map(|(invoice, text)| OutputRecord::raw(invoice.as_str(), text.as_str()))
                .collect(),
        };
        let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

        // ── Step 6: Write ────────────────────────────────────────────────
        let report = OutputWriter::new(&config.output_dir)
            .write(records)
            .instrument(info_span!("write"))
            .await?;
        if let Some(cb) = progress {
            for file in &report.items {
                cb.on_invoice_written(&file.invoice_id, &file.file_name());
            }
            cb.on_run_complete(filename, report.items.len());
        }
        skipped.extend(report.skipped);

        let stats = RunStats {
            total_pages,
            elaborated_pages: elaborated.items.len(),
            invoices_grouped: groups.len(),
            invoices_combined: combined.len(),
            invoices_extracted,
            files_written: report.items.len(),
            skipped_items: skipped.len(),
            total_input_tokens: generator.input_tokens(),
            total_output_tokens: generator.output_tokens(),
            ocr_duration_ms,
            llm_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Invoice run complete: {} pages, {} invoices, {} files, {} skipped, {}ms",
            stats.total_pages,
            stats.invoices_grouped,
            stats.files_written,
            stats.skipped_items,
            stats.total_duration_ms
        );

        Ok(ProcessOutput {
            pdf_file: filename.to_string(),
            written: report.items,
            groups,
            skipped,
            stats,
        })
    }

    /// Load a local path or HTTP/HTTPS URL, then [`Self::process_pdf`].
    pub async fn process_file(&self, input: impl AsRef<str>) -> Result<ProcessOutput, InvoiceError> {
        let input = input.as_ref();
        let pdf = input::load_input(input, self.config.download_timeout_secs).await?;
        self.process_pdf(&pdf.bytes, &pdf.name).await
    }

    /// Process files in order and return every output.
    ///
    /// The first fatal error stops the batch and comes back as
    /// [`InvoiceError::FileFailed`] naming that file; files already
    /// processed keep their output on disk.
    pub async fn process_all<I, S>(&self, inputs: I) -> Result<Vec<ProcessOutput>, InvoiceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outputs = Vec::new();
        for input in inputs {
            let input = input.as_ref();
            match self.process_file(input).await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    let file = input::input_name(input);
                    error!(file = %file, error = %e, "Batch stopped");
                    return Err(InvoiceError::FileFailed {
                        file,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(outputs)
    }

    /// Process files in order and summarise the produced output identifiers.
    pub async fn process_batch<I, S>(&self, inputs: I) -> Result<BatchSummary, InvoiceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let outputs = self.process_all(inputs).await?;
        Ok(BatchSummary::from_outputs(&outputs))
    }

    /// Blocking wrapper around [`Self::process_file`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn process_file_sync(&self, input: impl AsRef<str>) -> Result<ProcessOutput, InvoiceError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| InvoiceError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.process_file(input))
    }
}
