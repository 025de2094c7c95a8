//! Result types returned by stages and by the orchestration entry points.

use crate::error::ItemError;
use crate::model::InvoiceGroups;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Items a stage produced plus the units it skipped, with reasons.
///
/// Stages never abort on a single bad page or invoice; they record it here
/// and carry on. The caller decides what to do with the skips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport<T> {
    pub items: Vec<T>,
    pub skipped: Vec<ItemError>,
}

impl<T> Default for StageReport<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> StageReport<T> {
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn skip(&mut self, reason: ItemError) {
        self.skipped.push(reason);
    }

    /// Fold a per-item outcome into the report.
    pub fn record(&mut self, outcome: Result<T, ItemError>) {
        match outcome {
            Ok(item) => self.push(item),
            Err(reason) => self.skip(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> FromIterator<Result<T, ItemError>> for StageReport<T> {
    fn from_iter<I: IntoIterator<Item = Result<T, ItemError>>>(iter: I) -> Self {
        let mut report = Self::default();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

/// One output file written for one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenFile {
    /// The invoice identifier as reported by the model.
    pub invoice_id: String,
    /// Full path of the written `.txt` file.
    pub path: PathBuf,
}

impl WrittenFile {
    /// File name without the directory, e.g. `INV-100.txt`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Outcome of one writer call.
pub type WriteReport = StageReport<WrittenFile>;

/// Counters and timings for one processed PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages produced by OCR.
    pub total_pages: usize,
    /// Pages that received an elaboration.
    pub elaborated_pages: usize,
    /// Invoice identifiers returned by the grouper.
    pub invoices_grouped: usize,
    /// Invoices that had at least one resolvable page.
    pub invoices_combined: usize,
    /// Invoices whose fields were extracted (fields mode only).
    pub invoices_extracted: usize,
    /// Files written to disk.
    pub files_written: usize,
    /// Units skipped across all stages.
    pub skipped_items: usize,
    /// Tokens sent to the model across all calls.
    pub total_input_tokens: u64,
    /// Tokens generated by the model across all calls.
    pub total_output_tokens: u64,
    pub ocr_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a single PDF run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Name of the processed PDF.
    pub pdf_file: String,
    /// Files written, in grouping order.
    pub written: Vec<WrittenFile>,
    /// The page grouping the model produced.
    pub groups: InvoiceGroups,
    /// Every unit skipped on the way, in stage order.
    pub skipped: Vec<ItemError>,
    pub stats: RunStats,
}

impl ProcessOutput {
    /// Identifiers of the produced output files (file names without `.txt`).
    pub fn output_ids(&self) -> Vec<String> {
        self.written
            .iter()
            .map(|w| {
                w.path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| w.invoice_id.clone())
            })
            .collect()
    }
}

/// Per-file entry of a batch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub pdf_file: String,
    pub mapped_output_files: Vec<String>,
}

/// Summary of a batch run, one entry per input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub message: String,
    pub results: Vec<FileSummary>,
}

impl BatchSummary {
    pub fn from_outputs(outputs: &[ProcessOutput]) -> Self {
        Self {
            message: "OCR and invoice mapping completed for all files.".to_string(),
            results: outputs
                .iter()
                .map(|o| FileSummary {
                    pdf_file: o.pdf_file.clone(),
                    mapped_output_files: o.output_ids(),
                })
                .collect(),
        }
    }
}
