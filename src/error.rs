//! Error types for the edgequake-invoice2txt library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InvoiceError`]: **Fatal**: the run for a file cannot proceed at all
//!   (bad input file, PDF that pdfium cannot open, OCR engine missing, provider
//!   not configured, output directory not writable). Returned as
//!   `Err(InvoiceError)` from the orchestration entry points in
//!   [`crate::process`] and nowhere else.
//!
//! * [`ItemError`]: **Non-fatal**: a single page or invoice was skipped
//!   (LLM call failed, model answered with unusable JSON, record without an
//!   identifier). Collected in [`crate::output::StageReport`] so callers see
//!   exactly which units were dropped and why while every other unit still
//!   makes it to disk.
//!
//! [`GenerationError`] is the error of a single text-generation call. Stages
//! turn it into an [`ItemError`] for the affected unit.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-invoice2txt library.
#[derive(Debug, Error)]
pub enum InvoiceError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── PDF / OCR errors ──────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF '{name}' could not be opened: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: u32, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// The configured OCR engine could not be started at all.
    #[error("OCR engine '{engine}' is unavailable: {detail}")]
    OcrUnavailable { engine: String, detail: String },

    /// OCR finished but produced no pages.
    #[error("No pages were extracted from '{name}'")]
    NoPages { name: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the output directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Batch errors ──────────────────────────────────────────────────────
    /// A file in a batch failed fatally; the batch stops there.
    #[error("Processing '{file}' failed: {source}")]
    FileFailed {
        file: String,
        #[source]
        source: Box<InvoiceError>,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error of a single text-generation call.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The provider returned an error after all transport retries.
    #[error("LLM call failed after {retries} retries: {detail}")]
    Failed { retries: u32, detail: String },

    /// The call exceeded the configured per-call timeout.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The call was made without any prompt message.
    #[error("LLM call made without any prompt message")]
    EmptyPrompt,
}

/// A model response that could not be turned into the expected structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// No JSON value could be decoded from the response.
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    /// JSON decoded, but the top level is not an object.
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// A non-fatal error for a single page, invoice, or output record.
///
/// Stored in [`crate::output::StageReport::skipped`]. The run continues
/// with the remaining units.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// Elaboration call failed for a page.
    #[error("Page {page}: elaboration failed: {detail}")]
    ElaborationFailed { page: u32, detail: String },

    /// The model answered the elaboration prompt with blank text.
    #[error("Page {page}: elaboration returned an empty response")]
    EmptyElaboration { page: u32 },

    /// Field-extraction call failed for an invoice.
    #[error("Invoice '{invoice}': field extraction failed: {detail}")]
    ExtractionFailed { invoice: String, detail: String },

    /// The model's field-extraction answer was not a JSON object.
    #[error("Invoice '{invoice}': model response is not a JSON object: {detail}")]
    MalformedFields { invoice: String, detail: String },

    /// An output record had no usable invoice identifier.
    #[error("Record {index}: missing 'invoice_number' / 'Invoice_ID'")]
    MissingIdentifier { index: usize },

    /// The identifier cannot be turned into a file name.
    #[error("Record {index}: identifier '{invoice}' is not a usable file name")]
    UnusableIdentifier { index: usize, invoice: String },

    /// Writing the output file failed.
    #[error("Invoice '{invoice}': failed to write '{path}': {detail}")]
    WriteFailed {
        invoice: String,
        path: String,
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_failed_names_the_file() {
        let e = InvoiceError::FileFailed {
            file: "scan-0042.pdf".into(),
            source: Box::new(InvoiceError::NoPages {
                name: "scan-0042.pdf".into(),
            }),
        };
        let msg = e.to_string();
        assert!(msg.contains("scan-0042.pdf"), "got: {msg}");
        assert!(msg.contains("No pages"), "got: {msg}");
    }

    #[test]
    fn generation_timeout_display() {
        let e = GenerationError::Timeout { secs: 30 };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn item_error_display_mentions_unit() {
        let e = ItemError::ElaborationFailed {
            page: 3,
            detail: "quota exceeded".into(),
        };
        assert!(e.to_string().contains("Page 3"));
        assert!(e.to_string().contains("quota exceeded"));

        let e = ItemError::MalformedFields {
            invoice: "INV-7".into(),
            detail: "expected value".into(),
        };
        assert!(e.to_string().contains("INV-7"));
    }

    #[test]
    fn item_error_is_serialisable() {
        let e = ItemError::MissingIdentifier { index: 2 };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("MissingIdentifier"));
        let back: ItemError = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, e);
    }
}
