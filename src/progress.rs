//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a PDF moves through OCR, elaboration, grouping and writing.
//!
//! # Example
//!
//! ```rust
//! use edgequake_invoice2txt::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_invoice_written(&self, invoice_id: &str, file_name: &str) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{invoice_id} → {file_name}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes one PDF.
///
/// Implementations must be `Send + Sync`: with elaboration concurrency above
/// one, the page events arrive from concurrently running futures. All methods
/// default to no-ops so callers only override what they care about.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once OCR has produced the page list.
    fn on_run_start(&self, pdf_file: &str, total_pages: usize) {
        let _ = (pdf_file, total_pages);
    }

    /// Called when a page received its elaboration.
    fn on_page_elaborated(&self, page_number: u32, total_pages: usize) {
        let _ = (page_number, total_pages);
    }

    /// Called when a page was dropped from elaboration.
    fn on_page_failed(&self, page_number: u32, total_pages: usize, error: &str) {
        let _ = (page_number, total_pages, error);
    }

    /// Called after the grouping call, with the number of invoices found.
    fn on_grouping_complete(&self, invoice_count: usize) {
        let _ = invoice_count;
    }

    /// Called after an invoice file was written.
    fn on_invoice_written(&self, invoice_id: &str, file_name: &str) {
        let _ = (invoice_id, file_name);
    }

    /// Called once the run finished writing.
    fn on_run_complete(&self, pdf_file: &str, files_written: usize) {
        let _ = (pdf_file, files_written);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
