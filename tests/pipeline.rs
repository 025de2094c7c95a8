//! In-process integration tests for the full invoice pipeline.
//!
//! OCR and the LLM are replaced by scripted doubles, so these run everywhere
//! without pdfium, tesseract or an API key.

use async_trait::async_trait;
use edgequake_invoice2txt::{
    Generation, GenerationError, InvoiceError, InvoicePipeline, ItemError, Message, OutputMode,
    Page, PageTextSource, PipelineConfig, PipelineProgressCallback, TextGenerator, TextSource,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const FAKE_PDF: &[u8] = b"%PDF-1.4\n% scanned batch\n";

// ── Doubles ──────────────────────────────────────────────────────────────────

/// Returns the same page texts for any PDF.
struct StaticPages(Vec<&'static str>);

#[async_trait]
impl PageTextSource for StaticPages {
    async fn extract_pages(&self, _bytes: &[u8], filename: &str) -> Result<Vec<Page>, InvoiceError> {
        Ok(self
            .0
            .iter()
            .enumerate()
            .map(|(i, text)| Page::new(i as u32 + 1, filename, *text))
            .collect())
    }
}

/// Answers each of the three prompt kinds with a fixed response.
struct ScriptedGenerator {
    grouping: String,
    fields: String,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(grouping: &str, fields: &str) -> Arc<Self> {
        Arc::new(Self {
            grouping: grouping.to_string(),
            fields: fields.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_of(&self, kind: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, messages: &[Message]) -> Result<Generation, GenerationError> {
        let all: String = messages.iter().map(|m| m.content.as_str()).collect();
        let (kind, text) = if all.contains("document analysis assistant") {
            ("group", self.grouping.clone())
        } else if all.contains("extracting data from invoices") {
            ("extract", self.fields.clone())
        } else {
            ("elaborate", format!("This page shows: {}", all.len()))
        };
        self.calls.lock().unwrap().push(kind.to_string());
        Ok(Generation {
            text,
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

fn config(dir: &Path, mode: OutputMode) -> PipelineConfig {
    PipelineConfig::builder()
        .output_dir(dir)
        .mode(mode)
        .build()
        .expect("valid config")
}

fn pipeline(
    pages: Vec<&'static str>,
    generator: Arc<ScriptedGenerator>,
    config: PipelineConfig,
) -> InvoicePipeline {
    InvoicePipeline::new(Arc::new(StaticPages(pages)), generator, config)
}

fn read(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap_or_else(|e| panic!("{name}: {e}"))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_page_invoice_becomes_one_field_file() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new(
        "```json\n{\"INV-100\": [1, 2]}\n```",
        "```json\n{\"Vendor\": \"ACME GmbH\", \"Invoice_Date\": \"2024-03-01\", \"Total\": 1250.0}\n```",
    );
    let p = pipeline(
        vec!["INVOICE INV-100\nACME GmbH", "INV-100 continued\nTotal 1250.00"],
        generator.clone(),
        config(dir.path(), OutputMode::ExtractedFields),
    );

    let output = p.process_pdf(FAKE_PDF, "march.pdf").await.unwrap();

    assert_eq!(output.output_ids(), vec!["INV-100"]);
    assert_eq!(
        read(dir.path(), "INV-100.txt"),
        "Invoice_ID: INV-100\nVendor: ACME GmbH\nInvoice_Date: 2024-03-01\nTotal: 1250.0\n"
    );
    assert_eq!(output.groups.get("INV-100"), Some(&[1, 2][..]));
    assert!(output.skipped.is_empty());

    assert_eq!(generator.calls_of("elaborate"), 2);
    assert_eq!(generator.calls_of("group"), 1);
    assert_eq!(generator.calls_of("extract"), 1);

    let stats = &output.stats;
    assert_eq!(stats.total_pages, 2);
    assert_eq!(stats.elaborated_pages, 2);
    assert_eq!(stats.invoices_grouped, 1);
    assert_eq!(stats.invoices_extracted, 1);
    assert_eq!(stats.files_written, 1);
    assert_eq!(stats.total_input_tokens, 40);
    assert_eq!(stats.total_output_tokens, 20);
}

#[tokio::test]
async fn raw_mode_writes_combined_page_text() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new("{\"INV-1\": [1, 3], \"INV-2\": [2]}", "unused");
    let p = pipeline(
        vec!["INVOICE INV-1", "INVOICE INV-2\nTotal 10", "INV-1 page two"],
        generator.clone(),
        config(dir.path(), OutputMode::RawText),
    );

    let output = p.process_pdf(FAKE_PDF, "batch.pdf").await.unwrap();

    assert_eq!(output.output_ids(), vec!["INV-1", "INV-2"]);
    assert_eq!(
        read(dir.path(), "INV-1.txt"),
        "invoice_number: INV-1\ncontent: |\n  INVOICE INV-1\n  INV-1 page two\n"
    );
    assert_eq!(
        read(dir.path(), "INV-2.txt"),
        "invoice_number: INV-2\ncontent: |\n  INVOICE INV-2\n  Total 10\n"
    );
    assert_eq!(generator.calls_of("extract"), 0);
}

#[tokio::test]
async fn every_grouped_invoice_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new("{\"A\": [1], \"B\": [2]}", "{\"Total\": \"1\"}");
    let p = pipeline(
        vec!["invoice A", "invoice B"],
        generator.clone(),
        config(dir.path(), OutputMode::ExtractedFields),
    );

    let output = p.process_pdf(FAKE_PDF, "two.pdf").await.unwrap();

    assert_eq!(output.output_ids(), vec!["A", "B"]);
    assert_eq!(generator.calls_of("extract"), 2);
    assert!(dir.path().join("A.txt").exists());
    assert!(dir.path().join("B.txt").exists());
}

#[tokio::test]
async fn invoices_follow_grouping_order() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new("{\"INV-9\": [1], \"INV-1\": [2]}", "{}");
    let p = pipeline(
        vec!["INVOICE INV-9", "INVOICE INV-1"],
        generator,
        config(dir.path(), OutputMode::RawText),
    );

    let output = p.process_pdf(FAKE_PDF, "order.pdf").await.unwrap();

    let grouped: Vec<&str> = output.groups.invoice_ids().collect();
    assert_eq!(grouped, vec!["INV-9", "INV-1"]);
    assert_eq!(output.output_ids(), vec!["INV-9", "INV-1"]);
}

#[tokio::test]
async fn out_of_range_pages_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new("{\"A\": [1, 99], \"GHOST\": [42]}", "{}");
    let mut cfg = config(dir.path(), OutputMode::RawText);
    cfg.combine_text = TextSource::Raw;
    let p = pipeline(vec!["only page"], generator, cfg);

    let output = p.process_pdf(FAKE_PDF, "one.pdf").await.unwrap();

    assert_eq!(output.output_ids(), vec!["A"]);
    assert_eq!(output.stats.invoices_grouped, 2);
    assert_eq!(output.stats.invoices_combined, 1);
    assert_eq!(
        read(dir.path(), "A.txt"),
        "invoice_number: A\ncontent: only page\n"
    );
}

#[tokio::test]
async fn malformed_grouping_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new("I found two invoices, INV-1 and INV-2.", "{}");
    let p = pipeline(
        vec!["page"],
        generator.clone(),
        config(dir.path(), OutputMode::ExtractedFields),
    );

    let output = p.process_pdf(FAKE_PDF, "odd.pdf").await.unwrap();

    assert!(output.written.is_empty());
    assert!(output.groups.is_empty());
    assert_eq!(generator.calls_of("extract"), 0);
}

#[tokio::test]
async fn unparsable_fields_skip_the_invoice() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::new("{\"INV-5\": [1]}", "no json here");
    let p = pipeline(
        vec!["INVOICE INV-5"],
        generator,
        config(dir.path(), OutputMode::ExtractedFields),
    );

    let output = p.process_pdf(FAKE_PDF, "bad-fields.pdf").await.unwrap();

    assert!(output.written.is_empty());
    assert!(matches!(
        &output.skipped[..],
        [ItemError::MalformedFields { invoice, .. }] if invoice == "INV-5"
    ));
}

#[tokio::test]
async fn non_pdf_bytes_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec!["page"],
        ScriptedGenerator::new("{}", "{}"),
        config(dir.path(), OutputMode::RawText),
    );
    let err = p.process_pdf(b"GIF89a....", "cat.gif").await.unwrap_err();
    assert!(matches!(err, InvoiceError::NotAPdf { .. }));
}

#[tokio::test]
async fn empty_ocr_result_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(
        vec![],
        ScriptedGenerator::new("{}", "{}"),
        config(dir.path(), OutputMode::RawText),
    );
    let err = p.process_pdf(FAKE_PDF, "empty.pdf").await.unwrap_err();
    assert!(matches!(err, InvoiceError::NoPages { .. }));
}

#[tokio::test]
async fn batch_summary_lists_files_and_ids() {
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("out");
    let first = work.path().join("first.pdf");
    let second = work.path().join("second.pdf");
    std::fs::write(&first, FAKE_PDF).unwrap();
    std::fs::write(&second, FAKE_PDF).unwrap();

    let p = pipeline(
        vec!["INVOICE INV-9"],
        ScriptedGenerator::new("{\"INV-9\": [1]}", "{\"Total\": \"9\"}"),
        config(&out, OutputMode::ExtractedFields),
    );

    let summary = p
        .process_batch([first.to_str().unwrap(), second.to_str().unwrap()])
        .await
        .unwrap();

    assert_eq!(
        summary.message,
        "OCR and invoice mapping completed for all files."
    );
    let files: Vec<&str> = summary.results.iter().map(|r| r.pdf_file.as_str()).collect();
    assert_eq!(files, vec!["first.pdf", "second.pdf"]);
    assert_eq!(summary.results[1].mapped_output_files, vec!["INV-9"]);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["results"][0]["mapped_output_files"][0], "INV-9");
}

#[tokio::test]
async fn batch_stops_at_first_fatal_file() {
    let work = tempfile::tempdir().unwrap();
    let good = work.path().join("good.pdf");
    let broken = work.path().join("broken.pdf");
    std::fs::write(&good, FAKE_PDF).unwrap();
    std::fs::write(&broken, b"not a pdf at all").unwrap();

    let generator = ScriptedGenerator::new("{\"INV-1\": [1]}", "{}");
    let p = pipeline(
        vec!["INVOICE INV-1"],
        generator.clone(),
        config(&work.path().join("out"), OutputMode::RawText),
    );

    let never = work.path().join("never.pdf");
    let err = p
        .process_batch([&good, &broken, &never].map(|path| path.to_string_lossy().into_owned()))
        .await
        .unwrap_err();

    match err {
        InvoiceError::FileFailed { file, source } => {
            assert_eq!(file, "broken.pdf");
            assert!(matches!(*source, InvoiceError::NotAPdf { .. }));
        }
        other => panic!("expected FileFailed, got {other:?}"),
    }
    // Only the good file reached the model.
    assert_eq!(generator.calls_of("group"), 1);
}

#[derive(Default)]
struct EventLog {
    started: AtomicUsize,
    elaborated: AtomicUsize,
    written: Mutex<Vec<String>>,
    completed: AtomicUsize,
}

impl PipelineProgressCallback for EventLog {
    fn on_run_start(&self, _pdf_file: &str, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_elaborated(&self, _page_number: u32, _total_pages: usize) {
        self.elaborated.fetch_add(1, Ordering::SeqCst);
    }
    fn on_invoice_written(&self, _invoice_id: &str, file_name: &str) {
        self.written.lock().unwrap().push(file_name.to_string());
    }
    fn on_run_complete(&self, _pdf_file: &str, _files_written: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_events_follow_the_run() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("edgequake_invoice2txt=debug")
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(EventLog::default());
    let cfg = PipelineConfig::builder()
        .output_dir(dir.path())
        .mode(OutputMode::RawText)
        .elaboration_concurrency(3)
        .progress_callback(log.clone())
        .build()
        .unwrap();
    let p = pipeline(
        vec!["INVOICE X/1", "more", "INVOICE Y"],
        ScriptedGenerator::new("{\"X/1\": [1, 2], \"Y\": [3]}", "{}"),
        cfg,
    );

    p.process_pdf(FAKE_PDF, "events.pdf").await.unwrap();

    assert_eq!(log.started.load(Ordering::SeqCst), 1);
    assert_eq!(log.elaborated.load(Ordering::SeqCst), 3);
    assert_eq!(log.completed.load(Ordering::SeqCst), 1);
    assert_eq!(*log.written.lock().unwrap(), vec!["X_1.txt", "Y.txt"]);
}
