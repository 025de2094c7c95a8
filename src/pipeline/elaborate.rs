//! Elaboration: one natural-language restatement per OCR page.
//!
//! The restatement gives the grouping call cleaner input than raw OCR noise.
//! Every page is an independent call; a failed or blank answer drops that
//! page only.

use crate::error::ItemError;
use crate::model::{ElaboratedPage, Page};
use crate::output::StageReport;
use crate::pipeline::llm::{Message, TextGenerator};
use crate::progress::ProgressCallback;
use crate::prompts::elaboration_prompt;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, warn};

/// Elaborate every page, preserving input order.
///
/// `concurrency` is the number of calls in flight; 1 (the default in
/// [`crate::PipelineConfig`]) runs them one after the other. Results are
/// buffered back into page order either way.
pub async fn elaborate(
    generator: &dyn TextGenerator,
    pages: &[Page],
    concurrency: usize,
    progress: Option<&ProgressCallback>,
) -> StageReport<ElaboratedPage> {
    let total = pages.len();

    stream::iter(pages.iter().map(|page| async move {
        let outcome = elaborate_page(generator, page).await;
        if let Some(cb) = progress {
            match &outcome {
                Ok(_) => cb.on_page_elaborated(page.page_number, total),
                Err(e) => cb.on_page_failed(page.page_number, total, &e.to_string()),
            }
        }
        outcome
    }))
    .buffered(concurrency.max(1))
    .collect::<Vec<_>>()
    .await
    .into_iter()
    .collect()
}

async fn elaborate_page(
    generator: &dyn TextGenerator,
    page: &Page,
) -> Result<ElaboratedPage, ItemError> {
    let page_number = page.page_number;
    let messages = [Message::user(elaboration_prompt(page_number, &page.text))];

    match generator.generate(&messages).await {
        Ok(generation) => {
            let text = generation.text.trim();
            if text.is_empty() {
                warn!(page = page_number, "Elaboration returned no text; page skipped");
                return Err(ItemError::EmptyElaboration { page: page_number });
            }
            debug!(page = page_number, chars = text.len(), "Page elaborated");
            Ok(ElaboratedPage::from_page(page, text))
        }
        Err(e) => {
            error!(page = page_number, error = %e, "Elaboration failed; page skipped");
            Err(ItemError::ElaborationFailed {
                page: page_number,
                detail: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::pipeline::llm::testing::{failure, FnGenerator};
    use crate::pipeline::llm::Generation;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    fn pages(n: u32) -> Vec<Page> {
        (1..=n)
            .map(|i| Page::new(i, "scan.pdf", format!("raw text {i}")))
            .collect()
    }

    #[tokio::test]
    async fn preserves_page_identity() {
        let generator = FnGenerator::new(|m| {
            Ok(Generation::text(format!("about: {}", m[0].content.len())))
        });
        let input = pages(3);
        let report = elaborate(&generator, &input, 1, None).await;

        assert_eq!(report.items.len(), 3);
        for (out, page) in report.items.iter().zip(&input) {
            assert_eq!(out.page_number, page.page_number);
            assert_eq!(out.filename, page.filename);
            assert_eq!(out.text, page.text);
            assert!(out.elaborated_text.starts_with("about:"));
        }
    }

    #[tokio::test]
    async fn failed_and_blank_pages_are_skipped() {
        let generator = FnGenerator::new(|m| {
            let prompt = &m[0].content;
            if prompt.contains("raw text 2") {
                Err(failure("quota exceeded"))
            } else if prompt.contains("raw text 3") {
                Ok(Generation::text("   \n"))
            } else {
                Ok(Generation::text("fine"))
            }
        });
        let input = pages(4);
        let report = elaborate(&generator, &input, 1, None).await;

        assert!(report.items.len() <= input.len());
        let numbers: Vec<u32> = report.items.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 4]);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(
            report.skipped[0],
            ItemError::ElaborationFailed { page: 2, .. }
        ));
        assert_eq!(report.skipped[1], ItemError::EmptyElaboration { page: 3 });
    }

    struct SlowFirstPages;

    #[async_trait]
    impl TextGenerator for SlowFirstPages {
        async fn generate(&self, messages: &[Message]) -> Result<Generation, GenerationError> {
            // Earlier pages answer later, so completion order is reversed.
            let delay = if messages[0].content.contains("raw text 1") {
                30
            } else {
                1
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(Generation::text("ok"))
        }
    }

    #[tokio::test]
    async fn concurrent_run_keeps_page_order() {
        let input = pages(5);
        let report = elaborate(&SlowFirstPages, &input, 4, None).await;
        let numbers: Vec<u32> = report.items.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn reports_progress_per_page() {
        use crate::progress::PipelineProgressCallback;
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct Counter {
            ok: AtomicUsize,
            failed: AtomicUsize,
        }
        impl PipelineProgressCallback for Counter {
            fn on_page_elaborated(&self, _page: u32, _total: usize) {
                self.ok.fetch_add(1, Ordering::SeqCst);
            }
            fn on_page_failed(&self, _page: u32, _total: usize, _error: &str) {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter::default());
        let cb: ProgressCallback = counter.clone();
        let generator = FnGenerator::new(|m| {
            if m[0].content.contains("raw text 1") {
                Err(failure("boom"))
            } else {
                Ok(Generation::text("ok"))
            }
        });
        elaborate(&generator, &pages(3), 2, Some(&cb)).await;
        assert_eq!(counter.ok.load(Ordering::SeqCst), 2);
        assert_eq!(counter.failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let generator = FnGenerator::new(|_| {
            panic!("no call expected")
        });
        let report = elaborate(&generator, &[], 1, None).await;
        assert!(report.is_empty());
        assert!(report.skipped.is_empty());
    }
}
