//! Field extraction: one call per invoice for a flat field map.

use crate::error::ItemError;
use crate::model::{CombinedInvoiceText, ExtractedInvoice};
use crate::output::StageReport;
use crate::pipeline::llm::{Message, TextGenerator};
use crate::pipeline::postprocess::parse_fields;
use crate::prompts::extraction_prompt;
use tracing::{debug, error, warn};

/// Extract the fields of every combined invoice, in grouping order.
///
/// The identifier is always injected as `Invoice_ID`, replacing anything the
/// model put there. An invoice whose call fails or whose answer is not a JSON
/// object is skipped with its reason.
pub async fn extract(
    generator: &dyn TextGenerator,
    combined: &CombinedInvoiceText,
) -> StageReport<ExtractedInvoice> {
    if combined.is_empty() {
        warn!("No combined invoice text; nothing to extract");
        return StageReport::default();
    }

    let mut report = StageReport::default();
    for (invoice, text) in combined {
        report.record(extract_one(generator, invoice, text).await);
    }
    report
}

async fn extract_one(
    generator: &dyn TextGenerator,
    invoice: &str,
    text: &str,
) -> Result<ExtractedInvoice, ItemError> {
    let messages = [Message::user(extraction_prompt(invoice, text))];

    let response = generator.generate(&messages).await.map_err(|e| {
        error!(invoice, error = %e, "Field extraction failed; invoice skipped");
        ItemError::ExtractionFailed {
            invoice: invoice.to_string(),
            detail: e.to_string(),
        }
    })?;

    let fields = parse_fields(&response.text).map_err(|e| {
        error!(invoice, error = %e, "Field extraction answer unusable; invoice skipped");
        ItemError::MalformedFields {
            invoice: invoice.to_string(),
            detail: e.to_string(),
        }
    })?;

    debug!(invoice, fields = fields.len(), "Invoice fields extracted");
    Ok(ExtractedInvoice::new(invoice, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::testing::{failure, joined, FnGenerator};
    use crate::pipeline::llm::Generation;

    fn combined(entries: &[(&str, &str)]) -> CombinedInvoiceText {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn injects_invoice_id() {
        let generator = FnGenerator::new(|_| {
            Ok(Generation::text(
                "```json\n{\"Invoice_ID\": \"WRONG\", \"Total\": \"5.00\"}\n```",
            ))
        });
        let report = extract(&generator, &combined(&[("INV-100", "Total 5.00")])).await;
        assert_eq!(report.items.len(), 1);
        let invoice = &report.items[0];
        assert_eq!(invoice.invoice_id, "INV-100");
        assert_eq!(invoice.field("Invoice_ID"), Some("INV-100"));
        assert_eq!(invoice.field("Total"), Some("5.00"));
    }

    #[tokio::test]
    async fn unparsable_invoice_is_absent() {
        let generator = FnGenerator::new(|m| {
            if joined(m).contains("invoice BAD") {
                Ok(Generation::text("Sorry, I cannot help with that."))
            } else {
                Ok(Generation::text("{\"Vendor\": \"ACME\"}"))
            }
        });
        let report = extract(&generator, &combined(&[("BAD", "x"), ("GOOD", "y")])).await;
        let ids: Vec<&str> = report.items.iter().map(|i| i.invoice_id.as_str()).collect();
        assert_eq!(ids, vec!["GOOD"]);
        assert!(matches!(
            &report.skipped[0],
            ItemError::MalformedFields { invoice, .. } if invoice == "BAD"
        ));
    }

    #[tokio::test]
    async fn call_failure_skips_invoice() {
        let generator = FnGenerator::new(|_| Err(failure("rate limited")));
        let report = extract(&generator, &combined(&[("INV-1", "x")])).await;
        assert!(report.is_empty());
        assert!(matches!(
            &report.skipped[0],
            ItemError::ExtractionFailed { invoice, .. } if invoice == "INV-1"
        ));
    }

    #[tokio::test]
    async fn empty_input_gives_empty_report() {
        let generator = FnGenerator::new(|_| panic!("no call expected"));
        let report = extract(&generator, &CombinedInvoiceText::new()).await;
        assert!(report.is_empty());
        assert!(report.skipped.is_empty());
    }
}
