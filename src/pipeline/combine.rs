//! Combining: one text per invoice from its grouped pages. No model calls.

use crate::model::{CombinedInvoiceText, ElaboratedPage, InvoiceGroups, TextSource};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Concatenate the pages of every grouped invoice.
///
/// `total_pages` is the page count OCR produced; page numbers outside
/// `1..=total_pages`, or whose page did not survive elaboration, are skipped
/// with a warning. Texts are trimmed and joined with `"\n"` in the order the
/// grouping listed them. An invoice with no resolvable page gets no entry.
pub fn combine(
    groups: &InvoiceGroups,
    pages: &[ElaboratedPage],
    total_pages: usize,
    source: TextSource,
) -> CombinedInvoiceText {
    let lookup: HashMap<u32, &str> = pages
        .iter()
        .map(|p| (p.page_number, p.text_for(source)))
        .collect();

    let mut combined = CombinedInvoiceText::new();
    for (invoice, page_numbers) in groups.iter() {
        let mut texts = Vec::with_capacity(page_numbers.len());
        for &n in page_numbers {
            if n == 0 || (n as usize) > total_pages {
                warn!(invoice, page = n, total_pages, "Page number out of range; skipped");
                continue;
            }
            match lookup.get(&n) {
                Some(text) => texts.push(text.trim()),
                None => warn!(invoice, page = n, "Page has no elaborated text; skipped"),
            }
        }

        if texts.is_empty() {
            warn!(invoice, "No resolvable pages; invoice dropped");
            continue;
        }
        debug!(invoice, pages = texts.len(), "Invoice text combined");
        combined.insert(invoice.to_string(), texts.join("\n"));
    }
    combined
}
