//! Grouping: one call that maps invoice identifiers to page numbers.

use crate::model::{ElaboratedPage, InvoiceGroups};
use crate::pipeline::llm::{Message, TextGenerator};
use crate::pipeline::postprocess::parse_invoice_groups;
use crate::prompts::{grouping_user_prompt, GROUPING_SYSTEM_PROMPT};
use tracing::{debug, error, info};

/// Ask the model which pages belong to which invoice.
///
/// All pages go out in a single request, each labelled with its own page
/// number. Any failure (call error, malformed JSON, non-object answer) gives
/// an empty grouping and an `error` log; nothing is propagated.
pub async fn group(generator: &dyn TextGenerator, pages: &[ElaboratedPage]) -> InvoiceGroups {
    if pages.is_empty() {
        debug!("No elaborated pages; skipping grouping call");
        return InvoiceGroups::new();
    }

    let messages = [
        Message::system(GROUPING_SYSTEM_PROMPT),
        Message::user(grouping_user_prompt(
            pages
                .iter()
                .map(|p| (p.page_number, p.elaborated_text.as_str())),
        )),
    ];

    let response = match generator.generate(&messages).await {
        Ok(generation) => generation.text,
        Err(e) => {
            error!(error = %e, "Grouping call failed; no invoices grouped");
            return InvoiceGroups::new();
        }
    };

    match parse_invoice_groups(&response) {
        Ok(groups) => {
            info!(invoices = groups.len(), "Pages grouped into invoices");
            groups
        }
        Err(e) => {
            error!(error = %e, "Grouping response unusable; no invoices grouped");
            debug!(response = %response, "Raw grouping response");
            InvoiceGroups::new()
        }
    }
}
