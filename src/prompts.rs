//! Prompts for the three text-generation calls and for vision OCR.
//!
//! Every prompt lives here so wording changes happen in one place and unit
//! tests can inspect prompts without a model.

/// Build the elaboration prompt for one page of raw OCR text.
pub fn elaboration_prompt(page_number: u32, raw_text: &str) -> String {
    format!(
        "You are an expert in reading semi-structured invoices.\n\
         Below is the raw OCR text from one page of a PDF invoice.\n\
         Write a clear and complete elaboration of what this invoice page contains in natural language.\n\n\
         Page {page_number}:\n{raw_text}"
    )
}

/// Instruction message for the page-grouping call.
pub const GROUPING_SYSTEM_PROMPT: &str = r#"You are a document analysis assistant.
You will be given a list of pages (with their page numbers) that may contain one or more invoice documents.
Your task is to identify which pages belong to the same invoice by recognizing invoice numbers and group them.

Return ONLY a valid JSON object in the following format:
{"<invoice number>": [<page numbers as integers>]}

For example:
{"INV-003": [2]}
{"INV-005": [4, 5]}
{"344256": [1, 2, 3, 4]}

The JSON must have the invoice number as key and the list of page numbers belonging to that invoice as value.
Use the page numbers exactly as labelled. Do not add commentary."#;

/// Build the user message for the page-grouping call.
///
/// `pages` yields `(page_number, elaborated_text)` pairs.
pub fn grouping_user_prompt<'a>(pages: impl IntoIterator<Item = (u32, &'a str)>) -> String {
    let formatted = pages
        .into_iter()
        .map(|(n, text)| format!("Page {n}:\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Here are the elaborated texts for all pages:\n\n\
         {formatted}\n\n\
         Now identify and group the pages by invoice number."
    )
}

/// Build the field-extraction prompt for one invoice.
pub fn extraction_prompt(invoice_id: &str, invoice_text: &str) -> String {
    format!(
        "You are an expert in extracting data from invoices.\n\
         Below is the text of invoice {invoice_id}.\n\
         Extract every field you can find (for example invoice date, due date, vendor, \
         customer, addresses, tax numbers, line items, subtotal, tax, total, currency).\n\n\
         Rules:\n\
         - Return ONLY a flat JSON object mapping field names to string values.\n\
         - Omit fields that are not present. Do not invent values or add null placeholders.\n\
         - Do not wrap the JSON in commentary.\n\n\
         Invoice text:\n{invoice_text}"
    )
}

/// System prompt for transcribing a scanned page image with a vision model.
pub const VISION_OCR_PROMPT: &str = r#"You are an OCR engine. Transcribe ALL text visible on this scanned invoice page.

Rules:
- Preserve the reading order and line breaks of the page
- Keep numbers, amounts, dates and identifiers exactly as printed
- Output ONLY the transcribed text, without commentary or code fences"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elaboration_prompt_embeds_page() {
        let p = elaboration_prompt(4, "INVOICE #77");
        assert!(p.contains("Page 4:\nINVOICE #77"));
        assert!(p.contains("elaboration"));
    }

    #[test]
    fn grouping_prompt_labels_each_page() {
        let p = grouping_user_prompt(vec![(1, "first"), (3, "third")]);
        assert!(p.contains("Page 1:\nfirst\n\nPage 3:\nthird"));
        assert!(GROUPING_SYSTEM_PROMPT.contains("ONLY a valid JSON"));
    }

    #[test]
    fn extraction_prompt_names_invoice() {
        let p = extraction_prompt("INV-100", "Total: 5");
        assert!(p.contains("invoice INV-100"));
        assert!(p.ends_with("Total: 5"));
    }
}
