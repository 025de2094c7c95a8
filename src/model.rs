//! Domain types that flow between pipeline stages.
//!
//! ```text
//! Page ──▶ ElaboratedPage ──▶ InvoiceGroups ──▶ CombinedInvoiceText ──▶ ExtractedInvoice
//! (OCR)     (elaborate)        (group)           (combine)               (extract)
//! ```
//!
//! Page numbers are 1-based everywhere. Values that come out of a model
//! response (`InvoiceGroups`, `ExtractedInvoice`) are only constructed by the
//! parsers in [`crate::pipeline::postprocess`], which validate them first.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Raw OCR text of one physical PDF page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based physical page number.
    pub page_number: u32,
    /// Name of the PDF the page came from.
    pub filename: String,
    /// Raw OCR text.
    pub text: String,
}

impl Page {
    pub fn new(page_number: u32, filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            page_number,
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// A [`Page`] plus the model's natural-language restatement of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElaboratedPage {
    pub page_number: u32,
    pub filename: String,
    pub text: String,
    pub elaborated_text: String,
}

impl ElaboratedPage {
    pub fn from_page(page: &Page, elaborated_text: impl Into<String>) -> Self {
        Self {
            page_number: page.page_number,
            filename: page.filename.clone(),
            text: page.text.clone(),
            elaborated_text: elaborated_text.into(),
        }
    }

    /// The text selected by `source`.
    pub fn text_for(&self, source: TextSource) -> &str {
        match source {
            TextSource::Raw => &self.text,
            TextSource::Elaborated => &self.elaborated_text,
        }
    }
}

/// Which page text the combiner concatenates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextSource {
    /// Raw OCR text (default). Keeps amounts and numbers verbatim.
    #[default]
    Raw,
    /// The elaborated restatement.
    Elaborated,
}

/// Invoice identifier → page numbers believed to belong to that invoice,
/// in the order the model listed the invoices.
///
/// Page numbers are positive but not guaranteed to exist in the document;
/// the combiner checks them before any lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceGroups(IndexMap<String, Vec<u32>>);

impl InvoiceGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the page list for `invoice`. A replaced entry keeps
    /// its position.
    pub fn insert(&mut self, invoice: impl Into<String>, pages: Vec<u32>) {
        self.0.insert(invoice.into(), pages);
    }

    pub fn get(&self, invoice: &str) -> Option<&[u32]> {
        self.0.get(invoice).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u32])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn invoice_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<u32>)> for InvoiceGroups {
    fn from_iter<I: IntoIterator<Item = (K, Vec<u32>)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Invoice identifier → combined page text, in grouping order.
pub type CombinedInvoiceText = IndexMap<String, String>;

/// Field name → value, in the order the model answered.
pub type FieldMap = IndexMap<String, String>;

/// Reserved output key holding the invoice identifier of an extracted invoice.
pub const INVOICE_ID_KEY: &str = "Invoice_ID";

/// Flat field map extracted from one invoice's text.
///
/// Serialises as `{"Invoice_ID": ..., <field>: <value>, ...}` with the
/// identifier first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedInvoice {
    #[serde(rename = "Invoice_ID")]
    pub invoice_id: String,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl ExtractedInvoice {
    /// Build from an identifier and model-supplied fields. A model-supplied
    /// `Invoice_ID` field is discarded; the identifier always wins.
    pub fn new(invoice_id: impl Into<String>, mut fields: FieldMap) -> Self {
        fields.shift_remove(INVOICE_ID_KEY);
        Self {
            invoice_id: invoice_id.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        if name == INVOICE_ID_KEY {
            return Some(&self.invoice_id);
        }
        self.fields.get(name).map(String::as_str)
    }
}
