//! Output writing: one indented key/value text file per invoice.
//!
//! ## Layout
//!
//! ```text
//! invoice_number: INV-100
//! content:
//!   a: 1
//!   b:
//!   - x
//!   - y
//! notes: |
//!   first line
//!   second line
//! ```
//!
//! Nested mappings indent by two spaces, mappings inside a list by four
//! (after a bare `-` line), multi-line strings become `|` blocks. Strings are
//! written unquoted and `null` as `null`.

use crate::error::{InvoiceError, ItemError, ResponseError};
use crate::model::{ExtractedInvoice, INVOICE_ID_KEY};
use crate::output::{WriteReport, WrittenFile};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Primary identifier key of an output record.
pub const INVOICE_NUMBER_KEY: &str = "invoice_number";

/// An ordered JSON object handed to the writer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputRecord(Map<String, Value>);

impl OutputRecord {
    /// A raw-text record: `{invoice_number, content}`.
    pub fn raw(invoice_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(INVOICE_NUMBER_KEY.to_string(), Value::String(invoice_id.into()));
        map.insert("content".to_string(), Value::String(content.into()));
        Self(map)
    }

    /// Build from any serialisable value whose JSON form is an object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, ResponseError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(Value::Array(_)) => Err(ResponseError::NotAnObject("an array")),
            Ok(Value::Null) => Err(ResponseError::NotAnObject("null")),
            Ok(_) => Err(ResponseError::NotAnObject("a scalar")),
            Err(e) => Err(ResponseError::NotJson(e.to_string())),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The record's identifier: `invoice_number`, else `Invoice_ID`.
    ///
    /// Only non-empty strings and numbers count.
    pub fn identifier(&self) -> Option<String> {
        [INVOICE_NUMBER_KEY, INVOICE_ID_KEY]
            .iter()
            .find_map(|key| match self.0.get(*key)? {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// Render the record in the indented key/value layout.
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_map(&mut out, &self.0, 0);
        out
    }
}

impl From<Map<String, Value>> for OutputRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ExtractedInvoice> for OutputRecord {
    fn from(invoice: ExtractedInvoice) -> Self {
        let mut map = Map::new();
        map.insert(INVOICE_ID_KEY.to_string(), Value::String(invoice.invoice_id));
        for (k, v) in invoice.fields {
            map.insert(k, Value::String(v));
        }
        Self(map)
    }
}

// ── Rendering ────────────────────────────────────────────────────────────────

fn render_map(out: &mut String, map: &Map<String, Value>, indent: usize) {
    let prefix = " ".repeat(indent);
    for (key, value) in map {
        match value {
            Value::Object(children) => {
                out.push_str(&format!("{prefix}{key}:\n"));
                render_map(out, children, indent + 2);
            }
            Value::Array(items) => {
                out.push_str(&format!("{prefix}{key}:\n"));
                for item in items {
                    render_list_item(out, item, indent);
                }
            }
            Value::String(s) if s.contains('\n') => {
                out.push_str(&format!("{prefix}{key}: |\n"));
                render_block(out, s, indent + 2);
            }
            scalar => out.push_str(&format!("{prefix}{key}: {}\n", scalar_text(scalar))),
        }
    }
}

fn render_list_item(out: &mut String, item: &Value, indent: usize) {
    let prefix = " ".repeat(indent);
    match item {
        Value::Object(children) => {
            out.push_str(&format!("{prefix}-\n"));
            render_map(out, children, indent + 4);
        }
        Value::String(s) if s.contains('\n') => {
            out.push_str(&format!("{prefix}- |\n"));
            render_block(out, s, indent + 2);
        }
        // Nested lists stay on one line as compact JSON.
        Value::Array(_) => out.push_str(&format!("{prefix}- {item}\n")),
        scalar => out.push_str(&format!("{prefix}- {}\n", scalar_text(scalar))),
    }
}

fn render_block(out: &mut String, text: &str, indent: usize) {
    let prefix = " ".repeat(indent);
    for line in text.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&format!("{prefix}{line}\n"));
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── File names ───────────────────────────────────────────────────────────────

/// Turn an identifier into a safe file stem.
///
/// Path separators, `: * ? " < > |` and control characters become `_`.
/// Returns `None` when nothing usable is left (empty, `.` or `..`).
pub fn sanitize_file_stem(identifier: &str) -> Option<String> {
    let stem: String = identifier
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match stem.as_str() {
        "" | "." | ".." => None,
        _ => Some(stem),
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Writes one `<identifier>.txt` per record into a directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a single record; same rules as [`OutputWriter::write`].
    pub async fn write_one(
        &self,
        record: impl Into<OutputRecord>,
    ) -> Result<WriteReport, InvoiceError> {
        self.write(std::iter::once(record)).await
    }

    /// Write every record, overwriting existing files.
    ///
    /// Only a directory that cannot be created is fatal. A record without a
    /// usable identifier, or whose file cannot be written, is skipped and
    /// reported.
    pub async fn write<I, R>(&self, records: I) -> Result<WriteReport, InvoiceError>
    where
        I: IntoIterator<Item = R>,
        R: Into<OutputRecord>,
    {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| InvoiceError::OutputDirFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        let mut report = WriteReport::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for (index, record) in records.into_iter().enumerate() {
            let record: OutputRecord = record.into();

            let Some(invoice) = record.identifier() else {
                warn!(index, "Record has no 'invoice_number' or 'Invoice_ID'; skipped");
                report.skip(ItemError::MissingIdentifier { index });
                continue;
            };
            let Some(stem) = sanitize_file_stem(&invoice) else {
                warn!(index, invoice = %invoice, "Identifier is not a usable file name; skipped");
                report.skip(ItemError::UnusableIdentifier { index, invoice });
                continue;
            };

            let path = self.dir.join(format!("{stem}.txt"));
            if !seen.insert(path.clone()) {
                warn!(invoice = %invoice, path = %path.display(), "File name already used in this batch; overwriting");
            }

            match write_atomic(&path, &record.render()).await {
                Ok(()) => {
                    debug!(invoice = %invoice, path = %path.display(), "Invoice file written");
                    report.push(WrittenFile {
                        invoice_id: invoice,
                        path,
                    });
                }
                Err(e) => {
                    warn!(invoice = %invoice, path = %path.display(), error = %e, "Write failed; skipped");
                    report.skip(ItemError::WriteFailed {
                        invoice,
                        path: path.display().to_string(),
                        detail: e.to_string(),
                    });
                }
            }
        }

        info!(
            written = report.items.len(),
            skipped = report.skipped.len(),
            dir = %self.dir.display(),
            "Output written"
        );
        Ok(report)
    }
}

/// Write to a temp file next to `path`, then rename over it.
async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await
}
