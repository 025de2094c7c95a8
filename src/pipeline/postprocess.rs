//! Post-processing: turn raw model text into validated structures.
//!
//! Models asked for "ONLY JSON" still wrap their answer in ` ```json ... ``` `
//! fences now and then, or put a sentence in front of it. Everything that
//! leaves this module has been decoded and checked, so later stages never see
//! untyped JSON:
//!
//! 1. [`strip_json_fences`] removes an optional opening fence (with or without
//!    a language tag) and an optional closing fence.
//! 2. [`decode_object`] decodes the result, falling back to the outermost
//!    `{ … }` span when there is text around the object.
//! 3. [`parse_invoice_groups`] / [`parse_fields`] validate the shape.

use crate::error::ResponseError;
use crate::model::{FieldMap, InvoiceGroups};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

// ── Fence stripping ──────────────────────────────────────────────────────────

static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());

static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?```$").unwrap());

/// Remove optional surrounding code-fence markers from a model response.
///
/// Text without fences is returned unchanged, so the function is idempotent.
///
/// ```rust
/// use edgequake_invoice2txt::pipeline::postprocess::strip_json_fences;
///
/// assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
/// assert_eq!(strip_json_fences("{\"a\":1}"), "{\"a\":1}");
/// ```
pub fn strip_json_fences(input: &str) -> String {
    let trimmed = input.trim();
    let has_open = RE_OPEN_FENCE.is_match(trimmed);
    let has_close = trimmed.len() > 3 && RE_CLOSE_FENCE.is_match(trimmed);
    if !has_open && !has_close {
        return input.to_string();
    }

    let mut s = trimmed;
    if let Some(m) = RE_OPEN_FENCE.find(s) {
        s = &s[m.end()..];
    }
    if let Some(m) = RE_CLOSE_FENCE.find(s) {
        s = &s[..m.start()];
    }
    s.trim().to_string()
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Decode a model response into a JSON object.
pub fn decode_object(response: &str) -> Result<Map<String, Value>, ResponseError> {
    let cleaned = strip_json_fences(response);
    let value = match serde_json::from_str::<Value>(cleaned.trim()) {
        Ok(v) => v,
        Err(first_err) => {
            // Prose around the object: retry on the outermost braces.
            let span = outer_object_span(&cleaned).ok_or_else(|| {
                ResponseError::NotJson(first_err.to_string())
            })?;
            debug!("Retrying JSON decode on embedded object span");
            serde_json::from_str::<Value>(span)
                .map_err(|_| ResponseError::NotJson(first_err.to_string()))?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ResponseError::NotAnObject(json_kind(&other))),
    }
}

fn outer_object_span(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Invoice groups ───────────────────────────────────────────────────────────

/// Parse and validate the grouping response.
///
/// Keys are trimmed; empty keys are dropped. Each value must be a list of
/// positive integers (integer-valued strings like `"3"` are accepted, and a
/// bare number is treated as a one-element list). Invalid entries are dropped
/// with a warning; duplicates within one invoice keep their first position.
/// Whether a page number exists in the document is checked later, by the
/// combiner.
pub fn parse_invoice_groups(response: &str) -> Result<InvoiceGroups, ResponseError> {
    let map = decode_object(response)?;
    let mut groups = InvoiceGroups::new();

    for (raw_key, value) in map {
        let invoice = raw_key.trim();
        if invoice.is_empty() {
            warn!("Dropping invoice group with an empty identifier");
            continue;
        }

        let candidates = match value {
            Value::Array(items) => items,
            scalar @ (Value::Number(_) | Value::String(_)) => vec![scalar],
            other => {
                warn!(
                    invoice,
                    "Dropping invoice group: expected a list of page numbers, found {}",
                    json_kind(&other)
                );
                continue;
            }
        };

        let mut pages: Vec<u32> = Vec::with_capacity(candidates.len());
        for item in &candidates {
            match page_number(item) {
                Some(n) if !pages.contains(&n) => pages.push(n),
                Some(_) => {}
                None => warn!(invoice, entry = %item, "Dropping invalid page number"),
            }
        }

        groups.insert(invoice, pages);
    }

    Ok(groups)
}

fn page_number(v: &Value) -> Option<u32> {
    let n = match v {
        Value::Number(num) => {
            if let Some(u) = num.as_u64() {
                u
            } else {
                let f = num.as_f64()?;
                if f.fract() != 0.0 || f < 1.0 {
                    return None;
                }
                f as u64
            }
        }
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok().filter(|&n| n >= 1)
}

// ── Extracted fields ─────────────────────────────────────────────────────────

/// Parse and validate a field-extraction response into a flat string map,
/// keeping the order the model listed the fields in.
///
/// Strings are trimmed and blank ones omitted; numbers and booleans are
/// stringified; `null` is omitted; nested arrays and objects are kept as
/// compact JSON text.
pub fn parse_fields(response: &str) -> Result<FieldMap, ResponseError> {
    let map = decode_object(response)?;
    let mut fields = FieldMap::new();

    for (raw_key, value) in map {
        let key = raw_key.trim();
        if key.is_empty() {
            continue;
        }
        let text = match value {
            Value::Null => continue,
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    continue;
                }
                s.to_string()
            }
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
        };
        fields.insert(key.to_string(), text);
    }

    Ok(fields)
}

// ── Tests ────────────────────────────────────────────────────────────────────
