//! Pipeline stages for invoice PDF processing.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own with in-process doubles.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──▶ elaborate ──▶ group ──▶ combine ──▶ extract ──▶ write
//! (URL/path) (pdfium) (pages)  (LLM/page)   (LLM/doc)  (no LLM)  (LLM/invoice) (.txt)
//! ```
//!
//! 1. [`input`]: load the user-supplied path or URL into PDF bytes
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`ocr`]: turn page images into [`crate::model::Page`]s (tesseract,
//!    or a vision model fed by [`encode`])
//! 4. [`elaborate`]: one natural-language restatement per page
//! 5. [`group`]: one call mapping invoice identifiers to page numbers
//! 6. [`combine`]: concatenate each invoice's page texts
//! 7. [`extract`]: one call per invoice for its fields
//! 8. [`write`]: one `<identifier>.txt` per invoice
//!
//! [`llm`] holds the [`llm::TextGenerator`] seam used by stages 4, 5 and 7;
//! [`postprocess`] validates everything the model sends back.

pub mod combine;
pub mod elaborate;
pub mod encode;
pub mod extract;
pub mod group;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod write;
