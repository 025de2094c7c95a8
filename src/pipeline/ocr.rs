//! OCR: turn a PDF into one [`Page`] of raw text per physical page.
//!
//! [`PageTextSource`] is the seam the orchestrator depends on. The production
//! source, [`RenderedOcr`], rasterises with pdfium (see [`super::render`]) and
//! runs an [`OcrEngine`] over each image:
//!
//! - `Tesseract` writes each page to a temp PNG and shells out to
//!   `<command> <png> stdout -l <language>`;
//! - `Vision` sends the page as a base64 PNG to a vision-capable model.
//!
//! A page the engine cannot read keeps its slot with empty text; only an
//! engine that cannot run at all is fatal.

use crate::config::{OcrBackend, PipelineConfig};
use crate::error::InvoiceError;
use crate::model::Page;
use crate::pipeline::{encode, llm, render};
use crate::prompts::VISION_OCR_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use image::DynamicImage;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Anything that turns PDF bytes into per-page text, in physical order.
#[async_trait]
pub trait PageTextSource: Send + Sync {
    async fn extract_pages(&self, bytes: &[u8], filename: &str) -> Result<Vec<Page>, InvoiceError>;
}

/// OCR engine applied to each rendered page image.
pub enum OcrEngine {
    Tesseract {
        command: String,
        language: String,
    },
    Vision {
        provider: Arc<dyn LLMProvider>,
        options: CompletionOptions,
    },
}

impl std::fmt::Debug for OcrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrEngine::Tesseract { command, language } => f
                .debug_struct("Tesseract")
                .field("command", command)
                .field("language", language)
                .finish(),
            OcrEngine::Vision { .. } => f.write_str("Vision"),
        }
    }
}

impl OcrEngine {
    /// Read the text of one page image.
    ///
    /// `workdir` holds temporary files for engines that need them.
    pub async fn recognize(
        &self,
        page_number: u32,
        image: &DynamicImage,
        workdir: &Path,
    ) -> Result<String, InvoiceError> {
        match self {
            OcrEngine::Tesseract { command, language } => {
                run_tesseract(command, language, page_number, image, workdir).await
            }
            OcrEngine::Vision { provider, options } => {
                Ok(run_vision(provider, options, page_number, image).await)
            }
        }
    }
}

async fn run_tesseract(
    command: &str,
    language: &str,
    page_number: u32,
    image: &DynamicImage,
    workdir: &Path,
) -> Result<String, InvoiceError> {
    let png = match encode::png_bytes(image) {
        Ok(png) => png,
        Err(e) => {
            warn!(page = page_number, error = %e, "Could not encode page image; page left empty");
            return Ok(String::new());
        }
    };
    let img_path = workdir.join(format!("page-{page_number:04}.png"));
    tokio::fs::write(&img_path, png)
        .await
        .map_err(|e| InvoiceError::Internal(format!("Failed to write OCR temp file: {e}")))?;

    let output = Command::new(command)
        .arg(&img_path)
        .arg("stdout")
        .arg("-l")
        .arg(language)
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => Ok(clean_tesseract_output(&out.stdout)),
        Ok(out) => {
            warn!(
                page = page_number,
                status = %out.status,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "Tesseract failed; page left empty"
            );
            Ok(String::new())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(InvoiceError::OcrUnavailable {
            engine: "tesseract".to_string(),
            detail: format!("'{command}' not found on PATH. Install tesseract or pass --tesseract-cmd."),
        }),
        Err(e) => {
            warn!(page = page_number, error = %e, "Could not run tesseract; page left empty");
            Ok(String::new())
        }
    }
}

/// Decode tesseract's stdout, dropping the form feed it appends per page.
pub fn clean_tesseract_output(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .replace('\x0c', "")
        .trim()
        .to_string()
}

async fn run_vision(
    provider: &Arc<dyn LLMProvider>,
    options: &CompletionOptions,
    page_number: u32,
    image: &DynamicImage,
) -> String {
    let image_data = match encode::encode_page(image) {
        Ok(data) => data,
        Err(e) => {
            warn!(page = page_number, error = %e, "Could not encode page image; page left empty");
            return String::new();
        }
    };

    let messages = vec![
        ChatMessage::system(VISION_OCR_PROMPT),
        ChatMessage::user_with_images("", vec![image_data]),
    ];

    match provider.chat(&messages, Some(options)).await {
        Ok(response) => {
            debug!(
                page = page_number,
                input_tokens = response.prompt_tokens,
                output_tokens = response.completion_tokens,
                "Vision OCR complete"
            );
            response.content.trim().to_string()
        }
        Err(e) => {
            warn!(page = page_number, error = %e, "Vision OCR failed; page left empty");
            String::new()
        }
    }
}

/// pdfium rasterisation followed by an [`OcrEngine`] per page.
#[derive(Debug)]
pub struct RenderedOcr {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub engine: OcrEngine,
}

impl RenderedOcr {
    pub fn new(dpi: u32, max_rendered_pixels: u32, engine: OcrEngine) -> Self {
        Self {
            dpi,
            max_rendered_pixels,
            engine,
        }
    }

    /// Build from config; the vision engine resolves its provider here.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, InvoiceError> {
        let engine = match &config.ocr {
            OcrBackend::Tesseract { command, language } => OcrEngine::Tesseract {
                command: command.clone(),
                language: language.clone(),
            },
            OcrBackend::Vision => OcrEngine::Vision {
                provider: llm::resolve_provider(config)?,
                options: llm::build_options(config),
            },
        };
        Ok(Self::new(config.dpi, config.max_rendered_pixels, engine))
    }
}

#[async_trait]
impl PageTextSource for RenderedOcr {
    async fn extract_pages(&self, bytes: &[u8], filename: &str) -> Result<Vec<Page>, InvoiceError> {
        let images =
            render::render_pages(bytes.to_vec(), filename, self.dpi, self.max_rendered_pixels)
                .await?;

        let workdir = tempfile::Builder::new()
            .prefix("invoice2txt_ocr_")
            .tempdir()
            .map_err(|e| InvoiceError::Internal(format!("tempdir: {e}")))?;

        info!("OCR processing {} pages of '{}'", images.len(), filename);
        let mut pages = Vec::with_capacity(images.len());
        for (page_number, image) in &images {
            let text = self
                .engine
                .recognize(*page_number, image, workdir.path())
                .await?;
            debug!(page = page_number, chars = text.len(), "Page OCR complete");
            pages.push(Page::new(*page_number, filename, text));
        }
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn blank_page() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([255])))
    }

    fn tesseract(command: &str, language: &str) -> OcrEngine {
        OcrEngine::Tesseract {
            command: command.into(),
            language: language.into(),
        }
    }

    #[test]
    fn form_feeds_are_removed() {
        assert_eq!(clean_tesseract_output(b"INVOICE 42\nTotal 5\n\x0c"), "INVOICE 42\nTotal 5");
    }

    #[tokio::test]
    async fn missing_tesseract_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = tesseract("invoice2txt-no-such-ocr-binary", "eng")
            .recognize(1, &blank_page(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::OcrUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tesseract_receives_image_stdout_and_language() {
        // `echo` stands in for tesseract and prints its arguments back.
        let dir = tempfile::tempdir().unwrap();
        let text = tesseract("echo", "deu")
            .recognize(3, &blank_page(), dir.path())
            .await
            .unwrap();
        assert!(text.contains("page-0003.png"), "got: {text}");
        assert!(text.ends_with("stdout -l deu"), "got: {text}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_page_is_left_empty() {
        let dir = tempfile::tempdir().unwrap();
        let text = tesseract("false", "eng")
            .recognize(1, &blank_page(), dir.path())
            .await
            .unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn engine_from_default_config_is_tesseract() {
        let ocr = RenderedOcr::from_config(&PipelineConfig::default()).unwrap();
        assert_eq!(ocr.dpi, 300);
        assert!(matches!(
            ocr.engine,
            OcrEngine::Tesseract { ref language, .. } if language == "eng"
        ));
    }
}
