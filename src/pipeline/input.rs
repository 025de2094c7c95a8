//! Input loading: read a user-supplied path or URL into PDF bytes.
//!
//! pdfium renders straight from a byte slice, so a download never touches
//! the disk. The PDF magic bytes (`%PDF`) are checked before anything else
//! so a wrong file fails with a clear message instead of a pdfium error.

use crate::error::InvoiceError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A PDF held in memory, with the name used in logs, summaries and pages.
#[derive(Debug, Clone)]
pub struct LoadedPdf {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl LoadedPdf {
    /// Wrap `bytes`, rejecting anything that does not start with `%PDF`.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, InvoiceError> {
        let name = name.into();
        check_pdf_magic(&name, &bytes)?;
        Ok(Self { name, bytes })
    }
}

/// Reject bytes that do not start with `%PDF`.
pub fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), InvoiceError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    Err(InvoiceError::NotAPdf {
        name: name.to_string(),
        magic: bytes.iter().take(8).copied().collect(),
    })
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or an HTTP/HTTPS URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedPdf, InvoiceError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

async fn load_local(path: &Path) -> Result<LoadedPdf, InvoiceError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => InvoiceError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => InvoiceError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!("Loaded local PDF: {} ({} bytes)", path.display(), bytes.len());
    LoadedPdf::new(name, bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedPdf, InvoiceError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InvoiceError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InvoiceError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(InvoiceError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            InvoiceError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InvoiceError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    LoadedPdf::new(filename_from_url(url), bytes.to_vec())
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

/// Display name for an input string, used when a batch reports a failure.
pub fn input_name(input: &str) -> String {
    if is_url(input) {
        return input.to_string();
    }
    PathBuf::from(input)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string())
}
