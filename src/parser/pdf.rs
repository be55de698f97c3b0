use std::path::Path;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Source document not found: {0}")]
    NotFound(String),
    #[error("Failed to read source document: {0}")]
    Io(#[from] std::io::Error),
    #[error("pdftotext is unavailable ({bin}): {source}")]
    ToolUnavailable {
        bin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("pdftotext failed: {0}")]
    ToolFailed(String),
    #[error("Source document is not valid UTF-8 text")]
    NotUtf8,
    #[error("No text extracted from {0}")]
    Empty(String),
}

/// Extract plain text from a document. Files starting with `%PDF` go through
/// `pdftotext`; anything else is read as UTF-8 text.
pub async fn extract_text(path: &Path, pdftotext_bin: &str) -> Result<String, ExtractError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExtractError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(ExtractError::Io(e)),
    };

    if bytes.starts_with(b"%PDF") {
        extract_pdf_via_command(path, pdftotext_bin).await
    } else {
        debug!("{} is not a PDF, reading as plain text", path.display());
        String::from_utf8(bytes).map_err(|_| ExtractError::NotUtf8)
    }
}

async fn extract_pdf_via_command(path: &Path, bin: &str) -> Result<String, ExtractError> {
    let output = Command::new(bin)
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .await
        .map_err(|source| ExtractError::ToolUnavailable {
            bin: bin.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!("pdftotext exited with {}: {stderr}", output.status);
        return Err(ExtractError::ToolFailed(format!("{}: {stderr}", output.status)));
    }

    let text = String::from_utf8(output.stdout).map_err(|_| ExtractError::NotUtf8)?;
    // Page breaks become paragraph breaks so chunks read naturally.
    Ok(text.replace('\u{000C}', "\n\n"))
}
