//! PDF to text through poppler's `pdftotext`.

use std::io::Write;
use std::process::Command;

use super::FetchError;

/// Convert PDF bytes to layout-preserving text.
pub async fn pdf_to_text(bytes: Vec<u8>) -> Result<String, FetchError> {
    tokio::task::spawn_blocking(move || convert(&bytes))
        .await
        .map_err(|e| FetchError::Conversion(format!("conversion task failed: {}", e)))?
}

fn convert(bytes: &[u8]) -> Result<String, FetchError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(FetchError::Conversion("body is not a PDF".into()));
    }

    let mut file = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| FetchError::Conversion(e.to_string()))?;
    file.write_all(bytes)
        .map_err(|e| FetchError::Conversion(e.to_string()))?;

    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg(file.path())
        .arg("-")
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                FetchError::Conversion("pdftotext not found (install poppler-utils)".into())
            }
            _ => FetchError::Conversion(e.to_string()),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FetchError::Conversion(format!(
            "pdftotext exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
