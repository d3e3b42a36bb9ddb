//! OCR for image uploads.
//!
//! The [`OcrEngine`] trait is the seam to the external OCR collaborator.
//! [`TesseractOcr`] writes the image to a temporary file and runs the
//! `tesseract` binary on it; the temporary file is removed when the guard
//! drops, whether or not recognition succeeds.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::config::OcrConfig;

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize the text in an encoded image. `extension` is the lowercase
    /// file extension (`png`, `jpg`, ...).
    async fn recognize(&self, image: &[u8], extension: &str) -> Result<String>;
}

/// OCR via the `tesseract` command-line tool.
pub struct TesseractOcr {
    binary: PathBuf,
    language: String,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &[u8], extension: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("mmrag-ocr-")
            .suffix(&format!(".{}", extension))
            .tempfile()
            .context("Failed to create temporary image file")?;
        file.write_all(image)?;
        file.flush()?;

        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let ocr = TesseractOcr::new(&OcrConfig {
            tesseract_path: PathBuf::from("/nonexistent/tesseract-binary"),
            language: "eng".to_string(),
        });
        let err = ocr.recognize(b"\x89PNG", "png").await.unwrap_err();
        assert!(err.to_string().contains("Failed to run"));
    }
}
