//! Document ingestion: file bytes in, chunks out.
//!
//! Dispatches on the file extension:
//!
//! | Extension | Handling |
//! |-----------|----------|
//! | `txt`, `md` | UTF-8 text, fixed-size overlapping chunks |
//! | `pdf` | per-page extraction, each page chunked separately, chunks carry the page number |
//! | `docx` | paragraph text from `word/document.xml`, chunked like text |
//! | `jpg`, `jpeg`, `png`, `bmp` | OCR, one chunk when any text was recognized |
//!
//! Anything else is rejected with [`IngestError::UnsupportedFileType`]
//! before any work is done.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::extract::{self, ExtractError};
use crate::models::{Chunk, ChunkKind};
use crate::ocr::OcrEngine;

/// File extensions accepted for upload.
pub const SUPPORTED_FILE_TYPES: [&str; 8] = ["txt", "md", "pdf", "docx", "jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Lowercased text after the last `.` of a file name (the whole name when
/// there is no dot).
pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or(filename)
        .to_lowercase()
}

pub fn is_supported(extension: &str) -> bool {
    SUPPORTED_FILE_TYPES.contains(&extension)
}

/// Turns uploaded files into chunks ready for indexing.
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
    ocr: Arc<dyn OcrEngine>,
}

impl DocumentProcessor {
    pub fn new(config: &ChunkingConfig, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            ocr,
        }
    }

    /// Process one file. `filename` becomes the source identifier of every chunk.
    pub async fn process(&self, bytes: &[u8], filename: &str) -> Result<Vec<Chunk>, IngestError> {
        let ext = file_extension(filename);
        let chunks = match ext.as_str() {
            "txt" | "md" => {
                let text = String::from_utf8_lossy(bytes);
                self.chunk(&text, filename, None, ChunkKind::Text, 0)
            }
            "pdf" => self.process_pdf(bytes, filename)?,
            "docx" => {
                let text = extract::extract_docx(bytes)?;
                self.chunk(&text, filename, None, ChunkKind::Docx, 0)
            }
            "jpg" | "jpeg" | "png" | "bmp" => self.process_image(bytes, filename, &ext).await,
            _ => return Err(IngestError::UnsupportedFileType(ext)),
        };
        debug!(file = filename, chunks = chunks.len(), "document processed");
        Ok(chunks)
    }

    fn process_pdf(&self, bytes: &[u8], filename: &str) -> Result<Vec<Chunk>, IngestError> {
        let pages = extract::extract_pdf_pages(bytes)?;
        let mut chunks = Vec::new();
        for (i, page_text) in pages.iter().enumerate() {
            if page_text.trim().is_empty() {
                continue;
            }
            let page = Some(i as u32 + 1);
            let next_index = chunks.len();
            chunks.extend(self.chunk(page_text, filename, page, ChunkKind::Pdf, next_index));
        }
        Ok(chunks)
    }

    async fn process_image(&self, bytes: &[u8], filename: &str, ext: &str) -> Vec<Chunk> {
        match self.ocr.recognize(bytes, ext).await {
            Ok(text) if !text.trim().is_empty() => {
                vec![Chunk::new(text, filename, None, ChunkKind::Image, 0)]
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(file = filename, error = %e, "OCR failed; image yields no chunks");
                Vec::new()
            }
        }
    }

    fn chunk(
        &self,
        text: &str,
        source: &str,
        page: Option<u32>,
        kind: ChunkKind,
        first_index: usize,
    ) -> Vec<Chunk> {
        chunk_text(
            text,
            source,
            page,
            kind,
            self.chunk_size,
            self.chunk_overlap,
            first_index,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedOcr(Result<String, String>);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn recognize(&self, _image: &[u8], _extension: &str) -> Result<String> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn processor(ocr: FixedOcr) -> DocumentProcessor {
        DocumentProcessor::new(&ChunkingConfig::default(), Arc::new(ocr))
    }

    #[test]
    fn extension_is_lowercased_suffix() {
        assert_eq!(file_extension("Notes.TXT"), "txt");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("README"), "readme");
        assert!(is_supported("png"));
        assert!(!is_supported("xyz"));
    }

    #[tokio::test]
    async fn text_file_is_chunked_with_source() {
        let p = processor(FixedOcr(Ok(String::new())));
        let body = "x".repeat(2500);
        let chunks = p.process(body.as_bytes(), "notes.md").await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.source == "notes.md"));
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Text && c.page.is_none()));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let p = processor(FixedOcr(Ok("text".to_string())));
        let err = p.process(b"data", "weird.xyz").await.unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType(ref e) if e == "xyz"));
        assert_eq!(err.to_string(), "unsupported file type: xyz");
    }

    #[tokio::test]
    async fn image_with_text_yields_single_chunk() {
        let p = processor(FixedOcr(Ok("INVOICE 42\nTotal: 10".to_string())));
        let chunks = p.process(b"img", "scan.PNG").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Image);
        assert_eq!(chunks[0].content, "INVOICE 42\nTotal: 10");
    }

    #[tokio::test]
    async fn blank_or_failed_ocr_yields_nothing() {
        let blank = processor(FixedOcr(Ok("  \n".to_string())));
        assert!(blank.process(b"img", "a.jpg").await.unwrap().is_empty());

        let failing = processor(FixedOcr(Err("tesseract missing".to_string())));
        assert!(failing.process(b"img", "a.jpeg").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn docx_is_chunked() {
        let p = processor(FixedOcr(Ok(String::new())));
        let bytes = crate::extract::tests::docx_with_paragraphs(&["Quarterly report", "Revenue grew."]);
        let chunks = p.process(&bytes, "report.docx").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Docx);
        assert!(chunks[0].content.contains("Revenue grew."));
    }

    #[tokio::test]
    async fn pdf_pages_are_chunked_with_page_numbers() {
        let p = processor(FixedOcr(Ok(String::new())));
        let bytes =
            crate::extract::tests::pdf_with_pages(&["Alpha page one text", "", "Gamma page three text"]);
        let chunks = p.process(&bytes, "paper.pdf").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, Some(1));
        assert!(chunks[0].content.contains("Alpha page one text"));
        assert_eq!(chunks[1].page, Some(3));
        assert!(chunks[1].content.contains("Gamma page three text"));
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Pdf && c.source == "paper.pdf"));
        assert!(chunks.iter().all(|c| c.page != Some(2)));
    }

    #[tokio::test]
    async fn broken_pdf_is_an_extract_error() {
        let p = processor(FixedOcr(Ok(String::new())));
        let err = p.process(b"garbage", "paper.pdf").await.unwrap_err();
        assert!(matches!(err, IngestError::Extract(_)));
    }
}
