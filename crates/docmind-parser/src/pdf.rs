//! PDF document parser using pdf-extract
//!
//! Extracts text content from PDF files. pdf-extract separates pages with
//! form feed characters; those become page spans on the resulting document.

use std::path::Path;

use docmind_core::{Document, PageSpan};

use crate::{DocumentParser, FileType, ParserError, Result};

/// PDF document parser
#[derive(Debug, Clone, Default)]
pub struct PdfParser;

impl PdfParser {
    /// Create a new PDF parser
    pub fn new() -> Self {
        Self
    }

    /// Extract raw text from a PDF file
    fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ParserError::PdfError(e.to_string()))
    }
}

/// Join form-feed separated pages with paragraph breaks, recording where
/// each non-blank page starts.
pub fn paginate(raw: &str) -> (String, Vec<PageSpan>) {
    let mut text = String::with_capacity(raw.len());
    let mut pages = Vec::new();
    let mut offset = 0;

    for (i, page) in raw.split('\x0C').enumerate() {
        let page = page.trim();
        if page.is_empty() {
            continue;
        }

        if !text.is_empty() {
            text.push_str("\n\n");
            offset += 2;
        }
        pages.push(PageSpan {
            number: i as u32 + 1,
            start_offset: offset,
        });
        text.push_str(page);
        offset += page.chars().count();
    }

    (text, pages)
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<Document> {
        let raw = self.extract_text(path)?;
        let (text, pages) = paginate(&raw);

        Ok(Document::new(path.display().to_string(), text).with_pages(pages))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_types() {
        let parser = PdfParser::new();
        assert!(parser.can_parse(FileType::Pdf));
        assert!(!parser.can_parse(FileType::PlainText));
    }

    #[test]
    fn test_paginate() {
        let (text, pages) = paginate("  Intro page\n\x0C\x0CSecond  \x0C");

        assert_eq!(text, "Intro page\n\nSecond");
        assert_eq!(
            pages,
            vec![
                PageSpan {
                    number: 1,
                    start_offset: 0
                },
                PageSpan {
                    number: 3,
                    start_offset: 12
                },
            ]
        );
    }

    #[test]
    fn test_paginate_counts_characters() {
        let (text, pages) = paginate("제1조\x0C제2조");

        assert_eq!(text, "제1조\n\n제2조");
        assert_eq!(pages[1].start_offset, 5);
    }

    #[test]
    fn test_corrupt_pdf_is_error() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"not a pdf").unwrap();

        let err = PdfParser::new().parse(file.path()).unwrap_err();
        assert!(matches!(err, ParserError::PdfError(_)));
    }
}
