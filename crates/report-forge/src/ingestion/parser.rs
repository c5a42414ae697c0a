//! Multi-format text extraction for uploaded documents

use calamine::Reader;
use std::io::Cursor;

use crate::error::{Error, Result};

/// Kind of uploaded file, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Excel,
    Image,
}

impl FileKind {
    /// Detect from a filename (case-insensitive)
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.').map(|(_, e)| e.to_lowercase())?;
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" | "xls" => Some(Self::Excel),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            _ => None,
        }
    }

    /// Whether extraction goes through OCR rather than a document parser
    pub fn needs_ocr(&self) -> bool {
        matches!(self, Self::Image)
    }
}

/// Text extraction for document formats (PDF, DOCX, Excel)
///
/// Images are handled by [`crate::ingestion::OcrEngine`].
pub struct FileParser;

impl FileParser {
    /// Extract plain text from a document based on its extension
    pub fn parse(filename: &str, data: &[u8]) -> Result<String> {
        match FileKind::from_filename(filename) {
            Some(FileKind::Pdf) => Self::parse_pdf(filename, data),
            Some(FileKind::Docx) => Self::parse_docx(filename, data),
            Some(FileKind::Excel) => Self::parse_excel(filename, data),
            Some(FileKind::Image) => Err(Error::UnsupportedFileType(format!(
                "{} - images are extracted with OCR",
                filename
            ))),
            None => Err(Error::UnsupportedFileType(filename.to_string())),
        }
    }

    /// Parse PDF document
    fn parse_pdf(filename: &str, data: &[u8]) -> Result<String> {
        let content = Self::extract_pdf_with_timeout(filename, data)?;
        let content = content
            .replace('\0', "")
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");

        tracing::debug!("Extracted {} chars from PDF {}", content.len(), filename);
        Ok(content)
    }

    /// Run pdf-extract on a separate thread so a hang or panic on odd fonts
    /// falls back to lopdf instead of taking the worker down.
    fn extract_pdf_with_timeout(filename: &str, data: &[u8]) -> Result<String> {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(Duration::from_secs(60)) {
            Ok(Ok(text)) => {
                let _ = handle.join();
                Ok(text)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                tracing::warn!("pdf-extract failed on {}: {}, trying fallback", filename, e);
                Self::extract_pdf_text_fallback(filename, data)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::error!("PDF extraction timeout after 60s for {}", filename);
                Self::extract_pdf_text_fallback(filename, data)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("PDF extraction thread crashed on {}", filename);
                Self::extract_pdf_text_fallback(filename, data)
            }
        }
    }

    /// Fallback PDF text extraction using lopdf directly
    fn extract_pdf_text_fallback(filename: &str, data: &[u8]) -> Result<String> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::extraction(filename, format!("Failed to load PDF: {}", e)))?;

        let mut all_text = String::new();
        for page_num in doc.get_pages().keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) if !text.trim().is_empty() => {
                    if !all_text.is_empty() {
                        all_text.push('\n');
                    }
                    all_text.push_str(&text);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Could not get text for page {} of {}: {}", page_num, filename, e);
                }
            }
        }

        if all_text.trim().is_empty() {
            tracing::warn!("Fallback extraction produced no text for {}, PDF may be image-based", filename);
        }
        Ok(all_text)
    }

    /// Parse DOCX document, one line per paragraph
    fn parse_docx(filename: &str, data: &[u8]) -> Result<String> {
        let paragraphs = docx_paragraphs(data).map_err(|e| Error::extraction(filename, e))?;
        let text = paragraphs.join("\n");
        tracing::debug!("Extracted {} chars from DOCX {}", text.len(), filename);
        Ok(text)
    }

    /// Parse Excel workbook: each sheet becomes a delimited block of CSV rows
    fn parse_excel(filename: &str, data: &[u8]) -> Result<String> {
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(data))
            .map_err(|e| Error::extraction(filename, e.to_string()))?;

        let mut sheets = Vec::new();
        for (index, sheet_name) in workbook.sheet_names().to_vec().into_iter().enumerate() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| Error::extraction(filename, format!("sheet '{}': {}", sheet_name, e)))?;

            let mut lines = vec![format!(
                "--- START EXCEL SHEET (File: {}, Sheet Index: {}, Sheet Name: {}) ---",
                filename, index, sheet_name
            )];

            if range.is_empty() {
                lines.push("(Sheet is empty)".to_string());
            } else {
                for row in range.rows() {
                    let cells: Vec<String> = row.iter().map(cell_to_string).collect();
                    lines.push(cells.join(","));
                }
            }

            lines.push(format!("--- END EXCEL SHEET (Sheet Name: {}) ---", sheet_name));
            sheets.push(lines.join("\n"));
        }

        let text = sheets.join("\n\n");
        tracing::debug!("Extracted {} chars (as CSVs) from Excel file {}", text.len(), filename);
        Ok(text)
    }
}

fn cell_to_string(cell: &calamine::Data) -> String {
    match cell {
        calamine::Data::Empty => String::new(),
        calamine::Data::String(s) => s.clone(),
        calamine::Data::Float(f) => f.to_string(),
        calamine::Data::Int(i) => i.to_string(),
        calamine::Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Text of every body paragraph of a DOCX package, in document order
pub fn docx_paragraphs(data: &[u8]) -> std::result::Result<Vec<String>, String> {
    let doc = docx_rs::read_docx(data).map_err(|e| e.to_string())?;

    let mut paragraphs = Vec::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            let mut text = String::new();
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        match child {
                            docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                            docx_rs::RunChild::Tab(_) => text.push('\t'),
                            docx_rs::RunChild::Break(_) => text.push('\n'),
                            _ => {}
                        }
                    }
                }
            }
            paragraphs.push(text);
        }
    }
    Ok(paragraphs)
}
