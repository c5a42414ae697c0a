//! Upload validation: extension, size and content-type checks

use bytes::Bytes;

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};

/// Extensions accepted by the generation endpoint
pub const ALLOWED_EXTENSIONS: [&str; 7] = [".pdf", ".docx", ".xlsx", ".xls", ".png", ".jpg", ".jpeg"];

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";

/// A file received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// Lowercased extension including the leading dot (`".pdf"`), or empty
    pub fn extension(&self) -> String {
        extension_of(&self.filename)
    }
}

/// Lowercased extension including the leading dot
pub fn extension_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext.to_lowercase()),
        None => String::new(),
    }
}

/// MIME type the sniffed content must match for an extension
pub(crate) fn expected_mime(ext: &str) -> Option<&'static str> {
    match ext {
        ".pdf" => Some("application/pdf"),
        ".docx" => Some(DOCX_MIME),
        ".xlsx" => Some(XLSX_MIME),
        ".xls" => Some(XLS_MIME),
        ".png" => Some("image/png"),
        ".jpg" | ".jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// Whether a sniffed MIME type is acceptable for the extension.
///
/// OOXML packages are plain zip archives at the byte level; when the sniffer
/// cannot see the `word/` or `xl/` parts it reports `application/zip`.
/// Legacy `.xls` files are OLE compound documents.
fn mime_matches(ext: &str, detected: &str) -> bool {
    match expected_mime(ext) {
        Some(expected) if expected == detected => true,
        Some(_) => match ext {
            ".docx" | ".xlsx" => detected == "application/zip",
            ".xls" => detected == "application/x-ole-storage",
            _ => false,
        },
        None => false,
    }
}

/// Validate a single upload
pub fn validate_file(file: &UploadedFile, limits: &ExtractionConfig, request_id: &str) -> Result<()> {
    let ext = file.extension();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        tracing::warn!(
            "[{}] Rejected file with invalid extension: {} for file {}",
            request_id,
            ext,
            file.filename
        );
        return Err(Error::bad_request(format!(
            "Tipo file non supportato ('{}'). Estensioni permesse: {}",
            file.filename,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    let size = file.data.len();
    if size == 0 {
        tracing::warn!("[{}] Rejected empty file: {}", request_id, file.filename);
        return Err(Error::bad_request(format!(
            "Il file '{}' è vuoto e non può essere processato.",
            file.filename
        )));
    }

    if size > limits.max_file_size {
        tracing::warn!(
            "[{}] Rejected file exceeding size limit: {} ({} bytes)",
            request_id,
            file.filename,
            size
        );
        return Err(Error::payload_too_large(format!(
            "File '{}' troppo grande ({}MB). Limite per file: {}MB",
            file.filename,
            size / (1024 * 1024),
            limits.max_file_size / (1024 * 1024)
        )));
    }

    let detected = infer::get(&file.data)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");

    if !mime_matches(&ext, detected) {
        let expected = expected_mime(&ext).unwrap_or("unknown");
        tracing::warn!(
            "[{}] Rejected file with mismatched content type: {}. Expected: {}, Got: {}",
            request_id,
            file.filename,
            expected,
            detected
        );
        return Err(Error::bad_request(format!(
            "Il contenuto del file '{}' (rilevato: {}) non corrisponde all'estensione '{}' (atteso: {}).",
            file.filename, detected, ext, expected
        )));
    }

    tracing::debug!(
        "[{}] File validation successful: {} ({} bytes, MIME: {})",
        request_id,
        file.filename,
        size,
        detected
    );
    Ok(())
}

/// Validate a whole upload batch: count, each file, then total size
pub fn validate_batch(files: &[UploadedFile], limits: &ExtractionConfig, request_id: &str) -> Result<()> {
    if files.len() > limits.max_files {
        tracing::warn!(
            "[{}] Upload rejected: too many files ({} > {})",
            request_id,
            files.len(),
            limits.max_files
        );
        return Err(Error::payload_too_large(format!(
            "Puoi processare al massimo {} file alla volta.",
            limits.max_files
        )));
    }

    for file in files {
        validate_file(file, limits, request_id)?;
    }

    let total: usize = files.iter().map(|f| f.data.len()).sum();
    if total > limits.max_total_size {
        tracing::warn!(
            "[{}] Total data size exceeds limit: {} bytes > {} bytes",
            request_id,
            total,
            limits.max_total_size
        );
        return Err(Error::payload_too_large(format!(
            "La dimensione totale dei file ({}MB) supera il limite di {}MB.",
            total / (1024 * 1024),
            limits.max_total_size / (1024 * 1024)
        )));
    }

    Ok(())
}
