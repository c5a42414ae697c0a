//! Error types for the report generation backend

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for report operations
pub type Result<T> = std::result::Result<T, Error>;

/// Report backend errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing template, bad settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload rejected before extraction
    #[error("{message}")]
    Validation { status: StatusCode, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Text extraction failed for a file
    #[error("Failed to extract text from '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// OCR binary failed
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Language model call failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// LLM output could not be parsed as JSON
    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    /// A generation step produced unusable output
    #[error("{0}")]
    Pipeline(String),

    /// Assembled prompt exceeds the configured budget
    #[error("Prompt too large or too many attachments ({0} chars)")]
    PromptTooLarge(usize),

    /// DOCX template injection failed
    #[error("Document builder error: {0}")]
    DocBuilder(String),

    /// Missing or wrong API key
    #[error("Invalid API Key")]
    Unauthorized,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// DOCX package (zip) error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a 400 validation error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Validation {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Create a 413 validation error
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::Validation {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: message.into(),
        }
    }

    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a pipeline error
    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::Pipeline(message.into())
    }

    /// Create a document builder error
    pub fn doc_builder(message: impl Into<String>) -> Self {
        Self::DocBuilder(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { status, .. } => *status,
            Error::UnsupportedFileType(_) => StatusCode::BAD_REQUEST,
            Error::PromptTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Pipeline(msg) if msg.contains("Prompt too large") => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Error::Pipeline(msg) if msg.contains("Malformed data") => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Validation { .. } => "validation_error",
            Error::UnsupportedFileType(_) => "unsupported_type",
            Error::Extraction { .. } => "extraction_error",
            Error::Ocr(_) => "ocr_error",
            Error::Llm(_) => "llm_error",
            Error::JsonParsing(_) => "json_parsing_error",
            Error::Pipeline(_) => "pipeline_error",
            Error::PromptTooLarge(_) => "prompt_too_large",
            Error::DocBuilder(_) => "doc_builder_error",
            Error::Unauthorized => "unauthorized",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Http(_) => "http_error",
            Error::Zip(_) => "zip_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Message prefix used when the error is reported on the event stream
    pub fn stream_message(&self) -> String {
        let category = match self {
            Error::Config(_) => "Configuration error",
            Error::Validation { .. } | Error::UnsupportedFileType(_) => "Input validation error",
            Error::Extraction { .. } | Error::Ocr(_) => "File extraction error",
            Error::Pipeline(_) | Error::PromptTooLarge(_) | Error::DocBuilder(_) => {
                "Pipeline processing error"
            }
            Error::Llm(_) | Error::Http(_) => "Language model processing error",
            Error::JsonParsing(_) | Error::Json(_) => "Data parsing error",
            _ => "An unexpected server error occurred",
        };
        format!("{}: {}", category, self)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, self);
        }

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
