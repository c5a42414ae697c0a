//! Streaming report generation endpoint

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::convert::Infallible;
use tokio_stream::StreamExt;

use crate::error::{Error, Result};
use crate::ingestion::UploadedFile;
use crate::server::state::AppState;

pub const NDJSON_MEDIA_TYPE: &str = "application/x-ndjson";

/// POST /api/generate - upload files and notes, stream NDJSON progress events
pub async fn generate(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response> {
    let mut files = Vec::new();
    let mut notes = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::bad_request(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "notes" => {
                notes = field
                    .text()
                    .await
                    .map_err(|e| Error::bad_request(format!("Failed to read notes: {}", e)))?;
            }
            "files" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(|e| {
                    Error::bad_request(format!("Failed to read file '{}': {}", filename, e))
                })?;
                tracing::debug!("Received upload: {} ({} bytes)", filename, data.len());
                files.push(UploadedFile::new(filename, data));
            }
            other => {
                tracing::debug!("Ignoring unknown multipart field '{}'", other);
            }
        }
    }

    let events = state
        .generator()
        .stream_report_generation(files, notes)
        .map(|event| Ok::<_, Infallible>(Bytes::from(event.to_ndjson_line())));

    Ok((
        [(header::CONTENT_TYPE, NDJSON_MEDIA_TYPE)],
        Body::from_stream(events),
    )
        .into_response())
}
