//! API routes for the report server

pub mod clarify;
pub mod finalize;
pub mod generate;

use axum::{
    extract::DefaultBodyLimit,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;

use crate::server::state::AppState;
use crate::template::{DEFAULT_REPORT_FILENAME, DOCX_MEDIA_TYPE};

/// Build all API routes
///
/// Uploads and clarification payloads (which carry the whole corpus) share
/// one body limit.
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Streaming generation from multipart uploads
        .route("/generate", post(generate::generate))
        // Second round after `clarification_needed`
        .route(
            "/generate-with-clarifications",
            post(clarify::generate_with_clarifications),
        )
        // DOCX from a client-edited context
        .route("/finalize-report", post(finalize::finalize_report))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_size))
}

/// Optional `?request_id=` used to correlate logs with an earlier stream
#[derive(Debug, Default, Deserialize)]
pub struct RequestIdQuery {
    pub request_id: Option<String>,
}

impl RequestIdQuery {
    pub fn resolve(self) -> String {
        self.request_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

/// Word document attachment response
pub fn docx_response(bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, DOCX_MEDIA_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", DEFAULT_REPORT_FILENAME),
            ),
        ],
        bytes,
    )
        .into_response()
}
