//! Report generation after the user answered the clarification questions

use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::ClarificationPayload;

use super::{docx_response, RequestIdQuery};

/// POST /api/generate-with-clarifications - returns the finished DOCX
pub async fn generate_with_clarifications(
    State(state): State<AppState>,
    Query(query): Query<RequestIdQuery>,
    Json(payload): Json<ClarificationPayload>,
) -> Result<Response> {
    let request_id = query.resolve();
    tracing::info!(
        "[{}] Received clarifications for {} fields",
        request_id,
        payload.clarifications.len()
    );

    let generator = state.generator();
    let ctx = generator
        .build_report_with_clarifications(payload, &request_id)
        .await
        .map_err(|e| {
            tracing::error!(
                "[{}] Report generation failed after clarifications: {}",
                request_id,
                e
            );
            e
        })?;

    let bytes = generator.render_docx(&ctx, &request_id).await?;
    Ok(docx_response(bytes))
}
