//! Render a client-edited context into the DOCX template

use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::ReportContext;

use super::{docx_response, RequestIdQuery};

/// POST /api/finalize-report
pub async fn finalize_report(
    State(state): State<AppState>,
    Query(query): Query<RequestIdQuery>,
    Json(ctx): Json<ReportContext>,
) -> Result<Response> {
    let request_id = query.resolve();
    tracing::info!("[{}] Finalizing report from client context", request_id);

    let bytes = state.generator().render_docx(&ctx, &request_id).await?;
    Ok(docx_response(bytes))
}
