//! HTTP server for report generation

pub mod auth;
pub mod routes;
pub mod state;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::cleanup::spawn_cleanup_task;
use crate::config::ReportConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Report HTTP server
pub struct ReportServer {
    config: ReportConfig,
    state: AppState,
}

impl ReportServer {
    /// Create a new server with the configured providers
    pub async fn new(config: ReportConfig) -> Result<Self> {
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    /// Create a server around prepared state
    pub fn with_state(state: AppState) -> Self {
        Self {
            config: state.config().clone(),
            state,
        }
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .config
            .server
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
            .allow_headers(Any)
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api = routes::api_routes(self.config.server.max_upload_size).route_layer(
            middleware::from_fn_with_state(self.state.clone(), auth::require_api_key),
        );

        Router::new()
            // Health check (no API key)
            .route("/health", get(health_check))
            .nest("/api", api)
            .with_state(self.state.clone())
            // Middleware layers (order matters - applied bottom to top)
            .layer(TraceLayer::new_for_http())
            .layer(self.cors_layer())
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .server
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let _cleanup = spawn_cleanup_task(self.config.cleanup.clone());
        let router = self.build_router();

        tracing::info!("Starting report server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateConfig;
    use crate::providers::NoopRetriever;
    use crate::test_support::{build_docx, ScriptedLlm};
    use crate::types::{EventType, StreamEvent};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    const KEY: &str = "secret";

    fn router(dir: &tempfile::TempDir, api_key: Option<&str>, responses: Vec<&str>) -> Router {
        let template_path = dir.path().join("template.docx");
        std::fs::write(&template_path, build_docx(&["{{CLIENT}}", "{{COMMENTO}}"])).unwrap();

        let mut config = ReportConfig {
            template: TemplateConfig {
                template_path,
                reference_dir: dir.path().join("reference"),
                ..TemplateConfig::default()
            },
            ..ReportConfig::default()
        };
        config.server.api_key = api_key.map(str::to_string);

        let state = AppState::with_providers(config, Arc::new(ScriptedLlm::new(responses)), Arc::new(NoopRetriever));
        ReportServer::with_state(state).build_router()
    }

    fn json_request(uri: &str, key: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(&dir, Some(KEY), vec![])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_api_key_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = json!({"client": "ACME"});

        let wrong = router(&dir, Some(KEY), vec![])
            .oneshot(json_request("/api/finalize-report", Some("nope"), ctx.clone()))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

        let unconfigured = router(&dir, None, vec![])
            .oneshot(json_request("/api/finalize-report", Some(KEY), ctx))
            .await
            .unwrap();
        assert_eq!(unconfigured.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_finalize_returns_docx_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(&dir, Some(KEY), vec![])
            .oneshot(json_request(
                "/api/finalize-report?request_id=abc",
                Some(KEY),
                json!({"client": "ACME", "commento": "Primo\n\nSecondo", "allegati": ["Nolo", "Fattura"]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=report.docx"
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            crate::template::DOCX_MEDIA_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_generate_streams_ndjson() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(
            &dir,
            Some(KEY),
            vec![
                r#"{"client": "ACME", "polizza": "P", "data_danno": "d", "assicurato": "a", "luogo": "l", "cause": "c"}"#,
                r#"[{"section": "commento", "title": "Commento", "bullets": []}]"#,
                r#"{"commento": "Testo"}"#,
                r#"{"commento": "Testo finale"}"#,
            ],
        );

        let boundary = "XBOUNDARYX";
        let docx = build_docx(&["Fattura numero 12"]);
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"notes\"\r\n\r\nNota utente\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"fattura.docx\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                b = boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(&docx);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let request = Request::post("/api/generate")
            .header("X-API-Key", KEY)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-ndjson");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let events: Vec<StreamEvent> = std::str::from_utf8(&body)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(events.first().unwrap().event_type, EventType::Status);
        assert_eq!(events.last().unwrap().event_type, EventType::Finished);
        let data = events.iter().find(|e| e.event_type == EventType::Data).unwrap();
        assert_eq!(data.payload.as_ref().unwrap()["commento"], "Testo finale");
    }

    #[tokio::test]
    async fn test_clarification_pipeline_failure_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let payload = json!({
            "clarifications": {"polizza": "P1"},
            "request_artifacts": {
                "original_corpus": "corpus",
                "notes": "",
                "template_excerpt": "exc",
                "reference_style_text": "",
                "initial_llm_base_fields": {"polizza": null}
            }
        });

        let response = router(&dir, Some(KEY), vec!["[]"])
            .oneshot(json_request("/api/generate-with-clarifications", Some(KEY), payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["error"]["type"], "pipeline_error");
    }
}
