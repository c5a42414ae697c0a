//! OpenAI-compatible chat completion client (OpenRouter by default)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::llm::LlmProvider;

/// System message sent with every completion
const JSON_ONLY_SYSTEM_PROMPT: &str = "Rispondi SOLO con un JSON valido e nient'altro.";

/// Statuses worth another attempt
const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Chat completion client with retry on transient failures
pub struct OpenAiCompatibleClient {
    client: Client,
    config: LlmConfig,
}

/// A failed attempt, tagged with whether retrying may help
struct AttemptError {
    error: Error,
    retryable: bool,
}

impl AttemptError {
    fn transient(error: Error) -> Self {
        Self { error, retryable: true }
    }

    fn fatal(error: Error) -> Self {
        Self { error, retryable: false }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    /// Create a new client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            tracing::warn!("No OPENROUTER_API_KEY configured; LLM calls will be rejected upstream");
        }

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Delay before retry number `attempt` (1-based): 2^attempt clamped to the configured window
    fn backoff(&self, attempt: u32) -> Duration {
        let secs = 2u64
            .saturating_pow(attempt)
            .clamp(self.config.backoff_min_secs, self.config.backoff_max_secs.max(self.config.backoff_min_secs));
        Duration::from_secs(secs)
    }

    /// Retry a request with exponential backoff, only for transient failures
    async fn retry_request<F, Fut, T>(&self, request_id: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, AttemptError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(failure) if failure.retryable && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "[{}] LLM request failed (attempt {}/{}): {}, retrying in {:?}",
                        request_id,
                        attempt,
                        max_attempts,
                        failure.error,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    tracing::error!("[{}] LLM request failed: {}", request_id, failure.error);
                    return Err(failure.error);
                }
            }
        }
    }

    async fn send_once(&self, prompt: &str, request_id: &str) -> std::result::Result<String, AttemptError> {
        let request = ChatRequest {
            model: &self.config.model_id,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: JSON_ONLY_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let mut builder = self
            .client
            .post(self.endpoint("chat/completions"))
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AttemptError::transient(Error::llm(format!("API request failed: {}", e))))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = Error::llm(format!("API error ({}): {}", status, body));
            return Err(if RETRYABLE_STATUSES.contains(&status) {
                AttemptError::transient(error)
            } else {
                AttemptError::fatal(error)
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::fatal(Error::llm(format!("Failed to parse API response: {}", e))))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AttemptError::fatal(Error::llm("No choices in API response")))?
            .message
            .content
            .unwrap_or_default()
            .trim()
            .to_string();

        tracing::debug!("[{}] LLM response received, length: {} chars", request_id, content.len());
        Ok(content)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request_id = Uuid::new_v4().to_string();
        tracing::info!(
            "[{}] Making LLM API call with model: {}",
            request_id,
            self.config.model_id
        );
        self.retry_request(&request_id, || self.send_once(prompt, &request_id))
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        let mut builder = self.client.get(self.endpoint("models"));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        match builder.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.config.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct Script {
        calls: Arc<AtomicUsize>,
        statuses: Arc<Vec<u16>>,
    }

    async fn chat(State(script): State<Script>, headers: HeaderMap, Json(body): Json<Value>) -> (axum::http::StatusCode, Json<Value>) {
        let n = script.calls.fetch_add(1, Ordering::SeqCst);
        let status = script.statuses.get(n).copied().unwrap_or(200);
        assert_eq!(headers["x-title"], "bot-perito");
        assert_eq!(body["messages"][0]["role"], "system");
        let code = axum::http::StatusCode::from_u16(status).unwrap();
        (
            code,
            Json(json!({ "choices": [{ "message": { "content": "  {\"ok\": true}  " } }] })),
        )
    }

    async fn serve(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = Script {
            calls: calls.clone(),
            statuses: Arc::new(statuses),
        };
        let app = Router::new().route("/chat/completions", post(chat)).with_state(script);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            backoff_min_secs: 0,
            backoff_max_secs: 0,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retries_transient_status_then_succeeds() {
        let (url, calls) = serve(vec![503, 429]).await;
        let client = OpenAiCompatibleClient::new(&config(url)).unwrap();

        let text = client.complete("prompt").await.unwrap();
        assert_eq!(text, "{\"ok\": true}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (url, calls) = serve(vec![500, 502, 504, 200]).await;
        let client = OpenAiCompatibleClient::new(&config(url)).unwrap();

        let err = client.complete("prompt").await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let (url, calls) = serve(vec![401]).await;
        let client = OpenAiCompatibleClient::new(&config(url)).unwrap();

        assert!(client.complete("prompt").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_window() {
        let client = OpenAiCompatibleClient::new(&LlmConfig::default()).unwrap();
        assert_eq!(client.backoff(1), Duration::from_secs(2));
        assert_eq!(client.backoff(2), Duration::from_secs(4));
        assert_eq!(client.backoff(5), Duration::from_secs(10));
    }
}
