use super::models::{Model, Usage, UsageMeter};
use super::{GenerationRequest, TextGenerator};
use crate::config::Config;
use crate::util::truncate_str;
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenRouter chat completions endpoint
pub(crate) const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Rate limit retry configuration
pub(crate) const MAX_RETRIES: u32 = 3;
pub(crate) const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
pub(crate) const BACKOFF_MULTIPLIER: u64 = 2; // Exponential backoff
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-", // OpenRouter key prefix
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

/// Response format configuration for OpenRouter structured output
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<JsonSchemaWrapper>,
}

#[derive(Serialize)]
struct JsonSchemaWrapper {
    name: String,
    /// Generators drift from the schema; the extractor cleans up afterwards.
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Content can be null in some API responses (e.g., when refusal or error occurs)
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenRouter sometimes reports upstream failures with a 200 status.
#[derive(Deserialize)]
struct OpenRouterError {
    error: OpenRouterApiError,
}

#[derive(Deserialize)]
struct OpenRouterApiError {
    message: String,
    #[serde(default)]
    code: Option<i32>,
}

/// Extract retry-after hint from OpenRouter response (if present)
fn parse_retry_after(text: &str) -> Option<u64> {
    // Look for patterns like "retry after X seconds"
    let text_lower = text.to_lowercase();
    if let Some(pos) = text_lower.find("retry") {
        let after_retry = &text_lower[pos..];
        for word in after_retry.split_whitespace().skip(1).take(5) {
            if let Ok(secs) = word.trim_matches(|c: char| !c.is_numeric()).parse::<u64>() {
                if secs > 0 && secs < 300 {
                    return Some(secs);
                }
            }
        }
    }
    None
}

pub(crate) fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let ms = INITIAL_BACKOFF_MS.saturating_mul(factor);
    let secs = ms / 1000;
    if secs == 0 {
        1
    } else {
        secs
    }
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn map_timeout_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        anyhow!("OpenRouter request timed out. Please try again.")
    } else if err.is_connect() {
        anyhow!("Could not connect to OpenRouter. Check your network and try again.")
    } else {
        err.into()
    }
}

/// Create a configured HTTP client for OpenRouter requests
pub(crate) fn create_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))
}

/// [`TextGenerator`] backed by OpenRouter chat completions.
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    smart_model: String,
    speed_model: String,
    meter: UsageMeter,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: create_http_client(REQUEST_TIMEOUT_SECS)?,
            api_key: api_key.into(),
            endpoint: OPENROUTER_URL.to_string(),
            smart_model: Model::Smart.default_id().to_string(),
            speed_model: Model::Speed.default_id().to_string(),
            meter: UsageMeter::default(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.get_api_key().ok_or_else(|| {
            anyhow!(
                "No API key configured. Set OPENROUTER_API_KEY or add it to {}",
                Config::config_location()
            )
        })?;
        let mut client = Self::new(api_key)?;
        client.http = create_http_client(config.request_timeout_secs)?;
        client.smart_model = config.model_id(Model::Smart);
        client.speed_model = config.model_id(Model::Speed);
        if let Some(endpoint) = config.openrouter_url.as_ref() {
            client.endpoint = endpoint.clone();
        }
        Ok(client)
    }

    /// Point the client at a different chat-completions URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model_id(&self, model: Model) -> &str {
        match model {
            Model::Smart => &self.smart_model,
            Model::Speed => &self.speed_model,
        }
    }

    /// Usage summed over every successful call made by this client.
    pub fn usage(&self) -> Usage {
        self.meter.snapshot()
    }

    pub fn call_count(&self) -> u64 {
        self.meter.calls()
    }

    async fn complete(&self, request: GenerationRequest) -> Result<String> {
        let response_format = request.schema_hint.map(|hint| ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: Some(JsonSchemaWrapper {
                name: hint.name.to_string(),
                strict: false,
                schema: hint.schema,
            }),
        });

        let body = ChatRequest {
            model: self.model_id(request.model).to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: request.system,
                },
                Message {
                    role: "user".to_string(),
                    content: request.prompt,
                },
            ],
            max_tokens: request.model.max_tokens(),
            stream: false,
            temperature: request.deterministic.then_some(0.0),
            response_format,
        };

        tracing::debug!(
            purpose = request.purpose.as_str(),
            model = %body.model,
            "sending generation request"
        );

        let text = self.send_with_retry(&body).await?;

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            anyhow!(
                "Failed to parse OpenRouter response: {}\n{}",
                e,
                sanitize_api_response(&text)
            )
        })?;

        if let Some(usage) = parsed.usage.as_ref() {
            self.meter.record(usage);
            tracing::debug!(
                purpose = request.purpose.as_str(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost = usage.cost(),
                "generation usage"
            );
        }

        let choice = parsed.choices.first();
        if let Some(refusal) = choice.and_then(|c| c.message.refusal.as_ref()) {
            return Err(anyhow!(
                "Request was refused: {}",
                truncate_str(refusal, MAX_ERROR_CONTENT_LEN)
            ));
        }

        let content = choice
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(anyhow!(
                "API returned empty response for the {} step",
                request.purpose.as_str()
            ));
        }
        Ok(content)
    }

    /// POST with retries on network errors, 429, 5xx and OpenRouter's
    /// 200-with-error bodies. Returns the raw response text.
    async fn send_with_retry<T: Serialize>(&self, request_body: &T) -> Result<String> {
        let mut last_error = String::new();
        let mut retry_count = 0;

        while retry_count <= MAX_RETRIES {
            let response = match self
                .http
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .header("X-Title", "sample-health")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(request_body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    last_error = err.to_string();
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        let retry_after = backoff_secs(retry_count);
                        tracing::warn!(
                            retry_after,
                            attempt = retry_count,
                            "network error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        continue;
                    }
                    return Err(map_timeout_error(err));
                }
            };

            let status = response.status();
            let text = response
                .text()
                .await
                .context("Failed to read OpenRouter response body")?;

            if status.is_success() {
                if let Ok(err_resp) = serde_json::from_str::<OpenRouterError>(&text) {
                    let is_retryable = err_resp
                        .error
                        .code
                        .map(|c| c >= 500 || c == 429)
                        .unwrap_or(true);

                    if is_retryable && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                        continue;
                    }

                    return Err(anyhow!(
                        "OpenRouter error: {}",
                        truncate_str(&err_resp.error.message, MAX_ERROR_CONTENT_LEN)
                    ));
                }

                return Ok(text);
            }

            last_error = sanitize_api_response(&text);

            if status.as_u16() == 429 && retry_count < MAX_RETRIES {
                retry_count += 1;
                let retry_after =
                    parse_retry_after(&text).unwrap_or_else(|| backoff_secs(retry_count));
                tracing::warn!(
                    retry_after,
                    attempt = retry_count,
                    max = MAX_RETRIES,
                    "OpenRouter rate limited, retrying"
                );
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            if status.is_server_error() && retry_count < MAX_RETRIES {
                retry_count += 1;
                let retry_after = backoff_secs(retry_count);
                tracing::warn!(
                    %status,
                    retry_after,
                    attempt = retry_count,
                    "server error, retrying"
                );
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            let error_msg = match status.as_u16() {
                401 => "Invalid API key. Check OPENROUTER_API_KEY.".to_string(),
                429 => format!(
                    "Rate limited by OpenRouter after {} retries. Try again in a few minutes.",
                    retry_count
                ),
                500..=599 => format!(
                    "OpenRouter server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("API error {}: {}", status, sanitize_api_response(&text)),
            };
            return Err(anyhow!("{}", error_msg));
        }

        Err(anyhow!("{}", last_error))
    }
}

impl TextGenerator for OpenRouterClient {
    fn generate<'a>(&'a self, request: GenerationRequest) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.complete(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Purpose;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenRouterClient {
        OpenRouterClient::new("test-key")
            .unwrap()
            .with_endpoint(format!("{}/api/v1/chat/completions", server.uri()))
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(Purpose::Review, Model::Smart, "system", "user")
    }

    #[test]
    fn test_backoff_is_exponential_with_floor() {
        assert_eq!(backoff_secs(0), 2);
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(3), 8);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("Please retry after 12 seconds"), Some(12));
        assert_eq!(parse_retry_after("Retry in 999 seconds"), None);
        assert_eq!(parse_retry_after("slow down"), None);
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        assert!(sanitize_api_response("bad key sk-or-123").contains("redacted"));
        assert_eq!(sanitize_api_response("model not found"), "model not found");
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            max_tokens: 10,
            stream: false,
            temperature: Some(0.0),
            response_format: Some(ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: Some(JsonSchemaWrapper {
                    name: "x".to_string(),
                    strict: false,
                    schema: json!({"type": "object"}),
                }),
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["temperature"], json!(0.0));
        assert_eq!(value["response_format"]["type"], json!("json_schema"));
        assert_eq!(value["response_format"]["json_schema"]["name"], json!("x"));
    }

    #[tokio::test]
    async fn test_generate_returns_content_and_records_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "google/gemini-2.5-pro", "temperature": 0.0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "looks good"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15, "total_cost": 0.001}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client.generate(request()).await.unwrap();
        assert_eq!(text, "looks good");
        assert_eq!(client.usage().total_tokens, 15);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_schema_hint_sets_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "response_format": {"type": "json_schema", "json_schema": {"name": "assessment"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let req = GenerationRequest::new(Purpose::Format, Model::Speed, "s", "u")
            .with_schema("assessment", json!({"type": "object"}));
        assert_eq!(client.generate(req).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).generate(request()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[tokio::test]
    async fn test_non_retryable_error_body_with_ok_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"message": "context too long", "code": 400}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).generate(request()).await.unwrap_err();
        assert!(err.to_string().contains("context too long"));
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null}}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).generate(request()).await.unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }
}
