//! OpenAI-compatible HTTP backend.
//!
//! DeepSeek exposes the same chat-completions wire shape as OpenAI, so a
//! single backend covers both; only the base URL and API key differ.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{GenerationClient, GenerationRequest};
use crate::error::{GenerationError, GenerationResult};

/// Generation service provider, resolved from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    DeepSeek,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
        }
    }
}

/// Detect provider from a model name.
pub fn resolve_provider(model: &str) -> Provider {
    if model.to_lowercase().contains("deepseek") {
        Provider::DeepSeek
    } else {
        Provider::OpenAi
    }
}

/// Configuration for the generation client.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// OpenAI-compatible endpoint base (no trailing slash)
    pub openai_base_url: String,
    /// DeepSeek endpoint base (no trailing slash)
    pub deepseek_base_url: String,
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com/v1".to_string(),
            deepseek_base_url: "https://api.deepseek.com/v1".to_string(),
            openai_api_key: None,
            deepseek_api_key: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl GenerationConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            deepseek_base_url: std::env::var("DEEPSEEK_BASE_URL")
                .unwrap_or_else(|_| "https://api.deepseek.com/v1".to_string()),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            deepseek_api_key: std::env::var("DEEPSEEK_API_KEY").ok(),
            timeout: Duration::from_secs(
                std::env::var("GENERATION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }

}

// Chat-completions wire types (request side).

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// Chat-completions wire types (response side).

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// HTTP client for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiCompatClient {
    http: Client,
    config: GenerationConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: GenerationConfig) -> GenerationResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GenerationError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> GenerationResult<Self> {
        Self::new(GenerationConfig::from_env())
    }

    fn endpoint(&self, provider: Provider) -> GenerationResult<(String, &str)> {
        match provider {
            Provider::OpenAi => {
                let key = self.config.openai_api_key.as_deref().ok_or_else(|| {
                    GenerationError::Misconfigured("OPENAI_API_KEY is not set".to_string())
                })?;
                Ok((format!("{}/chat/completions", self.config.openai_base_url), key))
            }
            Provider::DeepSeek => {
                let key = self.config.deepseek_api_key.as_deref().ok_or_else(|| {
                    GenerationError::Misconfigured("DEEPSEEK_API_KEY is not set".to_string())
                })?;
                Ok((
                    format!("{}/chat/completions", self.config.deepseek_base_url),
                    key,
                ))
            }
        }
    }
}

#[async_trait]
impl GenerationClient for OpenAiCompatClient {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<serde_json::Value> {
        let provider = resolve_provider(&request.model);
        let (url, api_key) = self.endpoint(provider)?;

        debug!(
            provider = provider.as_str(),
            model = %request.model,
            "Sending generation request"
        );

        let body = ChatRequest {
            model: &request.model,
            temperature: request.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GenerationError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or(GenerationError::EmptyResponse)?;

        let value = parse_json_content(content)?;
        info!(provider = provider.as_str(), model = %request.model, "Got generation response");
        Ok(value)
    }
}

/// Parse model output as JSON, tolerating markdown code fences.
fn parse_json_content(content: &str) -> GenerationResult<serde_json::Value> {
    let text = content.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);

    serde_json::from_str(text.trim()).map_err(|e| GenerationError::MalformedJson(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> GenerationConfig {
        GenerationConfig {
            openai_base_url: server.uri(),
            deepseek_base_url: server.uri(),
            openai_api_key: Some("test-openai-key".to_string()),
            deepseek_api_key: Some("test-deepseek-key".to_string()),
            timeout: Duration::from_secs(5),
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn test_resolve_provider() {
        assert_eq!(resolve_provider("deepseek-chat"), Provider::DeepSeek);
        assert_eq!(resolve_provider("DeepSeek-Reasoner"), Provider::DeepSeek);
        assert_eq!(resolve_provider("gpt-4o"), Provider::OpenAi);
    }

    #[test]
    fn test_parse_json_content_strips_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(parse_json_content(fenced).unwrap(), json!({"a": 1}));

        let bare = "{\"a\": 1}";
        assert_eq!(parse_json_content(bare).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_parse_json_content_rejects_garbage() {
        assert!(matches!(
            parse_json_content("I could not produce JSON"),
            Err(GenerationError::MalformedJson(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("test-deepseek-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body("{\"persona\": \"runner\"}")),
            )
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(config_for(&server)).unwrap();
        let request = GenerationRequest::new("system", "user", "deepseek-chat");
        let value = client.generate(&request).await.unwrap();
        assert_eq!(value, json!({"persona": "runner"}));
    }

    #[tokio::test]
    async fn test_generate_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(config_for(&server)).unwrap();
        let request = GenerationRequest::new("system", "user", "gpt-4o");
        let err = client.generate(&request).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, GenerationError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_generate_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(config_for(&server)).unwrap();
        let request = GenerationRequest::new("system", "user", "gpt-4o");
        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::RateLimited));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_generate_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(config_for(&server)).unwrap();
        let request = GenerationRequest::new("system", "user", "gpt-4o");
        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_misconfigured() {
        let client = OpenAiCompatClient::new(GenerationConfig::default()).unwrap();
        let request = GenerationRequest::new("system", "user", "gpt-4o");
        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::Misconfigured(_)));
    }
}
