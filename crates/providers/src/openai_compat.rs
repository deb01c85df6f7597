//! OpenAI-compatible chat completions client.
//!
//! Works with: Gemini (via its OpenAI endpoint), OpenAI, OpenRouter,
//! Ollama, Groq and any other `/chat/completions` endpoint.

use async_trait::async_trait;
use hemobank_core::error::ProviderError;
use hemobank_core::message::Message;
use hemobank_core::provider::{ProviderRequest, ProviderResponse, Usage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Gemini's OpenAI-compatible base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::new("gemini", GEMINI_BASE_URL, api_key)
    }

    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"), "ollama")
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    fn check_status(status: u16, body: String) -> Result<(), ProviderError> {
        match status {
            200..=299 => Ok(()),
            429 => Err(ProviderError::RateLimited { retry_after_secs: 5 }),
            401 | 403 => Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            )),
            _ => {
                warn!(status, body = %body, "Provider returned error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message: body,
                })
            }
        }
    }

    fn into_response(api: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage: api.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: api.model,
        })
    }
}

#[async_trait]
impl hemobank_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{}: no API key configured",
                self.name
            )));
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            Self::check_status(status, body)?;
            unreachable!("check_status returns Err for non-2xx statuses");
        }

        let api: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: status,
            message: format!("Failed to parse response: {e}"),
        })?;

        Self::into_response(api)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: String,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemobank_core::Provider;
    use hemobank_core::message::Role;

    #[test]
    fn gemini_constructor() {
        let p = OpenAiCompatProvider::gemini("key");
        assert_eq!(p.name(), "gemini");
        assert_eq!(p.base_url(), GEMINI_BASE_URL);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let p = OpenAiCompatProvider::ollama(Some("http://localhost:11434/v1/"));
        assert_eq!(p.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn request_body_carries_prompt_and_temperature() {
        let req = ProviderRequest::prompt("gemini-1.5-flash", "Classify: I need blood", 0.0);
        let body = OpenAiCompatProvider::request_body(&req);

        assert_eq!(body["model"], "gemini-1.5-flash");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Classify: I need blood");
        assert_eq!(body["stream"], false);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn parse_completion_response() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "1"}}],
            "model": "gemini-1.5-flash",
            "usage": {"prompt_tokens": 120, "completion_tokens": 1, "total_tokens": 121}
        }"#;
        let api: ApiResponse = serde_json::from_str(json).unwrap();
        let resp = OpenAiCompatProvider::into_response(api).unwrap();

        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.message.content, "1");
        assert_eq!(resp.usage.unwrap().total_tokens, 121);
    }

    #[test]
    fn empty_choices_is_an_error() {
        let api: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            OpenAiCompatProvider::into_response(api),
            Err(ProviderError::ApiError { .. })
        ));
    }

    #[test]
    fn status_codes_map_to_errors() {
        assert!(OpenAiCompatProvider::check_status(200, String::new()).is_ok());
        assert!(matches!(
            OpenAiCompatProvider::check_status(429, String::new()),
            Err(ProviderError::RateLimited { .. })
        ));
        assert!(matches!(
            OpenAiCompatProvider::check_status(401, String::new()),
            Err(ProviderError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            OpenAiCompatProvider::check_status(500, "boom".into()),
            Err(ProviderError::ApiError { status_code: 500, .. })
        ));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let p = OpenAiCompatProvider::gemini("");
        let err = p
            .complete(ProviderRequest::prompt("gemini-1.5-flash", "hi", 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
