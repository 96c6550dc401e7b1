//! OpenAI chat completions client.
//!
//! One client per model: the CLI builds a light instance for keyword
//! summaries and query derivation, and a draft instance for the Writer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use writerpack_core::capabilities::{DraftModel, TextGenerator};
use writerpack_shared::{OpenAiConfig, Result, WriterPackError, require_env};

use crate::{build_client, endpoint, status_error, transport_error};

const SERVICE: &str = "openai";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client bound to a single model.
pub struct OpenAiChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    /// Client for the light generation role.
    pub fn light(config: &OpenAiConfig) -> Result<Self> {
        let key = require_env(&config.api_key_env, "OpenAI API key")?;
        Self::new(&config.base_url, key, &config.light_model, config.temperature)
    }

    /// Client for the draft role.
    pub fn drafting(config: &OpenAiConfig) -> Result<Self> {
        let key = require_env(&config.api_key_env, "OpenAI API key")?;
        Self::new(&config.base_url, key, &config.draft_model, config.temperature)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    pub async fn chat(&self, system: &str, prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !system.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "/v1/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(status_error(SERVICE, response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| WriterPackError::parse(format!("{SERVICE} response: {e}")))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(WriterPackError::EmptyResponse(SERVICE.into()));
        }
        debug!(chars = text.len(), "chat completion received");
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for OpenAiChat {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt).await
    }
}

#[async_trait]
impl DraftModel for OpenAiChat {
    async fn draft(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_system_and_user_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  hi there \n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiChat::new(server.uri(), "sk-test", "gpt-4o-mini", 0.7).unwrap();
        let text = client.complete("be brief", "hello").await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn omits_blank_system_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [{"role": "user", "content": "draft it"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "draft"}}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiChat::new(server.uri(), "k", "gpt-4o", 0.7).unwrap();
        assert_eq!(client.draft("", "draft it").await.unwrap(), "draft");
    }

    #[tokio::test]
    async fn rate_limit_is_retryable_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiChat::new(server.uri(), "k", "gpt-4o-mini", 0.7).unwrap();
        let err = client.complete("", "x").await.unwrap_err();
        match &err {
            WriterPackError::Http {
                service,
                status,
                message,
            } => {
                assert_eq!(service, "openai");
                assert_eq!(*status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn empty_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiChat::new(server.uri(), "k", "gpt-4o-mini", 0.7).unwrap();
        let err = client.complete("", "x").await.unwrap_err();
        assert!(matches!(err, WriterPackError::EmptyResponse(_)));
        assert!(!err.is_retryable());
    }
}
