//! Gemini research client with Google Search grounding.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use writerpack_core::capabilities::ResearchModel;
use writerpack_shared::{GeminiConfig, Result, WriterPackError, require_env};

use crate::{build_client, endpoint, status_error, transport_error};

const SERVICE: &str = "gemini";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    tools: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    uri: String,
    #[serde(default)]
    title: Option<String>,
}

/// Retrieval-enabled research model.
pub struct GeminiResearch {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiResearch {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &GeminiConfig) -> Result<Self> {
        let key = require_env(&config.api_key_env, "Gemini API key")?;
        Self::new(&config.base_url, key, &config.model)
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart { text: prompt }],
            }],
            tools: vec![json!({ "google_search": {} })],
        };
        let url = endpoint(
            &self.base_url,
            &format!("/v1beta/models/{}:generateContent", self.model),
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(status_error(SERVICE, response).await);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| WriterPackError::parse(format!("{SERVICE} response: {e}")))?;

        let Some(candidate) = body.candidates.into_iter().next() else {
            return Err(WriterPackError::EmptyResponse(SERVICE.into()));
        };

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(WriterPackError::EmptyResponse(SERVICE.into()));
        }

        let grounding: Vec<WebSource> = candidate
            .grounding_metadata
            .map(|g| g.grounding_chunks.into_iter().filter_map(|c| c.web).collect())
            .unwrap_or_default();
        debug!(chars = text.len(), grounding = grounding.len(), "research received");

        Ok(with_grounding_sources(text, &grounding))
    }
}

/// Append grounding sources when the answer itself cites no URLs.
fn with_grounding_sources(text: &str, grounding: &[WebSource]) -> String {
    if grounding.is_empty() || text.contains("http://") || text.contains("https://") {
        return text.to_string();
    }
    let mut out = format!("{text}\n\nSources:\n");
    for source in grounding {
        match source.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => out.push_str(&format!("- [{title}]({})\n", source.uri)),
            None => out.push_str(&format!("- {}\n", source.uri)),
        }
    }
    out
}

#[async_trait]
impl ResearchModel for GeminiResearch {
    async fn research(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}
