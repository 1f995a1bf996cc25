//! Google Gemini native provider implementation.
//!
//! Uses the `streamGenerateContent` endpoint with `alt=sse`.
//!
//! Features:
//! - `x-goog-api-key` header authentication
//! - System instruction as a top-level field
//! - Structured output via `responseMimeType` + `responseSchema`
//! - Thought parts are dropped from the concatenated text

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tilecast_core::error::ProviderError;
use tilecast_core::model::{ModelClient, StructuredRequest};
use tracing::{debug, trace};

use crate::sse;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    /// Thinking budget in tokens; `-1` lets the model decide.
    thinking_budget: Option<i32>,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // thinking models can be slow
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
            thinking_budget: Some(-1),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the thinking budget, or `None` to omit the thinking config.
    pub fn with_thinking_budget(mut self, budget: Option<i32>) -> Self {
        self.thinking_budget = budget;
        self
    }

    fn request_body(&self, request: &StructuredRequest) -> Value {
        let mut generation_config = json!({
            "responseMimeType": "application/json",
            "responseSchema": to_gemini_schema(&request.schema),
        });
        if let Some(temperature) = request.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(budget) = self.thinking_budget {
            generation_config["thinkingConfig"] = json!({ "thinkingBudget": budget });
        }

        json!({
            "systemInstruction": { "parts": [{ "text": request.instructions }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation_config,
        })
    }

    /// Concatenated non-thought text of one streamed chunk.
    fn chunk_text(chunk: &StreamChunk) -> String {
        chunk
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Translate a JSON Schema into Gemini's schema dialect (upper-case type
/// names; only the keys Gemini understands are kept).
pub fn to_gemini_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };

    let mut out = serde_json::Map::new();
    for (key, value) in obj {
        match key.as_str() {
            "type" => {
                let upper = value.as_str().map(str::to_uppercase).unwrap_or_default();
                out.insert("type".into(), json!(upper));
            }
            "properties" => {
                let props = value
                    .as_object()
                    .map(|p| {
                        p.iter()
                            .map(|(name, s)| (name.clone(), to_gemini_schema(s)))
                            .collect::<serde_json::Map<_, _>>()
                    })
                    .unwrap_or_default();
                out.insert("properties".into(), Value::Object(props));
            }
            "items" => {
                out.insert("items".into(), to_gemini_schema(value));
            }
            "required" | "description" | "enum" | "format" | "nullable" => {
                out.insert(key.clone(), value.clone());
            }
            _ => {}
        }
    }
    Value::Object(out)
}

#[async_trait]
impl ModelClient for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: StructuredRequest) -> Result<String, ProviderError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, request.model
        );
        let body = self.request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = sse::check_status(response, &self.name).await?;

        let mut text = String::new();
        sse::drain(response, |data| {
            match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => text.push_str(&Self::chunk_text(&chunk)),
                Err(e) => trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk"),
            }
            true
        })
        .await?;

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}
