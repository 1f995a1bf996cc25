//! ModelClient trait: the abstraction over hosted completion APIs.
//!
//! A model client takes one instruction string, one prompt and an output
//! schema, streams a structured completion, and returns the concatenated
//! text. It does not parse or validate what comes back.
//!
//! Implementations: Gemini, OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// One structured completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRequest {
    /// The model to use (e.g., "gemini-2.5-pro")
    pub model: String,

    /// System instructions
    pub instructions: String,

    /// The single user turn
    pub prompt: String,

    /// JSON Schema the output must follow, enforced by the provider
    pub schema: serde_json::Value,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// The core model client trait.
///
/// The generation loop calls `generate()` without knowing which provider
/// is behind it.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini").
    fn name(&self) -> &str;

    /// Run one streamed completion and return the full concatenated text.
    ///
    /// An empty stream is `ProviderError::EmptyResponse`.
    async fn generate(&self, request: StructuredRequest) -> Result<String, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ModelClient for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: StructuredRequest) -> Result<String, ProviderError> {
            if request.prompt.is_empty() {
                return Err(ProviderError::EmptyResponse);
            }
            Ok(request.prompt)
        }
    }

    fn request(prompt: &str) -> StructuredRequest {
        StructuredRequest {
            model: "echo-1".into(),
            instructions: "be brief".into(),
            prompt: prompt.into(),
            schema: serde_json::json!({"type": "object"}),
            temperature: None,
        }
    }

    #[tokio::test]
    async fn trait_object_dispatch() {
        let client: Box<dyn ModelClient> = Box::new(Echo);
        assert_eq!(client.generate(request("hi")).await.unwrap(), "hi");
        assert!(client.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn empty_text_is_an_error() {
        let err = Echo.generate(request("")).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[test]
    fn request_serialization_skips_missing_temperature() {
        let json = serde_json::to_value(request("x")).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["model"], "echo-1");
    }
}
