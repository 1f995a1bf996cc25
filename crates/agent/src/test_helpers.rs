//! Scripted doubles for loop tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::json;
use tilecast_core::error::ProviderError;
use tilecast_core::{CallResult, EndpointInvoker, FetchRequest, ModelClient, StructuredRequest};
use tokio::sync::Mutex;

/// A model client that replays a fixed list of responses.
///
/// Each call to `generate` returns the next response in the queue. Once the
/// queue is empty it keeps returning the repeat response if one was given,
/// otherwise `EmptyResponse`.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    repeat: Option<String>,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model that answers every call with the same text.
    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            repeat: Some(text.into()),
            ..Self::new(vec![])
        }
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: StructuredRequest) -> Result<String, ProviderError> {
        self.requests.lock().await.push(request);
        match self.responses.lock().await.pop_front() {
            Some(response) => response,
            None => self.repeat.clone().ok_or(ProviderError::EmptyResponse),
        }
    }
}

/// An invoker that records requests instead of sending them.
pub struct RecordingInvoker {
    response: CallResult,
    calls: Mutex<Vec<FetchRequest>>,
}

impl RecordingInvoker {
    /// Answers every call with `200 {"ok": true}`.
    pub fn new() -> Self {
        Self {
            response: CallResult::ok(200, r#"{"ok": true}"#),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond_with(mut self, response: CallResult) -> Self {
        self.response = response;
        self
    }

    pub async fn calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().await.clone()
    }
}

impl Default for RecordingInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointInvoker for RecordingInvoker {
    async fn invoke(&self, request: &FetchRequest) -> CallResult {
        self.calls.lock().await.push(request.clone());
        self.response.clone()
    }
}

/// Model text asking to call `endpoint` with a literal-encoded body.
pub fn fetch_response(endpoint: &str, body_literal: &str) -> String {
    json!({
        "gridSize": {"rows": 1, "cols": 1},
        "tiles": [],
        "finished_or_make_api_call": false,
        "endpoint": endpoint,
        "api_body": body_literal
    })
    .to_string()
}

/// Model text for a finished dashboard; tiles are `(id, coordinates literal)`.
pub fn finished_response(rows: u32, cols: u32, tiles: &[(&str, &str)]) -> String {
    let tiles: Vec<_> = tiles
        .iter()
        .map(|(id, coordinates)| {
            json!({
                "id": id,
                "title": id.to_uppercase(),
                "coordinates": coordinates,
                "html": format!("<div class=\"tile-content\">{id}</div>")
            })
        })
        .collect();
    json!({
        "gridSize": {"rows": rows, "cols": cols},
        "tiles": tiles,
        "finished_or_make_api_call": true,
        "endpoint": "",
        "api_body": ""
    })
    .to_string()
}
