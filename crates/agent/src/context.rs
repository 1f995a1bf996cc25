//! Run-local log of endpoint calls fed back to the model.

use serde::Serialize;
use serde_json::Value;
use tilecast_core::CallResult;

/// One endpoint call as the model will see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub endpoint: String,
    pub request_body: String,
    pub response: String,
}

impl ContextEntry {
    fn render(&self) -> String {
        format!(
            "\nAPI Call to {}:\nRequest Body: {}\nResponse: {}\n",
            self.endpoint, self.request_body, self.response
        )
    }
}

/// Append-only context accumulated over one run. Never shared between runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IterationContext {
    entries: Vec<ContextEntry>,
}

impl IterationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one call. Request and response are stored pretty-printed.
    pub fn record(&mut self, endpoint: &str, body: &Value, result: &CallResult) {
        let request_body = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
        self.entries.push(ContextEntry {
            endpoint: endpoint.to_string(),
            request_body,
            response: result.to_pretty_json(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// All entries, oldest first.
    pub fn render(&self) -> String {
        self.entries.iter().map(ContextEntry::render).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_format() {
        let mut ctx = IterationContext::new();
        ctx.record("/api/users", &json!({"limit": 10}), &CallResult::ok(200, "{\"n\":1}"));

        let text = ctx.render();
        assert!(text.starts_with("\nAPI Call to /api/users:\nRequest Body: {\n  \"limit\": 10\n}\nResponse: {"));
        assert!(text.contains("\"success\": true"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn entries_accumulate_in_order() {
        let mut ctx = IterationContext::new();
        assert!(ctx.is_empty());
        ctx.record("/a", &json!({"x": 1}), &CallResult::ok(200, ""));
        ctx.record("/b", &json!({"y": 2}), &CallResult::failed("boom", Some(500), "err"));
        assert_eq!(ctx.len(), 2);

        let text = ctx.render();
        let a = text.find("API Call to /a:").unwrap();
        let b = text.find("API Call to /b:").unwrap();
        assert!(a < b);
        assert!(text.contains("\"error\": \"boom\""));
    }
}
