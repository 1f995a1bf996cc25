//! What the model is told, and the shape it must answer in.

use serde_json::{Value, json};
use tilecast_core::ApiCatalog;

use crate::context::IterationContext;

/// User turn of the first model call in a run.
pub const BOOTSTRAP_PROMPT: &str =
    "Generate a dashboard based on the provided APIs and user preferences.";

/// User turn of every model call after an endpoint call.
pub const CONTINUE_PROMPT: &str = "Continue processing with the API response data.";

/// Base system instruction. Preferences, the API catalog and the response
/// context are appended per call by [`build_instructions`].
pub const SYSTEM_INSTRUCTION: &str = r#"You build a personal dashboard for one user out of the HTTP APIs they registered and the preferences they stated. When no preferences are given, produce a dashboard in the style of the example below.

How a response works:
- Set finished_or_make_api_call to true once you have all the data you need and the dashboard is complete. Only then are gridSize and tiles used.
- To fetch data first, set finished_or_make_api_call to false, put the path of one available API in endpoint, and put the request body in api_body. While not finished, gridSize and tiles are placeholders and may hold anything.
- Only call APIs that read information (databases, e-mail, reports, metrics). Never call an API that creates, changes or deletes data.
- The result of each call is appended below under "API Response Context" before you are asked again.

Field formats (these are parsed by a strict literal parser, so follow them exactly):
- coordinates is a STRING holding a nested list of [row, col] cells, for example "[[0, 0], [0, 1], [1, 0], [1, 1]]". Rows and columns start at 0 and must stay inside gridSize.
- api_body is a STRING holding a JSON object, for example "{\"action\": \"get_data\", \"params\": {\"limit\": 100}}". It must never be empty when finished_or_make_api_call is false. Use parameter names that match the purpose of the endpoint.
- endpoint starts with "/".

Layout rules:
- No two tiles may share a cell.
- Every tile has a unique id.
- html is a self-contained fragment rendered as is.
- If there is not enough data to fill the grid, fill the gaps with tiles like the examples, minding their coordinates.

Example tiles:
[
  {"id": "analytics", "title": "Analytics Overview", "coordinates": "[[0, 0], [1, 0], [1, 1], [0, 1]]",
   "html": "<div class=\"tile-content graph-tile\"><div class=\"chart-bars\"><div class=\"bar\" style=\"height: 60%\"></div><div class=\"bar\" style=\"height: 85%\"></div></div><p class=\"chart-label\">Analytics Data</p></div>"},
  {"id": "user-stats", "title": "User Statistics", "coordinates": "[[0, 2], [1, 2]]",
   "html": "<div class=\"tile-content metric-tile\"><div class=\"metric-value\">1,234</div><div class=\"metric-label\">Active Users</div><div class=\"metric-trend positive\">+12%</div></div>"},
  {"id": "notifications", "title": "Recent Notifications", "coordinates": "[[0, 3], [1, 3], [0, 4], [1, 4]]",
   "html": "<div class=\"tile-content list-tile\"><ul class=\"list-items\"><li class=\"list-item\">System update completed</li><li class=\"list-item\">Payment processed</li></ul></div>"},
  {"id": "storage", "title": "Storage", "coordinates": "[[2, 0], [3, 0]]",
   "html": "<div class=\"tile-content metric-tile\"><div class=\"metric-value\">2.4TB</div><div class=\"metric-label\">Used Storage</div></div>"},
  {"id": "security", "title": "Security Status", "coordinates": "[[2, 3], [2, 4]]",
   "html": "<div class=\"tile-content metric-tile\"><div class=\"metric-value\">Secure</div><div class=\"metric-label\">System Status</div></div>"}
]"#;

/// Full system instruction for one model call.
pub fn build_instructions(
    preferences: Option<&Value>,
    apis: Option<&ApiCatalog>,
    context: &IterationContext,
) -> String {
    let mut out = String::from(SYSTEM_INSTRUCTION);

    out.push_str("\n\nUser Preferences:\n\n");
    match preferences {
        Some(prefs) if !prefs.is_null() => out.push_str(&render_preferences(prefs)),
        _ => out.push_str("None"),
    }

    out.push_str("\n\nAPIs available:\n\n");
    match apis {
        Some(catalog) if !catalog.is_empty() => out.push_str(&catalog.render()),
        _ => out.push_str("None"),
    }

    if !context.is_empty() {
        out.push_str("\n\nAPI Response Context:\n\n");
        out.push_str(&context.render());
    }

    out
}

fn render_preferences(prefs: &Value) -> String {
    match prefs {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Output schema handed to the model client as a structured-output
/// constraint. `coordinates` and `api_body` are strings on purpose: they
/// carry literal-encoded values that the parser upgrades.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "required": ["gridSize", "tiles", "finished_or_make_api_call", "endpoint", "api_body"],
        "properties": {
            "gridSize": {
                "type": "object",
                "required": ["rows", "cols"],
                "properties": {
                    "rows": { "type": "number" },
                    "cols": { "type": "number" }
                }
            },
            "tiles": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "title", "coordinates", "html"],
                    "properties": {
                        "id": { "type": "string" },
                        "title": { "type": "string" },
                        "coordinates": { "type": "string" },
                        "html": { "type": "string" }
                    }
                }
            },
            "finished_or_make_api_call": { "type": "boolean" },
            "endpoint": { "type": "string" },
            "api_body": { "type": "string" }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilecast_core::{ApiDescriptor, CallResult};

    #[test]
    fn empty_inputs_render_as_none() {
        let text = build_instructions(None, None, &IterationContext::new());
        assert!(text.starts_with(SYSTEM_INSTRUCTION));
        assert!(text.ends_with("User Preferences:\n\nNone\n\nAPIs available:\n\nNone"));
        assert!(!text.contains("API Response Context"));
    }

    #[test]
    fn preferences_and_catalog_are_appended() {
        let prefs = json!({"focus": "sales"});
        let catalog = ApiCatalog::new().with(
            "/api/sales",
            ApiDescriptor::new("Monthly sales", "{'month': str}"),
        );
        let text = build_instructions(Some(&prefs), Some(&catalog), &IterationContext::new());
        assert!(text.contains("\"focus\": \"sales\""));
        assert!(text.contains("/api/sales: Monthly sales | body: {'month': str}"));
    }

    #[test]
    fn string_preferences_are_inlined() {
        let prefs = json!("dark theme, finance first");
        let text = build_instructions(Some(&prefs), None, &IterationContext::new());
        assert!(text.contains("User Preferences:\n\ndark theme, finance first"));
    }

    #[test]
    fn context_is_appended_when_present() {
        let mut ctx = IterationContext::new();
        ctx.record("/api/users", &json!({"limit": 10}), &CallResult::ok(200, "[]"));
        let text = build_instructions(None, None, &ctx);
        assert!(text.contains("API Response Context:\n\n\nAPI Call to /api/users:"));
    }

    #[test]
    fn schema_types_literal_fields_as_strings() {
        let schema = response_schema();
        assert_eq!(schema["properties"]["api_body"]["type"], "string");
        assert_eq!(
            schema["properties"]["tiles"]["items"]["properties"]["coordinates"]["type"],
            "string"
        );
        assert_eq!(schema["required"].as_array().unwrap().len(), 5);
    }
}
