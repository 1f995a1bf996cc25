//! Registered endpoint descriptions handed to the model.
//!
//! The catalog is a read-only snapshot taken at the start of a run; the
//! registry that owns it lives outside the generation loop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What one registered endpoint does and what body it expects.
///
/// Deserializes from the full object or from a bare description string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireDescriptor")]
pub struct ApiDescriptor {
    /// Human description of the endpoint.
    pub description: String,

    /// Description of the expected request body shape.
    pub body_format: String,

    /// Whether the endpoint may be called by automated dashboard fetches.
    pub safe_for_fetch: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireDescriptor {
    Text(String),
    Full {
        description: String,
        #[serde(default)]
        body_format: String,
        #[serde(default = "default_safe")]
        safe_for_fetch: bool,
    },
}

fn default_safe() -> bool {
    true
}

impl From<WireDescriptor> for ApiDescriptor {
    fn from(wire: WireDescriptor) -> Self {
        match wire {
            WireDescriptor::Text(description) => Self::new(description, ""),
            WireDescriptor::Full {
                description,
                body_format,
                safe_for_fetch,
            } => Self {
                description,
                body_format,
                safe_for_fetch,
            },
        }
    }
}

impl ApiDescriptor {
    pub fn new(description: impl Into<String>, body_format: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            body_format: body_format.into(),
            safe_for_fetch: true,
        }
    }

    /// Mark the endpoint as unsafe for automated fetches.
    pub fn mutating(mut self) -> Self {
        self.safe_for_fetch = false;
        self
    }

    /// The two-part description shown to the model.
    pub fn summary(&self) -> String {
        if self.body_format.trim().is_empty() {
            self.description.clone()
        } else {
            format!("{} | body: {}", self.description, self.body_format)
        }
    }
}

/// Mapping from endpoint path to its descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiCatalog {
    entries: BTreeMap<String, ApiDescriptor>,
}

impl ApiCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, descriptor: ApiDescriptor) {
        self.entries.insert(path.into(), descriptor);
    }

    pub fn with(mut self, path: impl Into<String>, descriptor: ApiDescriptor) -> Self {
        self.insert(path, descriptor);
        self
    }

    pub fn remove(&mut self, path: &str) -> Option<ApiDescriptor> {
        self.entries.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&ApiDescriptor> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ApiDescriptor)> {
        self.entries.iter()
    }

    /// Render as `path: summary` lines for the prompt. Endpoints not safe
    /// for automated fetches are listed with a warning so the model does
    /// not pick them.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(path, d)| {
                if d.safe_for_fetch {
                    format!("{path}: {}", d.summary())
                } else {
                    format!("{path}: {} (mutating, do not call)", d.summary())
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApiCatalog {
        ApiCatalog::new()
            .with("/api/users", ApiDescriptor::new("Get user statistics", "{limit: int}"))
            .with("/api/delete_user", ApiDescriptor::new("Delete a user", "{id: str}").mutating())
    }

    #[test]
    fn render_lists_every_endpoint() {
        let text = sample().render();
        assert!(text.contains("/api/users: Get user statistics | body: {limit: int}"));
        assert!(text.contains("/api/delete_user: Delete a user"));
        assert!(text.contains("do not call"));
    }

    #[test]
    fn bare_string_is_a_description() {
        let catalog: ApiCatalog = serde_json::from_str(
            r#"{"/api/users": "Get user statistics", "/api/mail": {"description": "Inbox", "safe_for_fetch": false}}"#,
        )
        .unwrap();
        let users = catalog.get("/api/users").unwrap();
        assert_eq!(users.description, "Get user statistics");
        assert!(users.body_format.is_empty());
        assert!(users.safe_for_fetch);
        assert!(!catalog.get("/api/mail").unwrap().safe_for_fetch);
    }

    #[test]
    fn serializes_as_plain_map() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["/api/users"]["description"], "Get user statistics");
        let back: ApiCatalog = serde_json::from_value(value).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn missing_safe_flag_defaults_to_safe() {
        let catalog: ApiCatalog =
            serde_json::from_str(r#"{"/api/x": {"description": "x"}}"#).unwrap();
        assert!(catalog.get("/api/x").unwrap().safe_for_fetch);
    }
}
