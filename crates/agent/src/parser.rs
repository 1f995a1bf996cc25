//! Turns model text into a [`Decision`].
//!
//! Three steps: JSON-parse the text, upgrade the literal-encoded string
//! fields (`coordinates`, `api_body`) into structured values, then classify
//! the response as finished or as a fetch request.

use serde_json::Value;
use tilecast_core::literal;
use tilecast_core::plan::{Coordinates, RawPlan};
use tilecast_core::{Decision, FieldError, RunError};
use tracing::debug;

/// A model response that parsed as JSON, after normalization.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub raw: RawPlan,
    /// Field-local failures; the offending fields were left as strings.
    pub field_errors: Vec<FieldError>,
}

impl ParsedResponse {
    /// Classify the response. Field errors travel with the layout as
    /// diagnostics.
    pub fn into_decision(self) -> Result<Decision, RunError> {
        let diagnostics: Vec<String> = self.field_errors.iter().map(ToString::to_string).collect();

        match self.raw.into_decision() {
            Ok(mut decision) => {
                match &mut decision {
                    Decision::Finished(plan) => plan.diagnostics = diagnostics,
                    Decision::FetchMore { layout, .. } => layout.diagnostics = diagnostics,
                }
                Ok(decision)
            }
            Err((reason, mut layout)) => {
                layout.diagnostics = diagnostics;
                Err(RunError::ProtocolViolation {
                    reason,
                    last_plan: Some(Box::new(layout)),
                })
            }
        }
    }
}

/// Parse and normalize one model response.
pub fn parse_response(text: &str) -> Result<ParsedResponse, RunError> {
    let body = strip_code_fence(text);
    let mut value: Value = serde_json::from_str(body)
        .map_err(|e| RunError::MalformedResponse(format!("invalid JSON: {e}")))?;

    if !value.is_object() {
        return Err(RunError::MalformedResponse(
            "response is not a JSON object".into(),
        ));
    }

    let field_errors = normalize(&mut value);
    let raw: RawPlan = serde_json::from_value(value)
        .map_err(|e| RunError::MalformedResponse(format!("unexpected response shape: {e}")))?;

    Ok(ParsedResponse { raw, field_errors })
}

/// Models sometimes wrap JSON in a markdown fence despite the schema.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Upgrade literal-encoded string fields in place.
///
/// Fields that are already structured are left alone, so running this twice
/// changes nothing. A field that fails to parse keeps its string and yields
/// one [`FieldError`].
pub fn normalize(value: &mut Value) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if let Some(tiles) = value.get_mut("tiles").and_then(Value::as_array_mut) {
        for (index, tile) in tiles.iter_mut().enumerate() {
            let tile_id = tile
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{index}"));
            let Some(coordinates) = tile.get_mut("coordinates") else {
                continue;
            };
            let Some(raw) = coordinates.as_str().map(str::to_string) else {
                continue;
            };

            match upgrade_coordinates(&raw) {
                Ok(pairs) => *coordinates = pairs,
                Err(reason) => {
                    debug!(tile = %tile_id, raw = %raw, %reason, "Coordinates left unparsed");
                    errors.push(FieldError::CoordinateParse {
                        tile_id,
                        raw,
                        reason,
                    });
                }
            }
        }
    }

    if let Some(body) = value.get_mut("api_body")
        && let Some(raw) = body.as_str().map(str::to_string)
        && !raw.trim().is_empty()
    {
        match literal::parse(&raw) {
            Ok(parsed) => *body = parsed,
            Err(e) => {
                debug!(raw = %raw, error = %e, "api_body left unparsed");
                errors.push(FieldError::BodyParse {
                    raw,
                    reason: e.to_string(),
                });
            }
        }
    }

    errors
}

fn upgrade_coordinates(raw: &str) -> Result<Value, String> {
    let parsed = literal::parse(raw).map_err(|e| e.to_string())?;
    if Coordinates::pairs_from_value(&parsed).is_none() {
        return Err("not a list of [row, col] pairs".into());
    }
    Ok(parsed)
}
