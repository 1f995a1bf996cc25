//! Dashboard plan domain types.
//!
//! A plan is one proposed or final dashboard state returned by the model.
//! Plans are values: every model call yields a fresh one, nothing is patched
//! in place across iterations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Grid dimensions of a finished dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub rows: u32,
    pub cols: u32,
}

impl GridSize {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Read `{rows, cols}` leniently: the schema types them as plain
    /// numbers, so `4.0` is accepted as `4`. Missing or invalid values
    /// become 0 and are reported by validation.
    pub fn from_value(value: &Value) -> Self {
        Self {
            rows: whole_number(value.get("rows")).unwrap_or(0),
            cols: whole_number(value.get("cols")).unwrap_or(0),
        }
    }

    pub fn contains(&self, cell: [i64; 2]) -> bool {
        let [row, col] = cell;
        (0..self.rows as i64).contains(&row) && (0..self.cols as i64).contains(&col)
    }
}

fn whole_number(value: Option<&Value>) -> Option<u32> {
    let value = value?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64).then_some(f as u32)
}

/// The cells a tile occupies.
///
/// `Raw` keeps the wire string when it could not be upgraded into
/// coordinate pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinates {
    Parsed(Vec<[i64; 2]>),
    Raw(String),
}

impl Coordinates {
    /// Interpret a structured value as a list of `[row, col]` pairs.
    pub fn pairs_from_value(value: &Value) -> Option<Vec<[i64; 2]>> {
        value
            .as_array()?
            .iter()
            .map(|pair| match pair.as_array()?.as_slice() {
                [row, col] => Some([integer(row)?, integer(col)?]),
                _ => None,
            })
            .collect()
    }

    pub fn cells(&self) -> Option<&[[i64; 2]]> {
        match self {
            Self::Parsed(cells) => Some(cells),
            Self::Raw(_) => None,
        }
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::Parsed(Vec::new())
    }
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        let f = value.as_f64()?;
        (f.fract() == 0.0).then_some(f as i64)
    })
}

/// One rectangular dashboard widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub coordinates: Coordinates,
    /// Self-contained markup, rendered verbatim.
    pub html: String,
}

/// A dashboard layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardPlan {
    #[serde(rename = "gridSize")]
    pub grid_size: GridSize,

    #[serde(default)]
    pub tiles: Vec<Tile>,

    /// Soft failures noticed while normalizing or validating this plan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

/// A request for more data, only constructible in a valid shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRequest {
    endpoint: String,
    body: Map<String, Value>,
}

impl FetchRequest {
    /// Build a request from the model's `endpoint` and (already parsed)
    /// `api_body`. The endpoint must begin with `/` and the body must be a
    /// non-empty object.
    pub fn new(endpoint: impl Into<String>, body: Value) -> Result<Self, String> {
        let endpoint = endpoint.into().trim().to_string();
        if endpoint.is_empty() {
            return Err("missing endpoint".into());
        }
        if !endpoint.starts_with('/') {
            return Err(format!("endpoint '{endpoint}' does not start with '/'"));
        }
        let body = match body {
            Value::Object(map) if !map.is_empty() => map,
            Value::Object(_) => return Err("api_body is empty".into()),
            Value::Null => return Err("missing api_body".into()),
            Value::String(s) if s.trim().is_empty() => return Err("missing api_body".into()),
            other => {
                return Err(format!(
                    "api_body is not an object: {}",
                    truncate(&other.to_string(), 80)
                ));
            }
        };
        Ok(Self { endpoint, body })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn body_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// What the model decided this iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The dashboard is complete.
    Finished(DashboardPlan),
    /// More data is needed. `layout` holds whatever placeholder layout the
    /// model sent alongside the request.
    FetchMore {
        request: FetchRequest,
        layout: DashboardPlan,
    },
}

impl Decision {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// One model response exactly as it arrives on the wire.
///
/// Every field is defaulted so that a partially filled response still
/// deserializes; shape checks happen in [`RawPlan::into_decision`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawPlan {
    #[serde(rename = "gridSize", default)]
    pub grid_size: Value,

    #[serde(default)]
    pub tiles: Vec<RawTile>,

    /// `true` means finished. A missing flag counts as finished. Also
    /// accepted under the shorter `finished` key.
    #[serde(default, alias = "finished")]
    pub finished_or_make_api_call: Option<bool>,

    #[serde(default)]
    pub endpoint: Option<String>,

    /// Normally a literal-encoded string; already upgraded to structured
    /// JSON once the response has been normalized.
    #[serde(default)]
    pub api_body: Value,
}

/// A tile as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTile {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default)]
    pub coordinates: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    pub html: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl RawTile {
    fn into_tile(self) -> Tile {
        let coordinates = match self.coordinates {
            Value::String(raw) => Coordinates::Raw(raw),
            Value::Null => Coordinates::Raw(String::new()),
            other => match Coordinates::pairs_from_value(&other) {
                Some(pairs) => Coordinates::Parsed(pairs),
                None => Coordinates::Raw(other.to_string()),
            },
        };
        Tile {
            id: self.id,
            title: self.title,
            coordinates,
            html: self.html,
        }
    }
}

impl RawPlan {
    pub fn is_finished(&self) -> bool {
        self.finished_or_make_api_call.unwrap_or(true)
    }

    /// Classify the response. A non-finished response without a usable
    /// endpoint or body is rejected with the reason and its layout.
    pub fn into_decision(self) -> Result<Decision, (String, DashboardPlan)> {
        let finished = self.is_finished();
        let endpoint = self.endpoint.unwrap_or_default();
        let body = self.api_body;
        let layout = DashboardPlan {
            grid_size: GridSize::from_value(&self.grid_size),
            tiles: self.tiles.into_iter().map(RawTile::into_tile).collect(),
            diagnostics: Vec::new(),
        };

        if finished {
            return Ok(Decision::Finished(layout));
        }
        match FetchRequest::new(endpoint, body) {
            Ok(request) => Ok(Decision::FetchMore { request, layout }),
            Err(reason) => Err((reason, layout)),
        }
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}
