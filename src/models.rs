//! Data models for the controller link.
//!
//! Outbound commands, inbound responses, and the flat result shape handed back
//! to callers. Response fields are passed through untouched; only `ok` and
//! `error` are interpreted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reason used when a line is not valid JSON.
pub const BAD_JSON: &str = "bad_json";

/// Reason used when a line is JSON but not an object.
pub const UNEXPECTED_RESPONSE: &str = "unexpected_response";

/// Reason used when a line exceeded the framing limit and was dropped.
pub const LINE_TOO_LONG: &str = "line_too_long";

/// A command for the remote controller.
///
/// The name is passed through unvalidated; the controller decides what it
/// means. Options are merged into the wire object next to `cmd`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub options: Map<String, Value>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }

    /// Add an option field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn forward(speed: i64, angle: i64) -> Self {
        Self::new("forward").with("speed", speed).with("angle", angle)
    }

    pub fn backward(speed: i64, angle: i64) -> Self {
        Self::new("backward").with("speed", speed).with("angle", angle)
    }

    pub fn left(speed: i64) -> Self {
        Self::new("left").with("speed", speed)
    }

    pub fn right(speed: i64) -> Self {
        Self::new("right").with("speed", speed)
    }

    pub fn stop() -> Self {
        Self::new("stop")
    }

    pub fn sensors() -> Self {
        Self::new("sensors")
    }
}

/// One framed inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Line parsed as JSON.
    Json(Value),
    /// Line that failed to parse, kept verbatim.
    Raw(String),
    /// Line dropped for exceeding the framing limit; carries its length.
    Oversized(usize),
}

impl Response {
    pub fn parse(line: &str) -> Self {
        match serde_json::from_str(line) {
            Ok(value) => Response::Json(value),
            Err(_) => Response::Raw(line.to_string()),
        }
    }
}

/// Result of issuing a command, as seen by the caller.
///
/// Serializes flat: `{"ok":true,"distance_cm":12}` or
/// `{"ok":false,"error":"socket_closed"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CommandResult {
    /// A failure carrying `reason` and nothing else.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
            fields: Map::new(),
        }
    }

    /// Look up a pass-through response field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Short text for the failure reason, if any.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }

    /// The result as a single JSON object.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("ok".to_string(), Value::Bool(self.ok));
        if let Some(ref error) = self.error {
            object.insert("error".to_string(), Value::String(error.clone()));
        }
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl From<Response> for CommandResult {
    fn from(response: Response) -> Self {
        match response {
            Response::Json(Value::Object(mut fields)) => {
                let ok = match fields.remove("ok") {
                    Some(Value::Bool(ok)) => ok,
                    Some(other) => {
                        // Keep a non-boolean `ok` visible rather than guessing.
                        fields.insert("ok_raw".to_string(), other);
                        false
                    }
                    None => true,
                };
                let error = match fields.remove("error") {
                    Some(Value::String(text)) => Some(text),
                    Some(other) => Some(other.to_string()),
                    None => None,
                };
                Self { ok, error, fields }
            }
            Response::Json(other) => {
                let mut result = Self::failure(UNEXPECTED_RESPONSE);
                result
                    .fields
                    .insert("raw".to_string(), Value::String(other.to_string()));
                result
            }
            Response::Raw(line) => {
                let mut result = Self::failure(BAD_JSON);
                result.fields.insert("raw".to_string(), Value::String(line));
                result
            }
            Response::Oversized(length) => {
                let mut result = Self::failure(LINE_TOO_LONG);
                result.fields.insert("length".to_string(), Value::from(length));
                result
            }
        }
    }
}

/// Cliff detector status reported by `sensors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliffStatus {
    Safe,
    Danger,
    /// Forward-compatible fallback for unknown statuses
    Other(String),
}

impl CliffStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "safe" => CliffStatus::Safe,
            "danger" => CliffStatus::Danger,
            other => CliffStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CliffStatus::Safe => "safe",
            CliffStatus::Danger => "danger",
            CliffStatus::Other(s) => s,
        }
    }

    pub fn is_danger(&self) -> bool {
        matches!(self, CliffStatus::Danger)
    }
}

/// Typed view over a `sensors` result. Both fields are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub distance_cm: Option<f64>,
    pub cliff: Option<CliffStatus>,
}

impl SensorReading {
    /// Extract telemetry from a successful result; `None` on failure.
    pub fn from_result(result: &CommandResult) -> Option<Self> {
        if !result.ok {
            return None;
        }
        Some(Self {
            distance_cm: result.field("distance_cm").and_then(Value::as_f64),
            cliff: result
                .field("cliff")
                .and_then(Value::as_str)
                .map(CliffStatus::parse),
        })
    }
}
