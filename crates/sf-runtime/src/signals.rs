use serde_json::{Map, Value as JsonValue};

use sf_core::Value;

// ---------------------------------------------------------------------------
// Signals emitted towards the host
// ---------------------------------------------------------------------------

/// Coarse sensor condition reported alongside value updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTag {
    Ok,
    Unknown,
    Unavailable,
    Error,
}

impl StateTag {
    /// The tag a committed value presents as.
    pub fn for_value(value: &Value) -> Self {
        match value {
            Value::Unavailable => Self::Unavailable,
            Value::Unknown | Value::None => Self::Unknown,
            _ => Self::Ok,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unknown => "unknown",
            Self::Unavailable => "unavailable",
            Self::Error => "error",
        }
    }
}

/// The engine's outbound interface: how freshly committed sensor values
/// reach the host platform.
pub trait HostSignals: Send + Sync {
    fn sensor_value_updated(
        &self,
        unique_id: &str,
        entity_id: &str,
        value: &Value,
        attributes: &Map<String, JsonValue>,
    );

    fn sensor_state_changed(&self, unique_id: &str, tag: StateTag);
}

/// Sink for hosts that poll the registry instead of listening.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSignals;

impl HostSignals for NullSignals {
    fn sensor_value_updated(
        &self,
        _unique_id: &str,
        _entity_id: &str,
        _value: &Value,
        _attributes: &Map<String, JsonValue>,
    ) {
    }

    fn sensor_state_changed(&self, _unique_id: &str, _tag: StateTag) {}
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

/// Render an engine value as the JSON payload hosts expect in signals.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
        Value::Duration(d) => serde_json::Number::from_f64(d.num_milliseconds() as f64 / 1000.0)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Unavailable | Value::Unknown | Value::None => JsonValue::Null,
        _ => unreachable!("non_exhaustive enum; all known variants handled"),
    }
}
