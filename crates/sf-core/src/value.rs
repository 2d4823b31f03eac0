use chrono::{DateTime, Duration, Utc};


// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A resolved value flowing through formula evaluation.
///
/// The three sentinel variants mirror the host's `unavailable` / `unknown` /
/// missing states. Boolean `false` and numeric `0` are ordinary values and
/// never sentinels.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Duration(Duration),
    Array(Vec<Value>),
    Unavailable,
    Unknown,
    None,
}

impl Value {
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Value::Unavailable | Value::Unknown | Value::None)
    }

    /// Numeric coercion: numbers pass through, booleans map to `1.0`/`0.0`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Truthiness for conditionals: `false`, `0`, empty string, empty
    /// array, and sentinels are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::DateTime(_) | Value::Duration(_) => true,
            Value::Unavailable | Value::Unknown | Value::None => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::Array(_) => "array",
            Value::Unavailable => "unavailable",
            Value::Unknown => "unknown",
            Value::None => "none",
        }
    }

    /// Render the value the way the host displays states.
    pub fn to_state_string(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::DateTime(dt) => dt.to_rfc3339(),
            Value::Duration(d) => format!("{}s", d.num_seconds()),
            Value::Array(items) => items
                .iter()
                .map(|v| v.to_state_string())
                .collect::<Vec<_>>()
                .join(", "),
            Value::Unavailable => "unavailable".to_string(),
            Value::Unknown => "unknown".to_string(),
            Value::None => "none".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Host state parsing
// ---------------------------------------------------------------------------

const TRUE_TOKENS: &[&str] = &["on", "true", "yes", "open", "home", "locked"];
const FALSE_TOKENS: &[&str] = &["off", "false", "no", "closed", "not_home", "unlocked"];

/// Interpret a raw host state string as a typed value.
///
/// Numeric strings become numbers; the usual boolean state tokens become
/// booleans; `unavailable` / `unknown` / `none` (case-insensitive) become
/// sentinels; everything else stays a string.
pub fn parse_state(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    match lowered.as_str() {
        "unavailable" => return Value::Unavailable,
        "unknown" => return Value::Unknown,
        "none" | "null" => return Value::None,
        _ => {}
    }
    if TRUE_TOKENS.contains(&lowered.as_str()) {
        return Value::Bool(true);
    }
    if FALSE_TOKENS.contains(&lowered.as_str()) {
        return Value::Bool(false);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Value::Number(n);
    }
    Value::Str(trimmed.to_string())
}

/// True when a state string looks like it was meant to be numeric but
/// cannot be parsed as one (`"12.3.4"`, `"1,5"`).
pub fn looks_numeric_but_invalid(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
        && trimmed.parse::<f64>().is_err()
        && trimmed.len() > 1
}

// ---------------------------------------------------------------------------
// ReferenceValue
// ---------------------------------------------------------------------------

/// A resolved binding that remembers where its value came from.
///
/// Downstream phases (metadata, alternate handling, traceability) need the
/// originating entity id or sensor key, not just the scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceValue {
    /// The originating entity id, sensor key, or variable name.
    pub reference: String,
    pub value: Value,
}

impl ReferenceValue {
    pub fn new(reference: impl Into<String>, value: Value) -> Self {
        Self {
            reference: reference.into(),
            value,
        }
    }
}
