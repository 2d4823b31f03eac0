use sf_config::model::{AlternateStates, AlternateValue, ScalarLiteral};

use crate::value::Value;

// ---------------------------------------------------------------------------
// Alternate-state selection
// ---------------------------------------------------------------------------

/// Pick the branch matching a sentinel result, if one is declared.
///
/// Boolean `false` and numeric `0` are ordinary values and never select a
/// branch.
pub fn select_branch<'a>(
    alternates: &'a AlternateStates,
    value: &Value,
) -> Option<&'a AlternateValue> {
    match value {
        Value::Unavailable => alternates.unavailable.as_ref(),
        Value::Unknown => alternates.unknown.as_ref(),
        Value::None => alternates.none.as_ref(),
        _ => None,
    }
}

/// Literal alternate branches carry their value directly.
pub fn literal_value(literal: &ScalarLiteral) -> Value {
    match literal {
        ScalarLiteral::Number(n) => Value::Number(*n),
        ScalarLiteral::Bool(b) => Value::Bool(*b),
        ScalarLiteral::Str(s) => Value::Str(s.clone()),
        _ => unreachable!("non_exhaustive enum; all known variants handled"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
