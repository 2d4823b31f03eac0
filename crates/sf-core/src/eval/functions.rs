use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use orion_error::StructError;

use crate::error::{CoreReason, CoreResult};
use crate::value::Value;


// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn invalid<T>(msg: impl Into<String>) -> CoreResult<T> {
    StructError::from(CoreReason::DataValidation(msg.into())).err()
}

fn arity<T>(name: &str, expected: &str) -> CoreResult<T> {
    invalid(format!("{name}() expects {expected} arguments"))
}

fn num(name: &str, v: &Value) -> CoreResult<f64> {
    v.as_f64()
        .ok_or_else(|| {
            StructError::from(CoreReason::DataValidation(format!(
                "{name}() expects a number, got {}",
                v.type_name()
            )))
        })
}

fn text<'v>(name: &str, v: &'v Value) -> CoreResult<&'v str> {
    match v {
        Value::Str(s) => Ok(s),
        other => invalid(format!(
            "{name}() expects a string, got {}",
            other.type_name()
        )),
    }
}

fn datetime(name: &str, v: &Value) -> CoreResult<DateTime<Utc>> {
    match v {
        Value::DateTime(dt) => Ok(*dt),
        other => invalid(format!(
            "{name}() expects a datetime, got {}",
            other.type_name()
        )),
    }
}

/// Flatten variadic numeric arguments: a single array argument spreads.
fn numeric_args(name: &str, args: &[Value]) -> CoreResult<Vec<f64>> {
    if args.len() == 1
        && let Value::Array(items) = &args[0]
    {
        return items.iter().map(|v| num(name, v)).collect();
    }
    args.iter().map(|v| num(name, v)).collect()
}

fn midnight(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(dt)
}

/// Today's local midnight as a UTC instant.
fn local_midnight() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(Local).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| midnight(Utc::now()))
}

fn finite(n: f64) -> Value {
    if n.is_finite() {
        Value::Number(n)
    } else {
        Value::None
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Apply a built-in function to already-evaluated arguments.
///
/// Metadata and collection calls never reach this table — they are
/// pre-evaluated into the context before AST evaluation.
pub fn call_function(name: &str, args: &[Value]) -> CoreResult<Value> {
    match name {
        // -- math -----------------------------------------------------------
        "abs" => one_number(name, args, f64::abs),
        "ceil" => one_number(name, args, f64::ceil),
        "floor" => one_number(name, args, f64::floor),
        "sin" => one_number(name, args, f64::sin),
        "cos" => one_number(name, args, f64::cos),
        "tan" => one_number(name, args, f64::tan),
        "exp" => {
            let [x] = args else { return arity(name, "1") };
            Ok(finite(num(name, x)?.exp()))
        }
        "sqrt" => {
            let [x] = args else { return arity(name, "1") };
            let x = num(name, x)?;
            if x < 0.0 {
                Ok(Value::None)
            } else {
                Ok(Value::Number(x.sqrt()))
            }
        }
        "pow" => {
            let [x, y] = args else { return arity(name, "2") };
            Ok(finite(num(name, x)?.powf(num(name, y)?)))
        }
        "log" => {
            let x = match args {
                [x] | [x, _] => num(name, x)?,
                _ => return arity(name, "1 or 2"),
            };
            if x <= 0.0 {
                return Ok(Value::None);
            }
            let out = if let [_, base] = args {
                let base = num(name, base)?;
                if base <= 0.0 || (base - 1.0).abs() < f64::EPSILON {
                    return Ok(Value::None);
                }
                x.log(base)
            } else {
                x.ln()
            };
            Ok(finite(out))
        }
        "round" => {
            let (x, digits) = match args {
                [x] => (num(name, x)?, 0i32),
                [x, d] => (num(name, x)?, num(name, d)?.trunc() as i32),
                _ => return arity(name, "1 or 2"),
            };
            let factor = 10_f64.powi(digits);
            Ok(finite((x * factor).round() / factor))
        }
        "min" => {
            let values = numeric_args(name, args)?;
            Ok(values
                .into_iter()
                .fold(Option::<f64>::None, |acc, v| Some(acc.map_or(v, |a| a.min(v))))
                .map(Value::Number)
                .unwrap_or(Value::None))
        }
        "max" => {
            let values = numeric_args(name, args)?;
            Ok(values
                .into_iter()
                .fold(Option::<f64>::None, |acc, v| Some(acc.map_or(v, |a| a.max(v))))
                .map(Value::Number)
                .unwrap_or(Value::None))
        }
        "sum" => Ok(Value::Number(numeric_args(name, args)?.iter().sum())),
        "count" => {
            if let [Value::Array(items)] = args {
                return Ok(Value::Number(items.len() as f64));
            }
            Ok(Value::Number(args.len() as f64))
        }
        "avg" | "mean" => {
            let values = numeric_args(name, args)?;
            if values.is_empty() {
                return Ok(Value::None);
            }
            Ok(Value::Number(values.iter().sum::<f64>() / values.len() as f64))
        }
        "median" => {
            let mut values = numeric_args(name, args)?;
            if values.is_empty() {
                return Ok(Value::None);
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = values.len() / 2;
            let median = if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            };
            Ok(Value::Number(median))
        }
        "std" | "var" => {
            let values = numeric_args(name, args)?;
            if values.len() < 2 {
                return Ok(Value::None);
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Ok(Value::Number(if name == "std" {
                variance.sqrt()
            } else {
                variance
            }))
        }

        // -- strings --------------------------------------------------------
        "contains" => {
            let [s, sub] = args else { return arity(name, "2") };
            Ok(Value::Bool(text(name, s)?.contains(text(name, sub)?)))
        }
        "startswith" => {
            let [s, prefix] = args else { return arity(name, "2") };
            Ok(Value::Bool(text(name, s)?.starts_with(text(name, prefix)?)))
        }
        "endswith" => {
            let [s, suffix] = args else { return arity(name, "2") };
            Ok(Value::Bool(text(name, s)?.ends_with(text(name, suffix)?)))
        }
        "length" => match args {
            [Value::Str(s)] => Ok(Value::Number(s.chars().count() as f64)),
            [Value::Array(items)] => Ok(Value::Number(items.len() as f64)),
            _ => invalid("length() expects a string or array"),
        },
        "replace" => {
            let [s, from, to] = args else { return arity(name, "3") };
            Ok(Value::Str(text(name, s)?.replacen(
                text(name, from)?,
                text(name, to)?,
                1,
            )))
        }
        "replace_all" => {
            let [s, from, to] = args else { return arity(name, "3") };
            Ok(Value::Str(
                text(name, s)?.replace(text(name, from)?, text(name, to)?),
            ))
        }
        "split" => {
            let [s, sep] = args else { return arity(name, "2") };
            let s = text(name, s)?;
            let sep = text(name, sep)?;
            let parts = if sep.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(sep).map(|p| Value::Str(p.to_string())).collect()
            };
            Ok(Value::Array(parts))
        }
        "join" => {
            let [Value::Array(items), sep] = args else {
                return invalid("join() expects an array and a separator");
            };
            let sep = text(name, sep)?;
            Ok(Value::Str(
                items
                    .iter()
                    .map(|v| v.to_state_string())
                    .collect::<Vec<_>>()
                    .join(sep),
            ))
        }
        "lower" => one_string(name, args, |s| s.to_lowercase()),
        "upper" => one_string(name, args, |s| s.to_uppercase()),
        "trim" => one_string(name, args, |s| s.trim().to_string()),
        "pad_left" => pad(name, args, Pad::Left),
        "pad_right" => pad(name, args, Pad::Right),
        "center" => pad(name, args, Pad::Center),
        "isalpha" => char_class(name, args, |c| c.is_alphabetic()),
        "isdigit" => char_class(name, args, |c| c.is_ascii_digit()),
        "isnumeric" => char_class(name, args, |c| c.is_numeric()),
        "isalnum" => char_class(name, args, |c| c.is_alphanumeric()),

        // -- date/time ------------------------------------------------------
        // `now`/`today` follow the host's local clock; the `utc_` variants
        // pin to UTC. All results are carried as UTC instants.
        "now" | "utc_now" => {
            if !args.is_empty() {
                return arity(name, "0");
            }
            Ok(Value::DateTime(Utc::now()))
        }
        "today" => {
            if !args.is_empty() {
                return arity(name, "0");
            }
            Ok(Value::DateTime(local_midnight()))
        }
        "utc_today" => {
            if !args.is_empty() {
                return arity(name, "0");
            }
            Ok(Value::DateTime(midnight(Utc::now())))
        }
        "yesterday" => {
            if !args.is_empty() {
                return arity(name, "0");
            }
            Ok(Value::DateTime(local_midnight() - Duration::days(1)))
        }
        "utc_yesterday" => {
            if !args.is_empty() {
                return arity(name, "0");
            }
            Ok(Value::DateTime(midnight(Utc::now()) - Duration::days(1)))
        }
        "tomorrow" => {
            if !args.is_empty() {
                return arity(name, "0");
            }
            Ok(Value::DateTime(local_midnight() + Duration::days(1)))
        }
        "date" => match args {
            [Value::Str(s)] => {
                let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|e| {
                        StructError::from(CoreReason::DataValidation(format!(
                            "date() cannot parse {s:?}: {e}"
                        )))
                    })?;
                Ok(Value::DateTime(
                    date.and_hms_opt(0, 0, 0)
                        .map(|naive| naive.and_utc())
                        .unwrap_or_else(Utc::now),
                ))
            }
            [y, m, d] => {
                let (y, m, d) = (
                    num(name, y)?.trunc() as i32,
                    num(name, m)?.trunc() as u32,
                    num(name, d)?.trunc() as u32,
                );
                match NaiveDate::from_ymd_opt(y, m, d) {
                    Some(date) => Ok(Value::DateTime(
                        date.and_hms_opt(0, 0, 0)
                            .map(|naive| naive.and_utc())
                            .unwrap_or_else(Utc::now),
                    )),
                    None => invalid(format!("date() got out-of-range {y}-{m}-{d}")),
                }
            }
            _ => arity(name, "1 or 3"),
        },
        "format_date" => {
            let (dt, fmt) = match args {
                [dt] => (datetime(name, dt)?, "%Y-%m-%d"),
                [dt, Value::Str(fmt)] => (datetime(name, dt)?, fmt.as_str()),
                _ => return arity(name, "1 or 2"),
            };
            Ok(Value::Str(dt.format(fmt).to_string()))
        }
        "format_friendly" => {
            let [dt] = args else { return arity(name, "1") };
            Ok(Value::Str(
                datetime(name, dt)?.format("%Y-%m-%d %H:%M:%S").to_string(),
            ))
        }

        // -- durations ------------------------------------------------------
        "seconds" => duration_ctor(name, args, 1.0),
        "minutes" => duration_ctor(name, args, 60.0),
        "hours" => duration_ctor(name, args, 3600.0),
        "days" => duration_ctor(name, args, 86400.0),
        "weeks" => duration_ctor(name, args, 7.0 * 86400.0),
        // Calendar months collapse to a fixed 30 days.
        "months" => duration_ctor(name, args, 30.0 * 86400.0),
        "seconds_between" => between(name, args, 1.0),
        "minutes_between" => between(name, args, 60.0),
        "hours_between" => between(name, args, 3600.0),
        "days_between" => between(name, args, 86400.0),

        _ => invalid(format!("unknown function {name}()")),
    }
}

// ---------------------------------------------------------------------------
// Shared shapes
// ---------------------------------------------------------------------------

fn one_number(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> CoreResult<Value> {
    let [x] = args else { return arity(name, "1") };
    Ok(finite(f(num(name, x)?)))
}

fn one_string(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> CoreResult<Value> {
    let [s] = args else { return arity(name, "1") };
    Ok(Value::Str(f(text(name, s)?)))
}

fn char_class(name: &str, args: &[Value], f: impl Fn(char) -> bool) -> CoreResult<Value> {
    let [s] = args else { return arity(name, "1") };
    let s = text(name, s)?;
    Ok(Value::Bool(!s.is_empty() && s.chars().all(f)))
}

enum Pad {
    Left,
    Right,
    Center,
}

fn pad(name: &str, args: &[Value], side: Pad) -> CoreResult<Value> {
    let (s, width, fill) = match args {
        [s, w] => (text(name, s)?, num(name, w)?.trunc() as usize, ' '),
        [s, w, f] => {
            let fill = text(name, f)?.chars().next().unwrap_or(' ');
            (text(name, s)?, num(name, w)?.trunc() as usize, fill)
        }
        _ => return arity(name, "2 or 3"),
    };
    let len = s.chars().count();
    if len >= width {
        return Ok(Value::Str(s.to_string()));
    }
    let missing = width - len;
    let padded = match side {
        Pad::Left => format!("{}{}", fill.to_string().repeat(missing), s),
        Pad::Right => format!("{}{}", s, fill.to_string().repeat(missing)),
        Pad::Center => {
            let left = missing / 2;
            let right = missing - left;
            format!(
                "{}{}{}",
                fill.to_string().repeat(left),
                s,
                fill.to_string().repeat(right)
            )
        }
    };
    Ok(Value::Str(padded))
}

fn duration_ctor(name: &str, args: &[Value], unit_seconds: f64) -> CoreResult<Value> {
    let [n] = args else { return arity(name, "1") };
    let millis = num(name, n)? * unit_seconds * 1000.0;
    if !millis.is_finite() {
        return Ok(Value::None);
    }
    Ok(Value::Duration(Duration::milliseconds(millis as i64)))
}

/// `<unit>_between(start, end)` → signed count of units from start to end.
fn between(name: &str, args: &[Value], unit_seconds: f64) -> CoreResult<Value> {
    let [start, end] = args else { return arity(name, "2") };
    let start = datetime(name, start)?;
    let end = datetime(name, end)?;
    let seconds = (end - start).num_milliseconds() as f64 / 1000.0;
    Ok(Value::Number(seconds / unit_seconds))
}
