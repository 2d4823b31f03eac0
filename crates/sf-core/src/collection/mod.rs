use regex::Regex;

use sf_lang::plan::{CollectionFn, DynamicQuery, QueryType};

use crate::host::{HostAdapter, attr_to_value};
use crate::value::{Value, parse_state};


// ---------------------------------------------------------------------------
// Comparison grammar for attribute:/state: patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One parsed condition, e.g. `battery_level<20` or `>100`.
#[derive(Debug, Clone, PartialEq)]
struct Condition {
    /// Attribute key; `None` for `state:` conditions.
    key: Option<String>,
    op: CmpOp,
    rhs: String,
}

/// Parse `key<op>value` (attribute) or `<op>value` / `value` (state).
fn parse_condition(text: &str, with_key: bool) -> Option<Condition> {
    let ops: [(&str, CmpOp); 6] = [
        ("<=", CmpOp::Le),
        (">=", CmpOp::Ge),
        ("!=", CmpOp::Ne),
        ("=", CmpOp::Eq),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ];
    for (symbol, op) in ops {
        if let Some(idx) = text.find(symbol) {
            let (lhs, rest) = text.split_at(idx);
            let rhs = rest[symbol.len()..].trim().to_string();
            if rhs.is_empty() {
                return None;
            }
            let key = lhs.trim();
            if with_key {
                if key.is_empty() {
                    return None;
                }
                return Some(Condition {
                    key: Some(key.to_string()),
                    op,
                    rhs,
                });
            }
            if !key.is_empty() {
                return None;
            }
            return Some(Condition { key: None, op, rhs });
        }
    }
    // A bare value means equality (`state:on`).
    if with_key || text.trim().is_empty() {
        None
    } else {
        Some(Condition {
            key: None,
            op: CmpOp::Eq,
            rhs: text.trim().to_string(),
        })
    }
}

/// Compare a resolved value against the textual right-hand side: numeric
/// when both sides are numbers, boolean against boolean tokens, string
/// otherwise.
fn condition_matches(value: &Value, op: CmpOp, rhs: &str) -> bool {
    let rhs_value = parse_state(rhs);
    if let (Some(l), Some(r)) = (value.as_f64(), rhs_value.as_f64()) {
        return match op {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
        };
    }
    let l = value.to_state_string();
    let r = rhs.trim();
    match op {
        CmpOp::Eq => l == r,
        CmpOp::Ne => l != r,
        CmpOp::Lt => l.as_str() < r,
        CmpOp::Le => l.as_str() <= r,
        CmpOp::Gt => l.as_str() > r,
        CmpOp::Ge => l.as_str() >= r,
    }
}

// ---------------------------------------------------------------------------
// Collection resolver
// ---------------------------------------------------------------------------

/// Expands pattern queries against the host's entity inventory and applies
/// the aggregation.
pub struct CollectionResolver<'a> {
    host: &'a dyn HostAdapter,
    /// The querying sensor's own entity id — excluded from its own match
    /// set so aggregations never feed back into themselves.
    exclude: Option<&'a str>,
}

impl<'a> CollectionResolver<'a> {
    pub fn new(host: &'a dyn HostAdapter) -> Self {
        Self {
            host,
            exclude: None,
        }
    }

    pub fn excluding(host: &'a dyn HostAdapter, own_entity: &'a str) -> Self {
        Self {
            host,
            exclude: Some(own_entity),
        }
    }

    /// The entity ids a query currently matches, deduplicated and sorted.
    pub fn matching_entities(&self, query: &DynamicQuery) -> Vec<String> {
        let mut matches = self.match_pattern(query.query_type, &query.pattern);
        matches.sort_unstable();
        matches.dedup();
        matches
    }

    /// Resolve one query to its aggregated value.
    pub fn resolve(&self, query: &DynamicQuery) -> Value {
        let matches = self.matching_entities(query);

        if query.function == CollectionFn::Select {
            let values: Vec<Value> = matches
                .iter()
                .filter_map(|id| self.host.get_state(id))
                .map(|snap| parse_state(&snap.state))
                .filter(|v| !v.is_sentinel())
                .collect();
            return Value::Array(values);
        }

        let numbers: Vec<f64> = matches
            .iter()
            .filter_map(|id| self.host.get_state(id))
            .filter_map(|snap| parse_state(&snap.state).as_f64())
            .collect();
        aggregate(query.function, &numbers)
    }

    /// Union of the `|`-separated components. A component carrying its own
    /// recognized prefix switches type; otherwise it inherits the query's.
    fn match_pattern(&self, query_type: QueryType, pattern: &str) -> Vec<String> {
        // Regex alternation is native to the pattern language; the others
        // get OR-composition by splitting.
        if query_type == QueryType::Regex {
            return self.match_single(QueryType::Regex, pattern);
        }

        let mut matched = Vec::new();
        for component in pattern.split('|') {
            let component = component.trim();
            if component.is_empty() {
                continue;
            }
            let (qt, payload) = QueryType::split_pattern(component)
                .unwrap_or((query_type, component));
            matched.extend(self.match_component(qt, payload));
        }
        matched
    }

    /// One OR component. Space-separated conditions AND together
    /// (`area:kitchen device_class:power`), provided every extra token
    /// carries its own recognized prefix — otherwise the payload is one
    /// condition that happens to contain whitespace.
    fn match_component(&self, query_type: QueryType, payload: &str) -> Vec<String> {
        if query_type == QueryType::Regex {
            return self.match_single(query_type, payload);
        }
        let tokens: Vec<&str> = payload.split_whitespace().collect();
        let splittable = tokens.len() > 1
            && tokens[1..]
                .iter()
                .all(|t| QueryType::split_pattern(t).is_some());
        if !splittable {
            return self.match_single(query_type, payload);
        }

        let mut matched = self.match_single(query_type, tokens[0]);
        for token in &tokens[1..] {
            let Some((qt, pl)) = QueryType::split_pattern(token) else {
                continue;
            };
            let other = self.match_single(qt, pl);
            matched.retain(|id| other.contains(id));
        }
        matched
    }

    fn match_single(&self, query_type: QueryType, payload: &str) -> Vec<String> {
        let entities = self.host.list_entities();
        let candidates = entities
            .into_iter()
            .filter(|id| Some(id.as_str()) != self.exclude);

        match query_type {
            QueryType::Regex => {
                // Unanchored search semantics.
                let Ok(re) = Regex::new(payload) else {
                    log::warn!("invalid regex collection pattern {payload:?}");
                    return Vec::new();
                };
                candidates.filter(|id| re.is_match(id)).collect()
            }
            QueryType::DeviceClass => candidates
                .filter(|id| {
                    self.host
                        .get_state(id)
                        .and_then(|snap| {
                            snap.attributes
                                .get("device_class")
                                .map(|v| attr_to_value(v).to_state_string() == payload)
                        })
                        .unwrap_or(false)
                })
                .collect(),
            QueryType::Area => candidates
                .filter(|id| self.entity_area(id).as_deref() == Some(payload))
                .collect(),
            QueryType::Label => candidates
                .filter(|id| self.host.labels_of(id).iter().any(|l| l == payload))
                .collect(),
            QueryType::Attribute => {
                let Some(cond) = parse_condition(payload, true) else {
                    log::warn!("invalid attribute collection pattern {payload:?}");
                    return Vec::new();
                };
                let key = cond.key.clone().unwrap_or_default();
                candidates
                    .filter(|id| {
                        self.host
                            .get_state(id)
                            .and_then(|snap| snap.attributes.get(&key).map(|a| attr_to_value(a)))
                            .map(|v| condition_matches(&v, cond.op, &cond.rhs))
                            .unwrap_or(false)
                    })
                    .collect()
            }
            QueryType::State => {
                let Some(cond) = parse_condition(payload, false) else {
                    log::warn!("invalid state collection pattern {payload:?}");
                    return Vec::new();
                };
                candidates
                    .filter(|id| {
                        self.host
                            .get_state(id)
                            .map(|snap| {
                                condition_matches(&parse_state(&snap.state), cond.op, &cond.rhs)
                            })
                            .unwrap_or(false)
                    })
                    .collect()
            }
            _ => unreachable!("non_exhaustive enum; all known variants handled"),
        }
    }

    /// The entity's own area, falling back to the area of its device.
    fn entity_area(&self, entity_id: &str) -> Option<String> {
        if let Some(area) = self.host.area_of(entity_id) {
            return Some(area);
        }
        let device = self.host.device_of(entity_id)?;
        self.host.device_lookup(&device)?.area
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Apply one aggregation over the numeric states of the match set.
///
/// Empty sets: `sum = 0`, `count = 0`; the order-dependent aggregators
/// yield `None`, which propagates as an alternate state.
fn aggregate(function: CollectionFn, values: &[f64]) -> Value {
    match function {
        CollectionFn::Sum => Value::Number(values.iter().sum()),
        CollectionFn::Count => Value::Number(values.len() as f64),
        CollectionFn::Avg => {
            if values.is_empty() {
                Value::None
            } else {
                Value::Number(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        CollectionFn::Min => values
            .iter()
            .copied()
            .fold(Option::<f64>::None, |acc, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            })
            .map(Value::Number)
            .unwrap_or(Value::None),
        CollectionFn::Max => values
            .iter()
            .copied()
            .fold(Option::<f64>::None, |acc, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
            .map(Value::Number)
            .unwrap_or(Value::None),
        CollectionFn::Std => sample_variance(values)
            .map(|v| Value::Number(v.sqrt()))
            .unwrap_or(Value::None),
        CollectionFn::Var => sample_variance(values)
            .map(Value::Number)
            .unwrap_or(Value::None),
        CollectionFn::Select => Value::Array(values.iter().map(|v| Value::Number(*v)).collect()),
        _ => unreachable!("non_exhaustive enum; all known variants handled"),
    }
}

/// Sample variance (n - 1 denominator); `None` below two samples.
fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some(sum_sq / (n - 1.0))
}
