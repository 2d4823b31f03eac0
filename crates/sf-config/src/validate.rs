use indexmap::IndexMap;

use sf_lang::ast::is_entity_reference;
use sf_lang::{analyze, parse_formula};

use crate::error::ConfigError;
use crate::model::{
    AlternateStates, AlternateValue, FormulaConfig, SensorConfig, SensorSet, VariableBinding,
};


// ---------------------------------------------------------------------------
// Sensor-set validation
// ---------------------------------------------------------------------------

/// Validate every sensor plus the global settings. First failure wins;
/// callers that need per-sensor error lists validate sensors individually.
pub fn validate_sensor_set(set: &SensorSet) -> Result<(), ConfigError> {
    for sensor in set.sensors.values() {
        validate_sensor(sensor)?;
    }
    validate_globals(set)
}

/// Global settings checks: a global variable name that is also a sensor
/// unique_id is ambiguous (the bare name could mean either the global or a
/// cross-sensor reference).
pub fn validate_globals(set: &SensorSet) -> Result<(), ConfigError> {
    for name in set.global_settings.variables.keys() {
        if set.sensors.contains_key(name) {
            return Err(ConfigError::AmbiguousGlobalVariable { name: name.clone() });
        }
    }
    for (name, binding) in &set.global_settings.variables {
        if let VariableBinding::Computed(c) = binding {
            check_syntax("globals", name, &c.formula)?;
            check_alternates("globals", name, &c.alternates)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-sensor validation
// ---------------------------------------------------------------------------

pub fn validate_sensor(sensor: &SensorConfig) -> Result<(), ConfigError> {
    if sensor.formulas.is_empty() {
        return Err(ConfigError::InvalidSensor {
            sensor: sensor.unique_id.clone(),
            message: "sensor has no formulas".to_string(),
        });
    }
    if !is_valid_unique_id(&sensor.unique_id) {
        return Err(ConfigError::InvalidSensor {
            sensor: sensor.unique_id.clone(),
            message: "unique_id must be an identifier".to_string(),
        });
    }
    if let Some(entity_id) = &sensor.entity_id
        && !is_entity_reference(entity_id)
    {
        return Err(ConfigError::InvalidSensor {
            sensor: sensor.unique_id.clone(),
            message: format!("entity_id {entity_id:?} is not a valid entity id"),
        });
    }

    for formula in &sensor.formulas {
        validate_formula(&sensor.unique_id, formula)?;
    }
    Ok(())
}

fn validate_formula(sensor: &str, formula: &FormulaConfig) -> Result<(), ConfigError> {
    check_syntax(sensor, &formula.id, &formula.formula)?;

    for (name, binding) in &formula.variables {
        if let VariableBinding::Computed(c) = binding {
            check_syntax(sensor, &format!("{}.{name}", formula.id), &c.formula)?;
            check_alternates(sensor, &formula.id, &c.alternates)?;
        }
    }
    check_alternates(sensor, &formula.id, &formula.alternates)?;

    // Computed variables referencing each other must form a DAG.
    if let Err(cycle) = computed_variable_order(&formula.variables) {
        return Err(ConfigError::ComputedVariableCycle {
            sensor: sensor.to_string(),
            cycle: cycle.join(" -> "),
        });
    }
    Ok(())
}

fn check_alternates(
    sensor: &str,
    formula_id: &str,
    alternates: &AlternateStates,
) -> Result<(), ConfigError> {
    for branch in [
        alternates.unavailable.as_ref(),
        alternates.unknown.as_ref(),
        alternates.none.as_ref(),
    ]
    .into_iter()
    .flatten()
    {
        match branch {
            AlternateValue::Literal(_) => {}
            AlternateValue::Formula(text) => check_syntax(sensor, formula_id, text)?,
            AlternateValue::Detailed(detail) => {
                check_syntax(sensor, formula_id, &detail.formula)?;
                for (name, binding) in &detail.variables {
                    if let VariableBinding::Computed(c) = binding {
                        check_syntax(sensor, &format!("{formula_id}.{name}"), &c.formula)?;
                        check_alternates(sensor, formula_id, &c.alternates)?;
                    }
                }
                check_alternates(sensor, formula_id, &detail.alternates)?;
            }
        }
    }
    Ok(())
}

/// Parse and analyze one formula text, mapping failures to config errors.
fn check_syntax(sensor: &str, formula_id: &str, text: &str) -> Result<(), ConfigError> {
    let expr = parse_formula(text).map_err(|source| ConfigError::Syntax {
        sensor: sensor.to_string(),
        formula_id: formula_id.to_string(),
        source,
    })?;
    analyze(&expr).map_err(|source| ConfigError::Analysis {
        sensor: sensor.to_string(),
        formula_id: formula_id.to_string(),
        source,
    })?;
    Ok(())
}

fn is_valid_unique_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Computed-variable ordering
// ---------------------------------------------------------------------------

/// Order computed variables so each is evaluated after the computed
/// variables it references. Non-computed bindings impose no ordering.
///
/// Returns the computed-variable names in evaluation order, or the cycle
/// path when one exists.
pub fn computed_variable_order(
    variables: &IndexMap<String, VariableBinding>,
) -> Result<Vec<String>, Vec<String>> {
    // Edges only between computed variables; a computed variable referencing
    // itself is the smallest cycle.
    let graph: IndexMap<String, Vec<String>> = variables
        .iter()
        .filter_map(|(name, binding)| match binding {
            VariableBinding::Computed(c) => {
                let deps = parse_formula(&c.formula)
                    .ok()
                    .and_then(|expr| analyze(&expr).ok())
                    .map(|analysis| {
                        analysis
                            .names
                            .iter()
                            .filter(|n| {
                                matches!(
                                    variables.get(n.as_str()),
                                    Some(VariableBinding::Computed(_))
                                )
                            })
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                Some((name.clone(), deps))
            }
            _ => None,
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    fn visit(
        node: &str,
        graph: &IndexMap<String, Vec<String>>,
        color: &mut IndexMap<String, Color>,
        path: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), Vec<String>> {
        color.insert(node.to_string(), Color::Grey);
        path.push(node.to_string());
        for dep in &graph[node] {
            if !graph.contains_key(dep) {
                continue;
            }
            match color[dep.as_str()] {
                Color::Grey => {
                    let start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Err(cycle);
                }
                Color::White => visit(dep, graph, color, path, order)?,
                Color::Black => {}
            }
        }
        path.pop();
        color.insert(node.to_string(), Color::Black);
        order.push(node.to_string());
        Ok(())
    }

    let mut color: IndexMap<String, Color> =
        graph.keys().map(|k| (k.clone(), Color::White)).collect();
    let mut order = Vec::with_capacity(graph.len());
    let mut path = Vec::new();

    for root in graph.keys() {
        if color[root.as_str()] == Color::White {
            visit(root, &graph, &mut color, &mut path, &mut order)?;
        }
    }
    Ok(order)
}
