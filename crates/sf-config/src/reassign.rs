use indexmap::{IndexMap, IndexSet};

use sf_lang::{analyze, parse_formula};

use crate::model::{AlternateStates, AlternateValue, SensorSet, VariableBinding};

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// Reference rewriting
// ---------------------------------------------------------------------------

/// An `old reference → new reference` mapping collected for one
/// reassignment pass (bulk YAML import, CRUD rename, or a host-side
/// entity-id rename).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReassignmentPlan {
    pub mapping: IndexMap<String, String>,
}

impl ReassignmentPlan {
    pub fn single(old: impl Into<String>, new: impl Into<String>) -> Self {
        let mut mapping = IndexMap::new();
        mapping.insert(old.into(), new.into());
        Self { mapping }
    }
}

/// Rewrite dotted-name and identifier references in one formula text.
///
/// String literals are left untouched; only name tokens outside quotes are
/// candidates. For a dotted run like `sensor.p.voltage` the longest prefix
/// with a mapping wins (`sensor.p → state` yields `state.voltage`).
fn rewrite_references(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            out.push(c as char);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => {
                quote = Some(c);
                out.push(c as char);
                i += 1;
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let run_start = i;
                while i < bytes.len() && is_name_byte(bytes[i]) {
                    i += 1;
                }
                // Extend across tight dots followed by another identifier.
                while i < bytes.len()
                    && bytes[i] == b'.'
                    && i + 1 < bytes.len()
                    && matches!(bytes[i + 1], b'A'..=b'Z' | b'a'..=b'z' | b'_')
                {
                    i += 1;
                    while i < bytes.len() && is_name_byte(bytes[i]) {
                        i += 1;
                    }
                }
                let run = &text[run_start..i];
                out.push_str(&rewrite_run(run, lookup));
            }
            _ => {
                out.push(c as char);
                i += 1;
            }
        }
    }
    out
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Longest-prefix replacement of a dotted run at segment boundaries.
fn rewrite_run(run: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let segments: Vec<&str> = run.split('.').collect();
    for take in (1..=segments.len()).rev() {
        let candidate = segments[..take].join(".");
        if let Some(new) = lookup(&candidate) {
            let rest = &segments[take..];
            if rest.is_empty() {
                return new;
            }
            return format!("{new}.{}", rest.join("."));
        }
    }
    run.to_string()
}

// ---------------------------------------------------------------------------
// Model-wide application
// ---------------------------------------------------------------------------

/// Rewrite every reference site in the set: formula texts, variable binding
/// values, attribute formulas, alternate branches (all three shapes, with
/// their nested variables and formulas), and global-settings variables.
///
/// A sensor referencing its *own* unique_id or entity_id inside one of its
/// attribute formulas is rewritten to the bare `state` token before the
/// mapping is applied.
pub fn apply_reassignment(set: &mut SensorSet, plan: &ReassignmentPlan) {
    let mapping = &plan.mapping;
    let lookup = |name: &str| mapping.get(name).cloned();

    for sensor in set.sensors.values_mut() {
        let own_unique_id = sensor.unique_id.clone();
        let own_entity_id = sensor.resolved_entity_id();
        let self_to_state = move |name: &str| {
            if name == own_unique_id || name == own_entity_id {
                Some("state".to_string())
            } else {
                None
            }
        };

        for formula in &mut sensor.formulas {
            if !formula.is_main() {
                rewrite_formula_texts(formula, &self_to_state);
            }
            rewrite_formula_texts(formula, &lookup);
        }

        // Identity updates: a renamed backing entity updates the override;
        // a renamed unique_id renames the sensor itself.
        if let Some(new_entity) = mapping.get(&sensor.resolved_entity_id()) {
            sensor.entity_id = Some(new_entity.clone());
        }
    }

    rename_sensor_identities(set, mapping);

    for binding in set.global_settings.variables.values_mut() {
        rewrite_binding(binding, &lookup);
    }
}

/// Rename sensors whose unique_id appears in the mapping with an
/// identifier-shaped replacement, keeping formula ids consistent.
fn rename_sensor_identities(set: &mut SensorSet, mapping: &IndexMap<String, String>) {
    let renames: Vec<(String, String)> = set
        .sensors
        .keys()
        .filter_map(|old| {
            let new = mapping.get(old)?;
            is_bare_ident(new).then(|| (old.clone(), new.clone()))
        })
        .collect();

    for (old, new) in renames {
        if let Some(mut sensor) = set.sensors.shift_remove(&old) {
            sensor.unique_id = new.clone();
            for formula in &mut sensor.formulas {
                formula.id = match &formula.attribute {
                    Some(attr) => format!("{new}_{attr}"),
                    None => new.clone(),
                };
            }
            set.sensors.insert(new, sensor);
        }
    }
}

fn is_bare_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn rewrite_formula_texts(
    formula: &mut crate::model::FormulaConfig,
    lookup: &dyn Fn(&str) -> Option<String>,
) {
    formula.formula = rewrite_references(&formula.formula, lookup);
    for binding in formula.variables.values_mut() {
        rewrite_binding(binding, lookup);
    }
    rewrite_alternates(&mut formula.alternates, lookup);
}

fn rewrite_binding(binding: &mut VariableBinding, lookup: &dyn Fn(&str) -> Option<String>) {
    match binding {
        VariableBinding::EntityRef(reference) | VariableBinding::Reference(reference) => {
            if let Some(new) = lookup(reference) {
                *binding = VariableBinding::from_string(new);
            }
        }
        VariableBinding::Literal(_) => {}
        VariableBinding::Computed(computed) => {
            computed.formula = rewrite_references(&computed.formula, lookup);
            rewrite_alternates(&mut computed.alternates, lookup);
        }
    }
}

fn rewrite_alternates(alternates: &mut AlternateStates, lookup: &dyn Fn(&str) -> Option<String>) {
    for branch in [
        alternates.unavailable.as_mut(),
        alternates.unknown.as_mut(),
        alternates.none.as_mut(),
    ]
    .into_iter()
    .flatten()
    {
        match branch {
            AlternateValue::Literal(_) => {}
            AlternateValue::Formula(text) => *text = rewrite_references(text, lookup),
            AlternateValue::Detailed(detail) => {
                detail.formula = rewrite_references(&detail.formula, lookup);
                for binding in detail.variables.values_mut() {
                    rewrite_binding(binding, lookup);
                }
                rewrite_alternates(&mut detail.alternates, lookup);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cross-reference detection
// ---------------------------------------------------------------------------

/// Names in each sensor's formulas that refer to *other* sensors in the set
/// (by unique_id or by resolved entity_id). Sensors with no cross-sensor
/// references are omitted.
pub fn detect_cross_references(set: &SensorSet) -> IndexMap<String, Vec<String>> {
    let mut sensor_ids: IndexSet<String> = IndexSet::new();
    for sensor in set.sensors.values() {
        sensor_ids.insert(sensor.unique_id.clone());
        sensor_ids.insert(sensor.resolved_entity_id());
    }

    let mut result = IndexMap::new();
    for sensor in set.sensors.values() {
        let own = [sensor.unique_id.clone(), sensor.resolved_entity_id()];
        let mut refs: IndexSet<String> = IndexSet::new();
        for formula in &sensor.formulas {
            collect_formula_names(formula, &mut |name| {
                if sensor_ids.contains(name) && !own.contains(&name.to_string()) {
                    refs.insert(name.to_string());
                }
            });
        }
        if !refs.is_empty() {
            result.insert(sensor.unique_id.clone(), refs.into_iter().collect());
        }
    }
    result
}

/// Every name referenced anywhere in one sensor: formula texts, variable
/// binding values, computed formulas, and alternate branches.
pub fn sensor_reference_names(sensor: &crate::model::SensorConfig) -> IndexSet<String> {
    let mut names = IndexSet::new();
    for formula in &sensor.formulas {
        collect_formula_names(formula, &mut |name| {
            names.insert(name.to_string());
        });
    }
    names
}

/// Collection queries appearing anywhere in one sensor's formulas.
pub fn sensor_collection_queries(
    sensor: &crate::model::SensorConfig,
) -> Vec<sf_lang::plan::DynamicQuery> {
    let mut queries = Vec::new();
    for formula in &sensor.formulas {
        collect_formula_texts(formula, &mut |text| {
            if let Ok(expr) = parse_formula(text)
                && let Ok(analysis) = analyze(&expr)
            {
                queries.extend(analysis.queries);
            }
        });
    }
    queries
}

fn collect_formula_texts(formula: &crate::model::FormulaConfig, f: &mut impl FnMut(&str)) {
    f(&formula.formula);
    for binding in formula.variables.values() {
        if let VariableBinding::Computed(c) = binding {
            f(&c.formula);
        }
    }
    collect_alternate_texts(&formula.alternates, f);
}

fn collect_alternate_texts(alternates: &AlternateStates, f: &mut impl FnMut(&str)) {
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
            AlternateValue::Formula(text) => f(text),
            AlternateValue::Detailed(detail) => {
                f(&detail.formula);
                for binding in detail.variables.values() {
                    if let VariableBinding::Computed(c) = binding {
                        f(&c.formula);
                    }
                }
                collect_alternate_texts(&detail.alternates, f);
            }
        }
    }
}

/// Names referenced by one formula (text, bindings, alternates).
pub fn formula_reference_names(formula: &crate::model::FormulaConfig) -> IndexSet<String> {
    let mut names = IndexSet::new();
    collect_formula_names(formula, &mut |name| {
        names.insert(name.to_string());
    });
    names
}

fn collect_formula_names(formula: &crate::model::FormulaConfig, f: &mut impl FnMut(&str)) {
    collect_text_names(&formula.formula, f);
    for binding in formula.variables.values() {
        collect_binding_names(binding, f);
    }
    collect_alternate_names(&formula.alternates, f);
}

fn collect_binding_names(binding: &VariableBinding, f: &mut impl FnMut(&str)) {
    match binding {
        VariableBinding::EntityRef(r) | VariableBinding::Reference(r) => f(r),
        VariableBinding::Literal(_) => {}
        VariableBinding::Computed(c) => {
            collect_text_names(&c.formula, f);
            collect_alternate_names(&c.alternates, f);
        }
    }
}

fn collect_alternate_names(alternates: &AlternateStates, f: &mut impl FnMut(&str)) {
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
            AlternateValue::Formula(text) => collect_text_names(text, f),
            AlternateValue::Detailed(detail) => {
                collect_text_names(&detail.formula, f);
                for binding in detail.variables.values() {
                    collect_binding_names(binding, f);
                }
                collect_alternate_names(&detail.alternates, f);
            }
        }
    }
}

fn collect_text_names(text: &str, f: &mut impl FnMut(&str)) {
    if let Ok(expr) = parse_formula(text)
        && let Ok(analysis) = analyze(&expr)
    {
        for name in &analysis.names {
            f(name);
        }
    }
}
