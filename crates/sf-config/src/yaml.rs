use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{
    AlternateFormula, AlternateStates, AlternateValue, ComputedVariable, FormulaConfig,
    GlobalSettings, ScalarLiteral, SensorConfig, SensorSet, VariableBinding,
};
use crate::validate;

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// Raw YAML structure (intermediate representation)
// ---------------------------------------------------------------------------

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct RawSensorSet {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    global_settings: Option<RawGlobalSettings>,
    #[serde(default)]
    sensors: IndexMap<String, RawSensor>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawGlobalSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    variables: IndexMap<String, RawVariable>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    metadata: IndexMap<String, ScalarLiteral>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawSensor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_identifier: Option<String>,
    formula: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    variables: IndexMap<String, RawVariable>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    attributes: IndexMap<String, RawAttribute>,
    #[serde(rename = "UNAVAILABLE", default, skip_serializing_if = "Option::is_none")]
    unavailable: Option<RawAlternate>,
    #[serde(rename = "UNKNOWN", default, skip_serializing_if = "Option::is_none")]
    unknown: Option<RawAlternate>,
    #[serde(rename = "NONE", default, skip_serializing_if = "Option::is_none")]
    none: Option<RawAlternate>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    metadata: IndexMap<String, ScalarLiteral>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawAttribute {
    formula: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    variables: IndexMap<String, RawVariable>,
    #[serde(rename = "UNAVAILABLE", default, skip_serializing_if = "Option::is_none")]
    unavailable: Option<RawAlternate>,
    #[serde(rename = "UNKNOWN", default, skip_serializing_if = "Option::is_none")]
    unknown: Option<RawAlternate>,
    #[serde(rename = "NONE", default, skip_serializing_if = "Option::is_none")]
    none: Option<RawAlternate>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    metadata: IndexMap<String, ScalarLiteral>,
}

/// A variable binding: scalar or computed-formula object.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawVariable {
    Computed(RawComputed),
    Scalar(ScalarLiteral),
}

#[derive(Debug, Serialize, Deserialize)]
struct RawComputed {
    formula: String,
    #[serde(rename = "UNAVAILABLE", default, skip_serializing_if = "Option::is_none")]
    unavailable: Option<RawAlternate>,
    #[serde(rename = "UNKNOWN", default, skip_serializing_if = "Option::is_none")]
    unknown: Option<RawAlternate>,
    #[serde(rename = "NONE", default, skip_serializing_if = "Option::is_none")]
    none: Option<RawAlternate>,
}

/// An alternate-state branch: bare scalar, formula string, or full object.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawAlternate {
    Object(Box<RawAlternateObject>),
    Scalar(ScalarLiteral),
}

#[derive(Debug, Serialize, Deserialize)]
struct RawAlternateObject {
    formula: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    variables: IndexMap<String, RawVariable>,
    #[serde(rename = "UNAVAILABLE", default, skip_serializing_if = "Option::is_none")]
    unavailable: Option<RawAlternate>,
    #[serde(rename = "UNKNOWN", default, skip_serializing_if = "Option::is_none")]
    unknown: Option<RawAlternate>,
    #[serde(rename = "NONE", default, skip_serializing_if = "Option::is_none")]
    none: Option<RawAlternate>,
}

// ---------------------------------------------------------------------------
// Lowering: raw → model
// ---------------------------------------------------------------------------

fn lower_variable(raw: RawVariable) -> VariableBinding {
    match raw {
        RawVariable::Scalar(ScalarLiteral::Str(s)) => VariableBinding::from_string(s),
        RawVariable::Scalar(lit) => VariableBinding::Literal(lit),
        RawVariable::Computed(c) => VariableBinding::Computed(Box::new(ComputedVariable {
            formula: c.formula,
            alternates: lower_alternates(c.unavailable, c.unknown, c.none),
        })),
    }
}

fn lower_alternate(raw: RawAlternate) -> AlternateValue {
    match raw {
        // A string-valued branch is a formula; numbers and booleans are
        // literal fallbacks.
        RawAlternate::Scalar(ScalarLiteral::Str(s)) => AlternateValue::Formula(s),
        RawAlternate::Scalar(lit) => AlternateValue::Literal(lit),
        RawAlternate::Object(obj) => AlternateValue::Detailed(Box::new(AlternateFormula {
            formula: obj.formula,
            variables: obj
                .variables
                .into_iter()
                .map(|(k, v)| (k, lower_variable(v)))
                .collect(),
            alternates: lower_alternates(obj.unavailable, obj.unknown, obj.none),
        })),
    }
}

fn lower_alternates(
    unavailable: Option<RawAlternate>,
    unknown: Option<RawAlternate>,
    none: Option<RawAlternate>,
) -> AlternateStates {
    AlternateStates {
        unavailable: unavailable.map(lower_alternate),
        unknown: unknown.map(lower_alternate),
        none: none.map(lower_alternate),
    }
}

fn lower_sensor(unique_id: &str, raw: RawSensor) -> SensorConfig {
    let mut formulas = Vec::with_capacity(1 + raw.attributes.len());

    formulas.push(FormulaConfig {
        id: unique_id.to_string(),
        attribute: None,
        formula: raw.formula,
        variables: raw
            .variables
            .into_iter()
            .map(|(k, v)| (k, lower_variable(v)))
            .collect(),
        alternates: lower_alternates(raw.unavailable, raw.unknown, raw.none),
        metadata: IndexMap::new(),
    });

    for (attr_name, attr) in raw.attributes {
        formulas.push(FormulaConfig {
            id: format!("{unique_id}_{attr_name}"),
            attribute: Some(attr_name),
            formula: attr.formula,
            variables: attr
                .variables
                .into_iter()
                .map(|(k, v)| (k, lower_variable(v)))
                .collect(),
            alternates: lower_alternates(attr.unavailable, attr.unknown, attr.none),
            metadata: attr.metadata,
        });
    }

    SensorConfig {
        unique_id: unique_id.to_string(),
        name: raw.name,
        entity_id: raw.entity_id,
        device_identifier: raw.device_identifier,
        formulas,
        metadata: raw.metadata,
    }
}

// ---------------------------------------------------------------------------
// Raising: model → raw
// ---------------------------------------------------------------------------

fn raise_variable(binding: &VariableBinding) -> RawVariable {
    match binding {
        VariableBinding::EntityRef(s) | VariableBinding::Reference(s) => {
            RawVariable::Scalar(ScalarLiteral::Str(s.clone()))
        }
        VariableBinding::Literal(lit) => RawVariable::Scalar(lit.clone()),
        VariableBinding::Computed(c) => RawVariable::Computed(RawComputed {
            formula: c.formula.clone(),
            unavailable: c.alternates.unavailable.as_ref().map(raise_alternate),
            unknown: c.alternates.unknown.as_ref().map(raise_alternate),
            none: c.alternates.none.as_ref().map(raise_alternate),
        }),
    }
}

fn raise_alternate(value: &AlternateValue) -> RawAlternate {
    match value {
        AlternateValue::Literal(lit) => RawAlternate::Scalar(lit.clone()),
        AlternateValue::Formula(s) => RawAlternate::Scalar(ScalarLiteral::Str(s.clone())),
        AlternateValue::Detailed(d) => RawAlternate::Object(Box::new(RawAlternateObject {
            formula: d.formula.clone(),
            variables: d
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), raise_variable(v)))
                .collect(),
            unavailable: d.alternates.unavailable.as_ref().map(raise_alternate),
            unknown: d.alternates.unknown.as_ref().map(raise_alternate),
            none: d.alternates.none.as_ref().map(raise_alternate),
        })),
    }
}

fn raise_variables(vars: &IndexMap<String, VariableBinding>) -> IndexMap<String, RawVariable> {
    vars.iter()
        .map(|(k, v)| (k.clone(), raise_variable(v)))
        .collect()
}

fn raise_sensor(sensor: &SensorConfig) -> RawSensor {
    let main = sensor.main_formula();
    let mut attributes = IndexMap::new();
    for attr in sensor.attribute_formulas() {
        let name = attr.attribute.clone().unwrap_or_else(|| attr.id.clone());
        attributes.insert(
            name,
            RawAttribute {
                formula: attr.formula.clone(),
                variables: raise_variables(&attr.variables),
                unavailable: attr.alternates.unavailable.as_ref().map(raise_alternate),
                unknown: attr.alternates.unknown.as_ref().map(raise_alternate),
                none: attr.alternates.none.as_ref().map(raise_alternate),
                metadata: attr.metadata.clone(),
            },
        );
    }

    RawSensor {
        name: sensor.name.clone(),
        entity_id: sensor.entity_id.clone(),
        device_identifier: sensor.device_identifier.clone(),
        formula: main.formula.clone(),
        variables: raise_variables(&main.variables),
        attributes,
        unavailable: main.alternates.unavailable.as_ref().map(raise_alternate),
        unknown: main.alternates.unknown.as_ref().map(raise_alternate),
        none: main.alternates.none.as_ref().map(raise_alternate),
        metadata: sensor.metadata.clone(),
    }
}

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

/// Outcome of a YAML import: what was loaded and what was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportResult {
    pub sensors_imported: usize,
    pub sensor_unique_ids: Vec<String>,
    pub errors: Vec<String>,
}

/// Parse a sensor-set YAML document.
///
/// YAML-level failures are fatal. Sensors that fail per-sensor validation
/// (syntax, analysis, computed-variable cycles) are skipped and recorded in
/// [`ImportResult::errors`]; the remaining sensors are imported.
pub fn import_yaml(input: &str) -> Result<(SensorSet, ImportResult), ConfigError> {
    let raw: RawSensorSet = serde_yaml::from_str(input)?;

    let global_settings = match raw.global_settings {
        Some(g) => GlobalSettings {
            device_identifier: g.device_identifier,
            variables: g
                .variables
                .into_iter()
                .map(|(k, v)| (k, lower_variable(v)))
                .collect(),
            metadata: g.metadata,
        },
        None => GlobalSettings::default(),
    };

    let mut set = SensorSet {
        version: raw.version,
        global_settings,
        sensors: IndexMap::new(),
    };
    let mut result = ImportResult::default();

    for (unique_id, raw_sensor) in raw.sensors {
        let sensor = lower_sensor(&unique_id, raw_sensor);
        match validate::validate_sensor(&sensor) {
            Ok(()) => {
                result.sensor_unique_ids.push(unique_id.clone());
                set.sensors.insert(unique_id, sensor);
            }
            Err(e) => result.errors.push(e.to_string()),
        }
    }
    result.sensors_imported = result.sensor_unique_ids.len();

    validate::validate_globals(&set)?;

    Ok((set, result))
}

/// Serialize a sensor set back to YAML.
pub fn export_yaml(set: &SensorSet) -> Result<String, ConfigError> {
    let raw = RawSensorSet {
        version: set.version.clone(),
        global_settings: if set.global_settings == GlobalSettings::default() {
            None
        } else {
            Some(RawGlobalSettings {
                device_identifier: set.global_settings.device_identifier.clone(),
                variables: raise_variables(&set.global_settings.variables),
                metadata: set.global_settings.metadata.clone(),
            })
        },
        sensors: set
            .sensors
            .iter()
            .map(|(k, s)| (k.clone(), raise_sensor(s)))
            .collect(),
    };
    Ok(serde_yaml::to_string(&raw)?)
}
