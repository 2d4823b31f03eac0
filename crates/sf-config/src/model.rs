use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use sf_lang::ast::is_entity_reference;

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// A literal constant as it appears in YAML variables and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum ScalarLiteral {
    Bool(bool),
    Number(f64),
    Str(String),
}

impl ScalarLiteral {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Variable bindings
// ---------------------------------------------------------------------------

/// The value side of one `variables:` entry.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum VariableBinding {
    /// `<domain>.<object>` — resolved against host state (or a data
    /// provider that owns the entity).
    EntityRef(String),
    /// A bare identifier. Resolves to another sensor's current value when it
    /// matches a unique_id in the set; otherwise it is kept as a plain
    /// string constant.
    Reference(String),
    /// A number, boolean, or non-identifier string constant.
    Literal(ScalarLiteral),
    /// A sub-formula evaluated before the owning formula.
    Computed(Box<ComputedVariable>),
}

impl VariableBinding {
    /// Classify a raw YAML string value.
    pub fn from_string(value: String) -> Self {
        if is_entity_reference(&value) {
            VariableBinding::EntityRef(value)
        } else if is_bare_identifier(&value) {
            VariableBinding::Reference(value)
        } else {
            VariableBinding::Literal(ScalarLiteral::Str(value))
        }
    }

    /// The reference text carried by this binding, if it is one.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::EntityRef(r) | Self::Reference(r) => Some(r),
            _ => None,
        }
    }
}

fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A variable whose binding is itself a formula, with optional
/// alternate-state branches applied to its own result.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedVariable {
    pub formula: String,
    pub alternates: AlternateStates,
}

// ---------------------------------------------------------------------------
// Alternate states
// ---------------------------------------------------------------------------

/// The three sentinel-triggered branches a formula may declare.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlternateStates {
    pub unavailable: Option<AlternateValue>,
    pub unknown: Option<AlternateValue>,
    pub none: Option<AlternateValue>,
}

impl AlternateStates {
    pub fn is_empty(&self) -> bool {
        self.unavailable.is_none() && self.unknown.is_none() && self.none.is_none()
    }
}

/// One alternate branch: a bare literal, a formula string, or a full
/// formula object with its own variables.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AlternateValue {
    Literal(ScalarLiteral),
    Formula(String),
    Detailed(Box<AlternateFormula>),
}

/// Object form of an alternate branch.
#[derive(Debug, Clone, PartialEq)]
pub struct AlternateFormula {
    pub formula: String,
    pub variables: IndexMap<String, VariableBinding>,
    /// Nested alternates apply to this branch's computed variables, never
    /// recursively to the branch's own output.
    pub alternates: AlternateStates,
}

// ---------------------------------------------------------------------------
// Formulas and sensors
// ---------------------------------------------------------------------------

/// One formula of a sensor: the main formula or an attribute formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaConfig {
    /// `<unique_id>` for the main formula, `<unique_id>_<attr>` for
    /// attribute formulas.
    pub id: String,
    /// Attribute name; `None` for the main formula.
    pub attribute: Option<String>,
    pub formula: String,
    pub variables: IndexMap<String, VariableBinding>,
    pub alternates: AlternateStates,
    pub metadata: IndexMap<String, ScalarLiteral>,
}

impl FormulaConfig {
    pub fn new(id: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attribute: None,
            formula: formula.into(),
            variables: IndexMap::new(),
            alternates: AlternateStates::default(),
            metadata: IndexMap::new(),
        }
    }

    pub fn is_main(&self) -> bool {
        self.attribute.is_none()
    }
}

/// A user-declared synthetic sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    pub unique_id: String,
    pub name: Option<String>,
    /// Explicit entity id override; otherwise derived as
    /// `sensor.<unique_id>`.
    pub entity_id: Option<String>,
    pub device_identifier: Option<String>,
    /// Non-empty; the first entry is the main formula.
    pub formulas: Vec<FormulaConfig>,
    pub metadata: IndexMap<String, ScalarLiteral>,
}

impl SensorConfig {
    pub fn main_formula(&self) -> &FormulaConfig {
        &self.formulas[0]
    }

    pub fn attribute_formulas(&self) -> &[FormulaConfig] {
        &self.formulas[1..]
    }

    /// The entity id this sensor publishes under.
    pub fn resolved_entity_id(&self) -> String {
        self.entity_id
            .clone()
            .unwrap_or_else(|| format!("sensor.{}", self.unique_id))
    }
}

// ---------------------------------------------------------------------------
// Global settings and sensor sets
// ---------------------------------------------------------------------------

/// Per-set settings shared by every sensor in the set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlobalSettings {
    pub device_identifier: Option<String>,
    pub variables: IndexMap<String, VariableBinding>,
    pub metadata: IndexMap<String, ScalarLiteral>,
}

/// A named collection of sensors with shared global settings — the unit of
/// CRUD and YAML import/export.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSet {
    pub version: String,
    pub global_settings: GlobalSettings,
    pub sensors: IndexMap<String, SensorConfig>,
}

impl SensorSet {
    pub fn empty() -> Self {
        Self {
            version: "1.0".to_string(),
            global_settings: GlobalSettings::default(),
            sensors: IndexMap::new(),
        }
    }

    pub fn sensor(&self, unique_id: &str) -> Option<&SensorConfig> {
        self.sensors.get(unique_id)
    }

    /// Total formula count across every sensor (main + attributes).
    pub fn formula_count(&self) -> usize {
        self.sensors.values().map(|s| s.formulas.len()).sum()
    }
}
