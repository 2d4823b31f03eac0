use indexmap::{IndexMap, IndexSet};

use crate::analysis::FormulaAnalysis;

// ---------------------------------------------------------------------------
// Collection queries
// ---------------------------------------------------------------------------

/// Aggregation function applied to a collection pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CollectionFn {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    Std,
    Var,
    Select,
}

impl CollectionFn {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "count" => Self::Count,
            "min" => Self::Min,
            "max" => Self::Max,
            "std" => Self::Std,
            "var" => Self::Var,
            "select" => Self::Select,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
            Self::Var => "var",
            Self::Select => "select",
        }
    }
}

/// The kind of pattern a collection query matches entities with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum QueryType {
    Regex,
    DeviceClass,
    Area,
    Label,
    Attribute,
    State,
}

impl QueryType {
    /// Split a pattern string into its query type and payload, e.g.
    /// `"device_class:power"` → `(DeviceClass, "power")`.
    pub fn split_pattern(pattern: &str) -> Option<(Self, &str)> {
        let (prefix, rest) = pattern.split_once(':')?;
        let qt = match prefix {
            "regex" => Self::Regex,
            "device_class" => Self::DeviceClass,
            "area" => Self::Area,
            "label" => Self::Label,
            "attribute" => Self::Attribute,
            "state" => Self::State,
            _ => return None,
        };
        Some((qt, rest))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::DeviceClass => "device_class",
            Self::Area => "area",
            Self::Label => "label",
            Self::Attribute => "attribute",
            Self::State => "state",
        }
    }
}

/// One collection query site: `sum("device_class:power")` records
/// `(Sum, DeviceClass, "power")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicQuery {
    pub function: CollectionFn,
    pub query_type: QueryType,
    pub pattern: String,
}

/// One `metadata(entity, key)` call site.
///
/// `entity_ref` is the textual reference of the first argument — a full
/// entity id or the variable name that resolves to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataCall {
    pub entity_ref: String,
    pub key: String,
}

// ---------------------------------------------------------------------------
// Binding plan
// ---------------------------------------------------------------------------

/// How a free name in a formula is resolved to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StrategyTag {
    /// Already present in the hierarchical context.
    Context,
    /// The variable binding is a literal constant.
    Literal,
    /// Resolved through a registered integration data provider.
    DataProvider,
    /// Resolved from the host's entity state.
    HaState,
    /// The name is another sensor's unique id; read from the registry.
    CrossSensor,
    /// The binding is a sub-formula evaluated before the main formula.
    Computed,
}

/// Everything the evaluator needs to know about a formula before touching
/// any state, derived once from the AST and shared across cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingPlan {
    /// Free names in evaluation order of first appearance.
    pub names: IndexSet<String>,
    /// Resolution strategy per free name.
    pub strategies: IndexMap<String, StrategyTag>,
    pub metadata_calls: Vec<MetadataCall>,
    pub queries: Vec<DynamicQuery>,
    /// No metadata, no collections, no string work — eligible for the
    /// numeric fast path.
    pub pure_numeric: bool,
}

impl BindingPlan {
    /// Build a plan with structural default strategies: the `state` token
    /// resolves from context, everything else defaults to host state. The
    /// evaluator overlays config-derived tags (literal, computed,
    /// cross-sensor) before preparing the context.
    pub fn from_analysis(analysis: &FormulaAnalysis) -> Self {
        let mut strategies = IndexMap::with_capacity(analysis.names.len());
        for name in &analysis.names {
            let tag = if name == "state" {
                StrategyTag::Context
            } else {
                StrategyTag::HaState
            };
            strategies.insert(name.clone(), tag);
        }
        Self {
            names: analysis.names.clone(),
            strategies,
            metadata_calls: analysis.metadata_calls.clone(),
            queries: analysis.queries.clone(),
            pure_numeric: analysis.pure_numeric,
        }
    }

    pub fn has_metadata(&self) -> bool {
        !self.metadata_calls.is_empty()
    }

    pub fn has_collections(&self) -> bool {
        !self.queries.is_empty()
    }
}
