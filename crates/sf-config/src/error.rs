use sf_lang::analysis::AnalysisError;
use sf_lang::formula_parser::FormulaParseError;

/// Configuration-load failures. All variants are fatal: a sensor set that
/// fails here is rejected before it reaches the engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("sensor {sensor}, formula {formula_id}: {source}")]
    Syntax {
        sensor: String,
        formula_id: String,
        #[source]
        source: FormulaParseError,
    },

    #[error("sensor {sensor}, formula {formula_id}: {source}")]
    Analysis {
        sensor: String,
        formula_id: String,
        #[source]
        source: AnalysisError,
    },

    #[error("sensor {sensor}: computed variable cycle: {cycle}")]
    ComputedVariableCycle { sensor: String, cycle: String },

    #[error("global variable {name:?} collides with a sensor unique_id")]
    AmbiguousGlobalVariable { name: String },

    #[error("sensor {sensor}: {message}")]
    InvalidSensor { sensor: String, message: String },

    #[error("{0}")]
    Invalid(String),
}
