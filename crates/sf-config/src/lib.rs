pub mod crud;
pub mod error;
pub mod logging;
pub mod model;
pub mod reassign;
pub mod settings;
pub mod types;
pub mod validate;
pub mod yaml;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use model::{
    AlternateFormula, AlternateStates, AlternateValue, ComputedVariable, FormulaConfig,
    GlobalSettings, ScalarLiteral, SensorConfig, SensorSet, VariableBinding,
};
pub use reassign::{
    ReassignmentPlan, apply_reassignment, detect_cross_references, formula_reference_names,
    sensor_collection_queries, sensor_reference_names,
};
pub use settings::EngineSettings;
pub use types::HumanDuration;
pub use validate::validate_sensor_set;
pub use yaml::{ImportResult, export_yaml, import_yaml};
