pub mod alternate;
pub mod collection;
pub mod context;
pub mod depgraph;
pub mod error;
pub mod eval;
pub mod host;
pub mod metadata;
pub mod registry;
pub mod resolve;
pub mod value;

#[cfg(test)]
pub mod testkit;

pub use context::{ContextEntry, HierarchicalContext};
pub use depgraph::DependencyGraph;
pub use error::{CoreError, CoreReason, CoreResult};
pub use eval::{AstService, CacheStats, CompilationCache, EvaluationOutcome, Evaluator};
pub use host::{
    DataProviderFn, DataProviderRegistry, DeviceInfo, HostAdapter, ProviderResult, StateSnapshot,
};
pub use registry::{RegisteredSensor, SensorRegistry};
pub use resolve::{FormulaKind, LazyResolver, Resolution, ResolutionEnv, VariableResolver};
pub use value::{ReferenceValue, Value, parse_state};
