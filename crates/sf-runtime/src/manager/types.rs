use std::collections::HashMap;

use sf_config::model::SensorSet;
use sf_core::depgraph::DependencyGraph;
use sf_core::host::DataProviderRegistry;

/// The immutable-per-cycle engine state: configuration snapshot, graph
/// indexes, backing-entity mapping, and registered data providers.
///
/// CRUD operations take the write lock, build the replacement pieces, and
/// swap them in between cycles.
pub(crate) struct EngineState {
    pub set: SensorSet,
    pub graph: DependencyGraph,
    /// sensor unique_id → backing entity filling its `state` token.
    pub backing: HashMap<String, String>,
    pub providers: DataProviderRegistry,
}

impl EngineState {
    pub fn empty() -> Self {
        Self {
            set: SensorSet::empty(),
            graph: DependencyGraph::default(),
            backing: HashMap::new(),
            providers: DataProviderRegistry::default(),
        }
    }
}

/// What one update cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleReport {
    /// Sensors evaluated and committed, in evaluation order.
    pub evaluated: Vec<String>,
    /// Sensors in the affected closure that needed no re-work (no backing
    /// change, no dependency value change).
    pub skipped: Vec<String>,
    /// Sensors whose evaluation failed; their previous values stand.
    pub failed: Vec<String>,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.evaluated.is_empty() && self.skipped.is_empty() && self.failed.is_empty()
    }
}
