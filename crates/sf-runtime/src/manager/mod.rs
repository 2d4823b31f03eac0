use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use indexmap::{IndexMap, IndexSet};
use orion_error::StructError;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use sf_config::model::SensorSet;
use sf_config::settings::EngineSettings;
use sf_config::{ReassignmentPlan, apply_reassignment, validate_sensor_set};
use sf_core::depgraph::DependencyGraph;
use sf_core::eval::{CacheStats, Evaluator};
use sf_core::host::{DataProviderFn, HostAdapter, ProviderResult};
use sf_core::registry::SensorRegistry;
use sf_core::value::Value;

use crate::error::{RuntimeReason, RuntimeResult};
use crate::signals::{HostSignals, NullSignals};

mod crud;
mod cycle;
mod types;

pub use types::CycleReport;
use types::EngineState;

// ---------------------------------------------------------------------------
// SensorManager
// ---------------------------------------------------------------------------

/// Owns one engine instance: the evaluator and its caches, the sensor
/// registry, the dependency indexes, and the update coordination.
///
/// Update cycles are serialized; concurrent change notifications merge
/// their entity sets into the cycle already pending. A cycle in flight is
/// never cancelled — shutdown takes effect afterwards.
pub struct SensorManager {
    host: Arc<dyn HostAdapter>,
    signals: Arc<dyn HostSignals>,
    settings: EngineSettings,
    evaluator: Evaluator,
    registry: SensorRegistry,
    state: RwLock<EngineState>,
    /// Entities waiting for the next cycle; drained under the cycle gate.
    pending: StdMutex<IndexSet<String>>,
    cycle_gate: Mutex<()>,
    shutdown: CancellationToken,
}

impl SensorManager {
    pub fn new(host: Arc<dyn HostAdapter>, settings: EngineSettings) -> Self {
        Self::with_signals(host, Arc::new(NullSignals), settings)
    }

    pub fn with_signals(
        host: Arc<dyn HostAdapter>,
        signals: Arc<dyn HostSignals>,
        settings: EngineSettings,
    ) -> Self {
        let evaluator = Evaluator::with_capacities(
            settings.ast_cache_capacity,
            settings.compilation_cache_capacity,
            settings.numeric_cache_capacity,
        );
        Self {
            host,
            signals,
            settings,
            evaluator,
            registry: SensorRegistry::new(),
            state: RwLock::new(EngineState::empty()),
            pending: StdMutex::new(IndexSet::new()),
            cycle_gate: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Bulk sensor registration: validate, normalize self references,
    /// build the dependency indexes, seed the registry.
    #[tracing::instrument(name = "engine.register", skip_all, fields(sensors = set.sensors.len()))]
    pub async fn register_sensors(&self, mut set: SensorSet) -> RuntimeResult<()> {
        validate_sensor_set(&set).map_err(|e| configuration_error(e.to_string()))?;

        // A sensor naming itself inside an attribute formula means `state`;
        // rewriting up front keeps those out of the dependency graph.
        apply_reassignment(&mut set, &ReassignmentPlan::default());

        let mut state = self.state.write().await;
        let graph = DependencyGraph::build_with_host(&set, &state.backing, self.host.as_ref())
            .map_err(|e| configuration_error(e.to_string()))?;
        graph
            .validate()
            .map_err(|e| configuration_error(e.to_string()))?;
        graph
            .validate_cross_sensor_references(&set)
            .map_err(|e| configuration_error(e.to_string()))?;

        self.registry.clear();
        for sensor in set.sensors.values() {
            self.registry
                .register(&sensor.unique_id, &sensor.resolved_entity_id());
        }

        sf_info!(
            conf,
            sensors = set.sensors.len(),
            formulas = set.formula_count(),
            "sensor set registered"
        );
        state.set = set;
        state.graph = graph;
        Ok(())
    }

    /// Name the virtual entities an integration data provider answers for.
    /// The callback is wrapped with the configured time budget: an
    /// over-budget read degrades to an unresolved dependency so alternate
    /// branches can take over.
    pub async fn register_data_provider(
        &self,
        entity_ids: impl IntoIterator<Item = String>,
        callback: DataProviderFn,
    ) {
        let budget = self.settings.data_provider_timeout.as_duration();
        let wrapped: DataProviderFn = Arc::new(move |entity_id: &str| {
            let start = Instant::now();
            let result = callback(entity_id);
            if start.elapsed() > budget {
                sf_warn!(
                    res,
                    entity = %entity_id,
                    budget_ms = budget.as_millis() as u64,
                    "data provider exceeded its time budget, treating as unresolved"
                );
                return Some(ProviderResult {
                    value: Value::Unknown,
                    exists: false,
                    attributes: HashMap::new(),
                });
            }
            result
        });

        let mut state = self.state.write().await;
        state.providers.register(entity_ids, wrapped);
    }

    /// Map sensors to the backing entities that fill their `state` token,
    /// and rebuild the graph with the new backing edges.
    pub async fn register_sensor_to_backing_mapping(
        &self,
        mapping: HashMap<String, String>,
    ) -> RuntimeResult<()> {
        let mut state = self.state.write().await;
        state.backing = mapping;
        let graph = DependencyGraph::build_with_host(&state.set, &state.backing, self.host.as_ref())
            .map_err(|e| configuration_error(e.to_string()))?;
        graph
            .validate()
            .map_err(|e| configuration_error(e.to_string()))?;
        state.graph = graph;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Update cycles
    // -----------------------------------------------------------------------

    /// The engine's re-evaluation entry point: compute the affected
    /// closure, evaluate it in dependency order, publish.
    ///
    /// Concurrent invocations merge: entities queue into the pending set,
    /// and whichever caller holds the gate drains the union. A caller
    /// whose entities were absorbed by another cycle gets an empty report.
    #[tracing::instrument(name = "engine.cycle", skip_all)]
    pub async fn on_backing_entities_changed(
        &self,
        entities: impl IntoIterator<Item = String>,
    ) -> RuntimeResult<CycleReport> {
        if self.shutdown.is_cancelled() {
            return StructError::from(RuntimeReason::Shutdown).err();
        }
        {
            let mut pending = self.pending.lock().expect("pending set lock poisoned");
            pending.extend(entities);
        }

        let debounce = self.settings.update_debounce.as_duration();
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }

        let _gate = self.cycle_gate.lock().await;
        let drained: IndexSet<String> = {
            let mut pending = self.pending.lock().expect("pending set lock poisoned");
            std::mem::take(&mut *pending)
        };
        if drained.is_empty() {
            return Ok(CycleReport::default());
        }

        let state = self.state.read().await;
        Ok(self.run_cycle(&state, &drained, false))
    }

    /// Evaluate every sensor in topological order of the full graph.
    #[tracing::instrument(name = "engine.update_all", skip_all)]
    pub async fn update_all(&self) -> RuntimeResult<CycleReport> {
        if self.shutdown.is_cancelled() {
            return StructError::from(RuntimeReason::Shutdown).err();
        }
        let _gate = self.cycle_gate.lock().await;
        let state = self.state.read().await;
        let all: IndexSet<String> = state.set.sensors.keys().cloned().collect();
        Ok(self.run_cycle(&state, &all, true))
    }

    // -----------------------------------------------------------------------
    // Reassignment
    // -----------------------------------------------------------------------

    /// Rewrite every reference after the host renamed entities (or a CRUD
    /// operation renamed sensors), then re-validate and rebuild indexes.
    pub async fn apply_entity_renames(
        &self,
        mapping: IndexMap<String, String>,
    ) -> RuntimeResult<()> {
        let mut state = self.state.write().await;
        let formulas_before = state.set.formula_count();

        apply_reassignment(&mut state.set, &ReassignmentPlan { mapping: mapping.clone() });
        debug_assert_eq!(state.set.formula_count(), formulas_before);

        // Backing entities renamed by the host follow the mapping.
        for backing in state.backing.values_mut() {
            if let Some(new) = mapping.get(backing.as_str()) {
                *backing = new.clone();
            }
        }

        validate_sensor_set(&state.set).map_err(|e| configuration_error(e.to_string()))?;
        let graph = DependencyGraph::build_with_host(&state.set, &state.backing, self.host.as_ref())
            .map_err(|e| configuration_error(e.to_string()))?;
        graph
            .validate()
            .map_err(|e| configuration_error(e.to_string()))?;
        graph
            .validate_cross_sensor_references(&state.set)
            .map_err(|e| configuration_error(e.to_string()))?;

        // Re-key the registry, carrying committed values across the rename.
        let previous: Vec<(String, Option<Value>)> = state
            .set
            .sensors
            .keys()
            .map(|uid| {
                let old = mapping
                    .iter()
                    .find(|(_, new)| *new == uid)
                    .map(|(old, _)| old.clone())
                    .unwrap_or_else(|| uid.clone());
                (uid.clone(), self.registry.get(&old).map(|s| s.value))
            })
            .collect();
        self.registry.clear();
        for sensor in state.set.sensors.values() {
            self.registry
                .register(&sensor.unique_id, &sensor.resolved_entity_id());
        }
        for (uid, value) in previous {
            if let Some(value) = value {
                self.registry.publish(&uid, value);
            }
        }

        sf_info!(conf, renames = mapping.len(), "cross-sensor references reassigned");
        state.graph = graph;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Introspection & lifecycle
    // -----------------------------------------------------------------------

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// A sensor's last committed value.
    pub fn current_value(&self, unique_id: &str) -> Option<Value> {
        self.registry.get(unique_id).map(|s| s.value)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.evaluator.cache_stats()
    }

    pub fn clear_caches(&self) {
        self.evaluator.clear_caches();
    }

    /// Request shutdown; takes effect after the in-flight cycle completes.
    pub fn shutdown(&self) {
        sf_info!(sys, "engine shutdown requested");
        self.shutdown.cancel();
    }
}

fn configuration_error(message: String) -> crate::error::RuntimeError {
    StructError::from(RuntimeReason::Configuration(message))
}
