use orion_error::StructError;

use sf_config::model::SensorConfig;
use sf_config::{ReassignmentPlan, apply_reassignment};
use sf_core::depgraph::DependencyGraph;
use sf_core::value::Value;

use crate::error::{RuntimeReason, RuntimeResult};

use super::SensorManager;

/// Runtime CRUD: each operation builds a new configuration snapshot,
/// validates it fully (per-sensor checks, graph cycles, cross-sensor
/// references), and swaps it in atomically between cycles. The running
/// configuration is untouched when anything fails.
impl SensorManager {
    /// Add one sensor to the running set.
    pub async fn add_sensor(&self, sensor: SensorConfig) -> RuntimeResult<()> {
        let unique_id = sensor.unique_id.clone();
        let entity_id = sensor.resolved_entity_id();

        let mut state = self.state.write().await;
        let mut set = state.set.clone();
        set.add_sensor(sensor)
            .map_err(|e| crud_error(e.to_string()))?;
        apply_reassignment(&mut set, &ReassignmentPlan::default());

        let graph = DependencyGraph::build_with_host(&set, &state.backing, self.host.as_ref())
            .map_err(|e| crud_error(e.to_string()))?;
        graph.validate().map_err(|e| crud_error(e.to_string()))?;
        graph
            .validate_cross_sensor_references(&set)
            .map_err(|e| crud_error(e.to_string()))?;

        self.registry.register(&unique_id, &entity_id);
        sf_info!(conf, sensor = %unique_id, "sensor added");
        state.set = set;
        state.graph = graph;
        Ok(())
    }

    /// Replace one sensor's configuration, keeping its committed value
    /// until the next cycle recomputes it.
    pub async fn update_sensor(&self, sensor: SensorConfig) -> RuntimeResult<()> {
        let unique_id = sensor.unique_id.clone();
        let entity_id = sensor.resolved_entity_id();

        let mut state = self.state.write().await;
        let mut set = state.set.clone();
        set.update_sensor(sensor)
            .map_err(|e| crud_error(e.to_string()))?;
        apply_reassignment(&mut set, &ReassignmentPlan::default());

        let graph = DependencyGraph::build_with_host(&set, &state.backing, self.host.as_ref())
            .map_err(|e| crud_error(e.to_string()))?;
        graph.validate().map_err(|e| crud_error(e.to_string()))?;
        graph
            .validate_cross_sensor_references(&set)
            .map_err(|e| crud_error(e.to_string()))?;

        let previous = self.registry.get(&unique_id).map(|s| s.value);
        self.registry.register(&unique_id, &entity_id);
        if let Some(value) = previous {
            self.registry.publish(&unique_id, value);
        }
        sf_info!(conf, sensor = %unique_id, "sensor updated");
        state.set = set;
        state.graph = graph;
        Ok(())
    }

    /// Remove one sensor. Fails while other sensors still reference it.
    pub async fn remove_sensor(&self, unique_id: &str) -> RuntimeResult<()> {
        let mut state = self.state.write().await;
        let mut set = state.set.clone();
        set.remove_sensor(unique_id)
            .map_err(|e| crud_error(e.to_string()))?;

        let graph = DependencyGraph::build_with_host(&set, &state.backing, self.host.as_ref())
            .map_err(|e| crud_error(e.to_string()))?;
        graph.validate().map_err(|e| crud_error(e.to_string()))?;

        self.registry.remove(unique_id);
        state.backing.remove(unique_id);
        sf_info!(conf, sensor = %unique_id, "sensor removed");
        state.set = set;
        state.graph = graph;
        Ok(())
    }

    /// Rename a sensor, rewriting every reference to it and carrying its
    /// committed value across.
    pub async fn rename_sensor(&self, old_id: &str, new_id: &str) -> RuntimeResult<()> {
        let mut state = self.state.write().await;
        let mut set = state.set.clone();
        set.rename_sensor(old_id, new_id)
            .map_err(|e| crud_error(e.to_string()))?;

        // The state-token backing entry follows the renamed key.
        let mut backing = state.backing.clone();
        if let Some(entry) = backing.remove(old_id) {
            backing.insert(new_id.to_string(), entry);
        }

        let graph = DependencyGraph::build_with_host(&set, &backing, self.host.as_ref())
            .map_err(|e| crud_error(e.to_string()))?;
        graph.validate().map_err(|e| crud_error(e.to_string()))?;
        graph
            .validate_cross_sensor_references(&set)
            .map_err(|e| crud_error(e.to_string()))?;

        let previous: Option<Value> = self.registry.get(old_id).map(|s| s.value);
        self.registry.remove(old_id);
        if let Some(renamed) = set.sensor(new_id) {
            self.registry
                .register(&renamed.unique_id, &renamed.resolved_entity_id());
            if let Some(value) = previous {
                self.registry.publish(new_id, value);
            }
        }

        sf_info!(conf, from = %old_id, to = %new_id, "sensor renamed");
        state.set = set;
        state.graph = graph;
        state.backing = backing;
        Ok(())
    }
}

fn crud_error(message: String) -> crate::error::RuntimeError {
    StructError::from(RuntimeReason::Configuration(message))
}
