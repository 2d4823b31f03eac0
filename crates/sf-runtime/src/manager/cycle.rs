use indexmap::IndexSet;
use serde_json::{Map, Value as JsonValue};

use sf_config::model::SensorConfig;
use sf_core::context::HierarchicalContext;
use sf_core::error::CoreResult;
use sf_core::resolve::{FormulaKind, LazyResolver, ResolutionEnv};
use sf_core::value::{ReferenceValue, Value};

use crate::signals::{StateTag, value_to_json};

use super::types::{CycleReport, EngineState};
use super::SensorManager;

impl SensorManager {
    /// One update cycle over an already-computed set of changed entities.
    ///
    /// Invariants: sensors evaluate in dependency order; a sensor is
    /// re-evaluated only when one of its backing entities changed, one of
    /// its dependencies committed a different value this cycle, or
    /// `force` (update_all) is set; a failing sensor keeps its previous
    /// value and the cycle continues.
    pub(super) fn run_cycle(
        &self,
        state: &EngineState,
        changed_entities: &IndexSet<String>,
        force: bool,
    ) -> CycleReport {
        let mut lazy = LazyResolver::new();
        lazy.start_new_cycle();

        let (closure, seeds) = if force {
            let all: IndexSet<String> = state.set.sensors.keys().cloned().collect();
            (all.clone(), all)
        } else {
            (
                state
                    .graph
                    .affected_closure(changed_entities.iter().map(String::as_str)),
                state
                    .graph
                    .direct_readers(changed_entities.iter().map(String::as_str)),
            )
        };
        let order = state.graph.topological_order(&closure);

        let mut report = CycleReport::default();
        let mut value_changed: IndexSet<String> = IndexSet::new();

        for unique_id in order {
            let Some(sensor) = state.set.sensors.get(&unique_id) else {
                continue;
            };

            let direct = seeds.contains(&unique_id);
            let dependency_changed = state
                .graph
                .dependencies_of(&unique_id)
                .iter()
                .any(|dep| value_changed.contains(dep.as_str()));
            if !direct && !dependency_changed {
                report.skipped.push(unique_id);
                continue;
            }

            match self.evaluate_sensor(state, sensor, &mut lazy) {
                Ok((value, attributes)) => {
                    let previous = self.registry.get(&unique_id).map(|s| s.value);
                    if previous.as_ref() != Some(&value) {
                        value_changed.insert(unique_id.clone());
                    }
                    self.commit(sensor, value, attributes);
                    report.evaluated.push(unique_id);
                }
                Err(e) => {
                    sf_warn!(
                        cycle,
                        sensor = %unique_id,
                        error = %e,
                        "sensor evaluation failed, keeping previous value"
                    );
                    self.signals
                        .sensor_state_changed(&unique_id, StateTag::Error);
                    report.failed.push(unique_id);
                }
            }
        }

        sf_debug!(
            cycle,
            changed = changed_entities.len(),
            closure = closure.len(),
            evaluated = report.evaluated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "update cycle complete"
        );
        report
    }

    /// Evaluate one sensor: the main formula, then every attribute formula
    /// against the freshly computed `state`.
    fn evaluate_sensor(
        &self,
        state: &EngineState,
        sensor: &SensorConfig,
        lazy: &mut LazyResolver,
    ) -> CoreResult<(Value, Map<String, JsonValue>)> {
        let mut ctx = HierarchicalContext::new();
        let main = sensor.main_formula();

        let env = ResolutionEnv {
            host: self.host.as_ref(),
            registry: &self.registry,
            providers: &state.providers,
            locals: &main.variables,
            globals: &state.set.global_settings.variables,
            backing_entity: state.backing.get(&sensor.unique_id).cloned(),
            own_entity_id: Some(sensor.resolved_entity_id()),
            kind: FormulaKind::Main,
        };
        let outcome = self.evaluator.evaluate_formula(main, &env, &mut ctx, lazy)?;

        let mut attributes = Map::new();
        if !sensor.attribute_formulas().is_empty() {
            // Attribute formulas always see the just-computed main result
            // under `state`.
            ctx.push_layer();
            ctx.insert_reference(
                "state",
                ReferenceValue::new(sensor.unique_id.clone(), outcome.value.clone()),
            );

            for attr in sensor.attribute_formulas() {
                let attr_env = ResolutionEnv {
                    locals: &attr.variables,
                    kind: FormulaKind::Attribute,
                    ..env.clone()
                };
                match self.evaluator.evaluate_formula(attr, &attr_env, &mut ctx, lazy) {
                    Ok(attr_outcome) => {
                        let name = attr
                            .attribute
                            .clone()
                            .unwrap_or_else(|| attr.id.clone());
                        attributes.insert(name, value_to_json(&attr_outcome.value));
                    }
                    Err(e) => {
                        sf_warn!(
                            eval,
                            sensor = %sensor.unique_id,
                            formula = %attr.id,
                            error = %e,
                            "attribute formula failed, omitting attribute"
                        );
                    }
                }
            }
            ctx.pop_layer();
        }

        Ok((outcome.value, attributes))
    }

    /// Publish-at-commit: the registry and the host see the new value
    /// together, after the sensor's whole evaluation succeeded.
    fn commit(&self, sensor: &SensorConfig, value: Value, attributes: Map<String, JsonValue>) {
        self.registry.publish(&sensor.unique_id, value.clone());
        let entity_id = sensor.resolved_entity_id();
        self.signals
            .sensor_value_updated(&sensor.unique_id, &entity_id, &value, &attributes);
        self.signals
            .sensor_state_changed(&sensor.unique_id, StateTag::for_value(&value));
    }
}
