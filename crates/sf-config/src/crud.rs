use indexmap::IndexMap;

use crate::error::ConfigError;
use crate::model::{GlobalSettings, ScalarLiteral, SensorConfig, SensorSet, VariableBinding};
use crate::reassign::{ReassignmentPlan, apply_reassignment};
use crate::validate::{validate_globals, validate_sensor, validate_sensor_set};


// ---------------------------------------------------------------------------
// Sensor-set CRUD
// ---------------------------------------------------------------------------

/// Mutating operations on a sensor set, each validating before committing.
///
/// These are the building blocks the storage layer drives; the engine only
/// ever sees the resulting snapshot. Every operation leaves the set
/// untouched on failure.
impl SensorSet {
    /// Add a new sensor. Fails on duplicate unique_id or invalid
    /// configuration.
    pub fn add_sensor(&mut self, sensor: SensorConfig) -> Result<(), ConfigError> {
        if self.sensors.contains_key(&sensor.unique_id) {
            return Err(ConfigError::InvalidSensor {
                sensor: sensor.unique_id.clone(),
                message: "unique_id already exists in this set".to_string(),
            });
        }
        validate_sensor(&sensor)?;
        if self.global_settings.variables.contains_key(&sensor.unique_id) {
            return Err(ConfigError::AmbiguousGlobalVariable {
                name: sensor.unique_id.clone(),
            });
        }
        self.sensors.insert(sensor.unique_id.clone(), sensor);
        Ok(())
    }

    /// Replace an existing sensor's configuration, keyed by unique_id.
    pub fn update_sensor(&mut self, sensor: SensorConfig) -> Result<(), ConfigError> {
        if !self.sensors.contains_key(&sensor.unique_id) {
            return Err(ConfigError::InvalidSensor {
                sensor: sensor.unique_id.clone(),
                message: "sensor does not exist in this set".to_string(),
            });
        }
        validate_sensor(&sensor)?;
        self.sensors.insert(sensor.unique_id.clone(), sensor);
        Ok(())
    }

    /// Remove a sensor. Fails when another sensor still references it —
    /// dropping it would strand those formulas.
    pub fn remove_sensor(&mut self, unique_id: &str) -> Result<SensorConfig, ConfigError> {
        let Some(target) = self.sensors.get(unique_id) else {
            return Err(ConfigError::InvalidSensor {
                sensor: unique_id.to_string(),
                message: "sensor does not exist in this set".to_string(),
            });
        };
        let identities = [target.unique_id.clone(), target.resolved_entity_id()];

        let dependents: Vec<String> = crate::reassign::detect_cross_references(self)
            .into_iter()
            .filter(|(sensor, refs)| {
                sensor != unique_id && refs.iter().any(|r| identities.contains(r))
            })
            .map(|(sensor, _)| sensor)
            .collect();
        if !dependents.is_empty() {
            return Err(ConfigError::InvalidSensor {
                sensor: unique_id.to_string(),
                message: format!("still referenced by {}", dependents.join(", ")),
            });
        }

        self.sensors
            .shift_remove(unique_id)
            .ok_or_else(|| ConfigError::InvalidSensor {
                sensor: unique_id.to_string(),
                message: "sensor does not exist in this set".to_string(),
            })
    }

    /// Rename a sensor, rewriting every reference to it throughout the set.
    pub fn rename_sensor(&mut self, old_id: &str, new_id: &str) -> Result<(), ConfigError> {
        if !self.sensors.contains_key(old_id) {
            return Err(ConfigError::InvalidSensor {
                sensor: old_id.to_string(),
                message: "sensor does not exist in this set".to_string(),
            });
        }
        if self.sensors.contains_key(new_id) {
            return Err(ConfigError::InvalidSensor {
                sensor: new_id.to_string(),
                message: "target unique_id already exists".to_string(),
            });
        }
        apply_reassignment(self, &ReassignmentPlan::single(old_id, new_id));
        validate_sensor_set(self)
    }

    /// Replace the set's global settings. Existing sensors must remain
    /// unambiguous against the new variable names.
    pub fn update_global_settings(
        &mut self,
        settings: GlobalSettings,
    ) -> Result<(), ConfigError> {
        let previous = std::mem::replace(&mut self.global_settings, settings);
        if let Err(e) = validate_globals(self) {
            self.global_settings = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Set or replace one global variable.
    pub fn set_global_variable(
        &mut self,
        name: &str,
        binding: VariableBinding,
    ) -> Result<(), ConfigError> {
        if self.sensors.contains_key(name) {
            return Err(ConfigError::AmbiguousGlobalVariable {
                name: name.to_string(),
            });
        }
        self.global_settings
            .variables
            .insert(name.to_string(), binding);
        Ok(())
    }

    /// Literal global variables as a plain map, the shape service layers
    /// expose to users.
    pub fn global_literals(&self) -> IndexMap<String, ScalarLiteral> {
        self.global_settings
            .variables
            .iter()
            .filter_map(|(name, binding)| match binding {
                VariableBinding::Literal(lit) => Some((name.clone(), lit.clone())),
                _ => None,
            })
            .collect()
    }
}
