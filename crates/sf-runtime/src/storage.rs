use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use orion_error::StructError;

use sf_config::model::{SensorConfig, SensorSet};
use sf_config::yaml::{ImportResult, export_yaml, import_yaml};

use crate::error::{RuntimeReason, RuntimeResult};


/// The persistence collaborator's interface.
///
/// The engine never touches disk itself: configuration storage belongs to
/// the host integration. Implementations typically delegate the YAML codec
/// to [`sf_config::yaml`].
#[async_trait]
pub trait SensorStorage: Send + Sync {
    /// All sensors of one sensor set.
    async fn list_sensors(&self, sensor_set_id: &str) -> RuntimeResult<Vec<SensorConfig>>;

    /// Look up one sensor by its unique id, across sets.
    async fn get_sensor(&self, unique_id: &str) -> RuntimeResult<Option<SensorConfig>>;

    /// Persist a full sensor set.
    async fn save_sensor_set(&self, sensor_set_id: &str, config: &SensorSet) -> RuntimeResult<()>;

    /// Serialize a stored sensor set to YAML.
    async fn export_yaml(&self, sensor_set_id: &str) -> RuntimeResult<String>;

    /// Parse and store a YAML document, reporting what was imported and
    /// what was skipped.
    async fn import_yaml(
        &self,
        content: &str,
        sensor_set_id: &str,
    ) -> RuntimeResult<ImportResult>;
}

// ---------------------------------------------------------------------------
// In-memory storage
// ---------------------------------------------------------------------------

/// Storage backend holding sensor sets in memory.
///
/// The reference implementation for tests and for hosts that keep
/// configuration in their own stores and only need the engine-facing
/// shape.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    sets: Mutex<HashMap<String, SensorSet>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(self, sensor_set_id: &str, set: SensorSet) -> Self {
        self.sets
            .lock()
            .expect("storage lock poisoned")
            .insert(sensor_set_id.to_string(), set);
        self
    }

    /// A snapshot of one stored set.
    pub fn get_set(&self, sensor_set_id: &str) -> Option<SensorSet> {
        self.sets
            .lock()
            .expect("storage lock poisoned")
            .get(sensor_set_id)
            .cloned()
    }
}

fn storage_error(message: impl Into<String>) -> crate::error::RuntimeError {
    StructError::from(RuntimeReason::Storage(message.into()))
}

#[async_trait]
impl SensorStorage for MemoryStorage {
    async fn list_sensors(&self, sensor_set_id: &str) -> RuntimeResult<Vec<SensorConfig>> {
        let sets = self.sets.lock().expect("storage lock poisoned");
        let set = sets
            .get(sensor_set_id)
            .ok_or_else(|| storage_error(format!("unknown sensor set {sensor_set_id:?}")))?;
        Ok(set.sensors.values().cloned().collect())
    }

    async fn get_sensor(&self, unique_id: &str) -> RuntimeResult<Option<SensorConfig>> {
        let sets = self.sets.lock().expect("storage lock poisoned");
        Ok(sets
            .values()
            .find_map(|set| set.sensor(unique_id).cloned()))
    }

    async fn save_sensor_set(
        &self,
        sensor_set_id: &str,
        config: &SensorSet,
    ) -> RuntimeResult<()> {
        sf_config::validate_sensor_set(config)
            .map_err(|e| storage_error(e.to_string()))?;
        self.sets
            .lock()
            .expect("storage lock poisoned")
            .insert(sensor_set_id.to_string(), config.clone());
        Ok(())
    }

    async fn export_yaml(&self, sensor_set_id: &str) -> RuntimeResult<String> {
        let set = self
            .get_set(sensor_set_id)
            .ok_or_else(|| storage_error(format!("unknown sensor set {sensor_set_id:?}")))?;
        export_yaml(&set).map_err(|e| storage_error(e.to_string()))
    }

    async fn import_yaml(
        &self,
        content: &str,
        sensor_set_id: &str,
    ) -> RuntimeResult<ImportResult> {
        let (set, result) =
            import_yaml(content).map_err(|e| storage_error(e.to_string()))?;
        self.sets
            .lock()
            .expect("storage lock poisoned")
            .insert(sensor_set_id.to_string(), set);
        Ok(result)
    }
}
