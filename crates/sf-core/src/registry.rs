use std::collections::HashMap;
use std::sync::RwLock;

use crate::value::Value;

// ---------------------------------------------------------------------------
// Sensor registry
// ---------------------------------------------------------------------------

/// One registered synthetic sensor: its published entity id and last
/// committed value.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredSensor {
    pub entity_id: String,
    pub value: Value,
}

/// Process-wide map `unique_id → (entity_id, value)`.
///
/// Written only by the update coordinator at the end of a successful
/// evaluation; read by the cross-sensor resolution strategy during
/// evaluation. Cross-sensor reads also accept the sensor's entity id.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    sensors: HashMap<String, RegisteredSensor>,
    /// entity_id → unique_id
    by_entity: HashMap<String, String>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor with no value yet (it reads as `unknown` until the
    /// first successful cycle commits one).
    pub fn register(&self, unique_id: &str, entity_id: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.by_entity.insert(entity_id.to_string(), unique_id.to_string());
        inner.sensors.insert(
            unique_id.to_string(),
            RegisteredSensor {
                entity_id: entity_id.to_string(),
                value: Value::Unknown,
            },
        );
    }

    /// Commit a freshly evaluated value.
    pub fn publish(&self, unique_id: &str, value: Value) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(sensor) = inner.sensors.get_mut(unique_id) {
            sensor.value = value;
        }
    }

    pub fn remove(&self, unique_id: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(sensor) = inner.sensors.remove(unique_id) {
            inner.by_entity.remove(&sensor.entity_id);
        }
    }

    /// Look up by unique_id, falling back to entity_id.
    pub fn get(&self, key: &str) -> Option<RegisteredSensor> {
        let inner = self.inner.read().expect("registry lock poisoned");
        if let Some(sensor) = inner.sensors.get(key) {
            return Some(sensor.clone());
        }
        inner
            .by_entity
            .get(key)
            .and_then(|uid| inner.sensors.get(uid))
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.sensors.contains_key(key) || inner.by_entity.contains_key(key)
    }

    pub fn unique_ids(&self) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.sensors.keys().cloned().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.sensors.clear();
        inner.by_entity.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
