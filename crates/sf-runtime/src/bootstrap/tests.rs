use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sf_config::settings::EngineSettings;
use sf_core::host::{DeviceInfo, HostAdapter, StateSnapshot};
use sf_core::value::Value;

use crate::signals::NullSignals;
use crate::storage::{MemoryStorage, SensorStorage};

use super::bootstrap;

#[derive(Default)]
struct StaticHost {
    states: Mutex<HashMap<String, StateSnapshot>>,
}

impl StaticHost {
    fn with_state(self, entity_id: &str, state: &str) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), StateSnapshot::new(state));
        self
    }
}

impl HostAdapter for StaticHost {
    fn get_state(&self, entity_id: &str) -> Option<StateSnapshot> {
        self.states.lock().unwrap().get(entity_id).cloned()
    }

    fn list_entities(&self) -> Vec<String> {
        self.states.lock().unwrap().keys().cloned().collect()
    }

    fn area_of(&self, _entity_id: &str) -> Option<String> {
        None
    }

    fn labels_of(&self, _entity_id: &str) -> Vec<String> {
        Vec::new()
    }

    fn device_of(&self, _entity_id: &str) -> Option<String> {
        None
    }

    fn device_lookup(&self, _identifier: &str) -> Option<DeviceInfo> {
        None
    }
}

#[tokio::test]
async fn bootstrap_registers_and_evaluates() {
    let storage = MemoryStorage::new();
    storage
        .import_yaml(
            r#"
global_settings:
  variables:
    rate: 2
sensors:
  scaled:
    formula: "sensor.a * rate"
"#,
            "main",
        )
        .await
        .unwrap();

    let host = Arc::new(StaticHost::default().with_state("sensor.a", "21"));
    let manager = bootstrap(
        host,
        Arc::new(NullSignals),
        &storage,
        "main",
        HashMap::new(),
        EngineSettings::default(),
    )
    .await
    .unwrap();

    // Globals survived the storage round trip; the initial cycle ran.
    assert_eq!(manager.current_value("scaled"), Some(Value::Number(42.0)));
}

#[tokio::test]
async fn bootstrap_with_backing_mapping() {
    let storage = MemoryStorage::new();
    storage
        .import_yaml(
            r#"
sensors:
  mirror:
    formula: "state"
"#,
            "main",
        )
        .await
        .unwrap();

    let host = Arc::new(StaticHost::default().with_state("sensor.meter", "7"));
    let manager = bootstrap(
        host,
        Arc::new(NullSignals),
        &storage,
        "main",
        HashMap::from([("mirror".to_string(), "sensor.meter".to_string())]),
        EngineSettings::default(),
    )
    .await
    .unwrap();
    assert_eq!(manager.current_value("mirror"), Some(Value::Number(7.0)));
}

#[tokio::test]
async fn bootstrap_of_missing_set_fails() {
    let storage = MemoryStorage::new();
    let host = Arc::new(StaticHost::default());
    assert!(
        bootstrap(
            host,
            Arc::new(NullSignals),
            &storage,
            "missing",
            HashMap::new(),
            EngineSettings::default(),
        )
        .await
        .is_err()
    );
}
