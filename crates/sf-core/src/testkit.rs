//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value as JsonValue;

use crate::host::{DeviceInfo, HostAdapter, StateSnapshot};

/// In-memory host with mutable entity states and call counting.
#[derive(Default)]
pub struct MockHost {
    states: Mutex<HashMap<String, StateSnapshot>>,
    areas: Mutex<HashMap<String, String>>,
    labels: Mutex<HashMap<String, Vec<String>>>,
    devices: Mutex<HashMap<String, String>>,
    device_infos: Mutex<HashMap<String, DeviceInfo>>,
    pub get_state_calls: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, entity_id: &str, state: &str) -> Self {
        self.set_state(entity_id, state);
        self
    }

    pub fn with_snapshot(self, entity_id: &str, snapshot: StateSnapshot) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), snapshot);
        self
    }

    pub fn with_attrs(self, entity_id: &str, state: &str, attrs: &[(&str, JsonValue)]) -> Self {
        let mut snapshot = StateSnapshot::new(state);
        for (k, v) in attrs {
            snapshot.attributes.insert(k.to_string(), v.clone());
        }
        self.states
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), snapshot);
        self
    }

    pub fn with_area(self, entity_id: &str, area: &str) -> Self {
        self.areas
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), area.to_string());
        self
    }

    pub fn with_labels(self, entity_id: &str, labels: &[&str]) -> Self {
        self.labels.lock().unwrap().insert(
            entity_id.to_string(),
            labels.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_device(self, entity_id: &str, device_id: &str, info: DeviceInfo) -> Self {
        self.devices
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), device_id.to_string());
        self.device_infos
            .lock()
            .unwrap()
            .insert(device_id.to_string(), info);
        self
    }

    /// Replace an entity's state text, preserving attributes.
    pub fn set_state(&self, entity_id: &str, state: &str) {
        let mut states = self.states.lock().unwrap();
        match states.get_mut(entity_id) {
            Some(snapshot) => snapshot.state = state.to_string(),
            None => {
                states.insert(entity_id.to_string(), StateSnapshot::new(state));
            }
        }
    }

    pub fn remove_entity(&self, entity_id: &str) {
        self.states.lock().unwrap().remove(entity_id);
    }

    pub fn state_read_count(&self) -> usize {
        self.get_state_calls.load(Ordering::SeqCst)
    }
}

impl HostAdapter for MockHost {
    fn get_state(&self, entity_id: &str) -> Option<StateSnapshot> {
        self.get_state_calls.fetch_add(1, Ordering::SeqCst);
        self.states.lock().unwrap().get(entity_id).cloned()
    }

    fn list_entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.states.lock().unwrap().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    fn area_of(&self, entity_id: &str) -> Option<String> {
        self.areas.lock().unwrap().get(entity_id).cloned()
    }

    fn labels_of(&self, entity_id: &str) -> Vec<String> {
        self.labels
            .lock()
            .unwrap()
            .get(entity_id)
            .cloned()
            .unwrap_or_default()
    }

    fn device_of(&self, entity_id: &str) -> Option<String> {
        self.devices.lock().unwrap().get(entity_id).cloned()
    }

    fn device_lookup(&self, identifier: &str) -> Option<DeviceInfo> {
        self.device_infos.lock().unwrap().get(identifier).cloned()
    }
}
