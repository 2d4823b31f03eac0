use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::value::Value;

// ---------------------------------------------------------------------------
// Host state
// ---------------------------------------------------------------------------

/// One entity's state as read from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Raw state text, e.g. `"42.5"`, `"on"`, `"unavailable"`.
    pub state: String,
    pub attributes: HashMap<String, JsonValue>,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_reported: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn new(state: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            state: state.into(),
            attributes: HashMap::new(),
            last_changed: now,
            last_updated: now,
            last_reported: now,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Device registry entry, used for area fallback and device association.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub area: Option<String>,
}

// ---------------------------------------------------------------------------
// Host adapter
// ---------------------------------------------------------------------------

/// The engine's read view of the host platform.
///
/// Implementations are snapshots or live reads — the engine does not
/// require read-through consistency beyond a single strategy call.
pub trait HostAdapter: Send + Sync {
    fn get_state(&self, entity_id: &str) -> Option<StateSnapshot>;

    /// Every entity id known to the host, for collection resolution.
    fn list_entities(&self) -> Vec<String>;

    /// The area an entity is directly assigned to, if any.
    fn area_of(&self, entity_id: &str) -> Option<String>;

    /// Labels carried by an entity.
    fn labels_of(&self, entity_id: &str) -> Vec<String>;

    /// The device an entity belongs to, if any.
    fn device_of(&self, entity_id: &str) -> Option<String>;

    /// Device registry lookup by identifier.
    fn device_lookup(&self, identifier: &str) -> Option<DeviceInfo>;
}

// ---------------------------------------------------------------------------
// Integration data providers
// ---------------------------------------------------------------------------

/// Result of a data-provider callback for one virtual entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub value: Value,
    pub exists: bool,
    pub attributes: HashMap<String, JsonValue>,
}

pub type DataProviderFn = Arc<dyn Fn(&str) -> Option<ProviderResult> + Send + Sync>;

/// Registered data providers, keyed by the entity ids they own.
#[derive(Default, Clone)]
pub struct DataProviderRegistry {
    providers: Vec<(std::collections::HashSet<String>, DataProviderFn)>,
}

impl DataProviderRegistry {
    pub fn register(
        &mut self,
        entity_ids: impl IntoIterator<Item = String>,
        callback: DataProviderFn,
    ) {
        self.providers
            .push((entity_ids.into_iter().collect(), callback));
    }

    pub fn owns(&self, entity_id: &str) -> bool {
        self.providers.iter().any(|(ids, _)| ids.contains(entity_id))
    }

    pub fn query(&self, entity_id: &str) -> Option<ProviderResult> {
        self.providers
            .iter()
            .find(|(ids, _)| ids.contains(entity_id))
            .and_then(|(_, cb)| cb(entity_id))
    }
}

impl std::fmt::Debug for DataProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProviderRegistry")
            .field("providers", &self.providers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Attribute conversion
// ---------------------------------------------------------------------------

/// Convert a host attribute payload to an engine value.
pub fn attr_to_value(attr: &JsonValue) -> Value {
    match attr {
        JsonValue::Null => Value::None,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => Value::Str(s.clone()),
        JsonValue::Array(items) => Value::Array(items.iter().map(attr_to_value).collect()),
        JsonValue::Object(_) => Value::None,
    }
}
