use orion_error::StructError;

use crate::error::{CoreReason, CoreResult};
use crate::host::{HostAdapter, attr_to_value};
use crate::value::Value;


/// The identity keys every entity answers regardless of its attributes.
const DATETIME_KEYS: &[&str] = &["last_changed", "last_updated", "last_reported"];

/// Resolves `metadata(entity, key)` calls to typed values.
pub struct MetadataHandler<'a> {
    host: &'a dyn HostAdapter,
}

impl<'a> MetadataHandler<'a> {
    pub fn new(host: &'a dyn HostAdapter) -> Self {
        Self { host }
    }

    /// Resolve one metadata key for an entity.
    ///
    /// Datetime keys return timezone-aware datetimes; identity keys return
    /// strings; any other key reads the attribute of that name (absent
    /// attributes yield `none`).
    pub fn resolve(&self, entity_id: &str, key: &str) -> CoreResult<Value> {
        // Keys derivable from the id alone do not need a state read.
        match key {
            "entity_id" => return Ok(Value::Str(entity_id.to_string())),
            "object_id" => {
                let object = entity_id.split_once('.').map(|(_, o)| o).unwrap_or(entity_id);
                return Ok(Value::Str(object.to_string()));
            }
            "domain" => {
                let domain = entity_id.split_once('.').map(|(d, _)| d).unwrap_or("");
                return Ok(Value::Str(domain.to_string()));
            }
            _ => {}
        }

        let Some(snapshot) = self.host.get_state(entity_id) else {
            return StructError::from(CoreReason::MissingDependency(format!(
                "metadata target {entity_id} not found"
            )))
            .err();
        };

        if DATETIME_KEYS.contains(&key) {
            let dt = match key {
                "last_changed" => snapshot.last_changed,
                "last_updated" => snapshot.last_updated,
                _ => snapshot.last_reported,
            };
            return Ok(Value::DateTime(dt));
        }

        if key == "friendly_name" {
            let name = snapshot
                .attributes
                .get("friendly_name")
                .map(attr_to_value)
                .unwrap_or_else(|| {
                    // Fall back to the object id, the way the host titles
                    // unnamed entities.
                    let object = entity_id.split_once('.').map(|(_, o)| o).unwrap_or(entity_id);
                    Value::Str(object.replace('_', " "))
                });
            return Ok(name);
        }

        Ok(snapshot
            .attributes
            .get(key)
            .map(attr_to_value)
            .unwrap_or(Value::None))
    }
}
