use std::collections::HashMap;
use std::sync::Arc;

use orion_error::StructError;

use sf_config::settings::EngineSettings;
use sf_config::yaml::import_yaml;

use crate::error::{RuntimeReason, RuntimeResult};
use crate::manager::SensorManager;
use crate::signals::HostSignals;
use crate::storage::SensorStorage;

use sf_core::host::HostAdapter;

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// Engine bootstrap
// ---------------------------------------------------------------------------

/// Bring an engine up from stored configuration: load the sensor set
/// (globals included, via the storage layer's YAML export), register it,
/// wire the backing mapping, and run the initial full evaluation so every
/// sensor has a value before the first change notification arrives.
#[tracing::instrument(name = "engine.bootstrap", skip_all, fields(set = %sensor_set_id))]
pub async fn bootstrap(
    host: Arc<dyn HostAdapter>,
    signals: Arc<dyn HostSignals>,
    storage: &dyn SensorStorage,
    sensor_set_id: &str,
    backing: HashMap<String, String>,
    settings: EngineSettings,
) -> RuntimeResult<SensorManager> {
    let yaml = storage.export_yaml(sensor_set_id).await?;
    let (set, import) = import_yaml(&yaml).map_err(|e| {
        StructError::from(RuntimeReason::Bootstrap).with_detail(e.to_string())
    })?;
    if set.sensors.is_empty() {
        return StructError::from(RuntimeReason::Bootstrap)
            .with_detail(format!("sensor set {sensor_set_id:?} is empty"))
            .err();
    }
    for error in &import.errors {
        sf_warn!(conf, error = %error, "sensor skipped during bootstrap");
    }

    let manager = SensorManager::with_signals(host, signals, settings);
    manager.register_sensor_to_backing_mapping(backing).await?;
    manager.register_sensors(set).await?;

    let report = manager.update_all().await?;
    sf_info!(
        sys,
        evaluated = report.evaluated.len(),
        failed = report.failed.len(),
        "engine bootstrap complete"
    );
    Ok(manager)
}
