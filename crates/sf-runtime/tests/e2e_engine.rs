//! End-to-end engine tests: a mock host drives the full manager through
//! registration, update cycles, alternates, collections, and renames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::json;

use sf_config::model::SensorSet;
use sf_config::settings::EngineSettings;
use sf_config::yaml::import_yaml;
use sf_core::host::{DeviceInfo, HostAdapter, ProviderResult, StateSnapshot};
use sf_core::value::Value;
use sf_runtime::signals::{HostSignals, StateTag};
use sf_runtime::{CycleReport, SensorManager};

// ---------------------------------------------------------------------------
// Test host
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestHost {
    states: Mutex<HashMap<String, StateSnapshot>>,
    reads: Mutex<HashMap<String, usize>>,
}

impl TestHost {
    fn new() -> Self {
        Self::default()
    }

    fn with_state(self, entity_id: &str, state: &str) -> Self {
        self.set_state(entity_id, state);
        self
    }

    fn with_snapshot(self, entity_id: &str, snapshot: StateSnapshot) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), snapshot);
        self
    }

    fn set_state(&self, entity_id: &str, state: &str) {
        let mut states = self.states.lock().unwrap();
        match states.get_mut(entity_id) {
            Some(snapshot) => snapshot.state = state.to_string(),
            None => {
                states.insert(entity_id.to_string(), StateSnapshot::new(state));
            }
        }
    }

    fn reads_of(&self, entity_id: &str) -> usize {
        self.reads.lock().unwrap().get(entity_id).copied().unwrap_or(0)
    }
}

impl HostAdapter for TestHost {
    fn get_state(&self, entity_id: &str) -> Option<StateSnapshot> {
        *self
            .reads
            .lock()
            .unwrap()
            .entry(entity_id.to_string())
            .or_insert(0) += 1;
        self.states.lock().unwrap().get(entity_id).cloned()
    }

    fn list_entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.states.lock().unwrap().keys().cloned().collect();
        ids.sort_unstable();
        ids
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

// ---------------------------------------------------------------------------
// Recording signal sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct ValueUpdate {
    unique_id: String,
    entity_id: String,
    value: Value,
    attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Default)]
struct RecordingSignals {
    updates: Mutex<Vec<ValueUpdate>>,
    tags: Mutex<Vec<(String, StateTag)>>,
}

impl RecordingSignals {
    fn last_update_for(&self, unique_id: &str) -> Option<ValueUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|u| u.unique_id == unique_id)
            .cloned()
    }

    fn last_tag_for(&self, unique_id: &str) -> Option<StateTag> {
        self.tags
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(uid, _)| uid == unique_id)
            .map(|(_, tag)| *tag)
    }
}

impl HostSignals for RecordingSignals {
    fn sensor_value_updated(
        &self,
        unique_id: &str,
        entity_id: &str,
        value: &Value,
        attributes: &serde_json::Map<String, serde_json::Value>,
    ) {
        self.updates.lock().unwrap().push(ValueUpdate {
            unique_id: unique_id.to_string(),
            entity_id: entity_id.to_string(),
            value: value.clone(),
            attributes: attributes.clone(),
        });
    }

    fn sensor_state_changed(&self, unique_id: &str, tag: StateTag) {
        self.tags
            .lock()
            .unwrap()
            .push((unique_id.to_string(), tag));
    }
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn load(yaml: &str) -> SensorSet {
    let (set, result) = import_yaml(yaml).unwrap();
    assert!(result.errors.is_empty(), "import errors: {:?}", result.errors);
    set
}

async fn engine(host: TestHost, yaml: &str) -> (Arc<TestHost>, Arc<RecordingSignals>, SensorManager) {
    let host = Arc::new(host);
    let signals = Arc::new(RecordingSignals::default());
    let manager = SensorManager::with_signals(
        host.clone(),
        signals.clone(),
        EngineSettings::default(),
    );
    manager.register_sensors(load(yaml)).await.unwrap();
    (host, signals, manager)
}

// ---------------------------------------------------------------------------
// Scenario: simple arithmetic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simple_arithmetic() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "7"),
        r#"
sensors:
  doubled:
    formula: "x * 2"
    variables:
      x: sensor.a
"#,
    )
    .await;

    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("doubled"), Some(Value::Number(14.0)));
}

// ---------------------------------------------------------------------------
// Scenario: cross-sensor chains
// ---------------------------------------------------------------------------

const CROSS_YAML: &str = r#"
sensors:
  base:
    formula: "sensor.a"
  derived:
    formula: "base + 1"
"#;

#[tokio::test]
async fn cross_sensor_chain() {
    let (host, _, manager) = engine(TestHost::new().with_state("sensor.a", "10"), CROSS_YAML).await;

    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("base"), Some(Value::Number(10.0)));
    assert_eq!(manager.current_value("derived"), Some(Value::Number(11.0)));

    host.set_state("sensor.a", "20");
    let report = manager
        .on_backing_entities_changed(["sensor.a".to_string()])
        .await
        .unwrap();

    // Closure covers both, in dependency order.
    assert_eq!(report.evaluated, vec!["base", "derived"]);
    assert_eq!(manager.current_value("base"), Some(Value::Number(20.0)));
    assert_eq!(manager.current_value("derived"), Some(Value::Number(21.0)));
}

#[tokio::test]
async fn dependency_commits_before_dependent_reads() {
    let (host, signals, manager) =
        engine(TestHost::new().with_state("sensor.a", "10"), CROSS_YAML).await;
    manager.update_all().await.unwrap();

    host.set_state("sensor.a", "30");
    manager
        .on_backing_entities_changed(["sensor.a".to_string()])
        .await
        .unwrap();

    // `derived` saw base's committed new value, not the stale one.
    assert_eq!(
        signals.last_update_for("derived").unwrap().value,
        Value::Number(31.0)
    );
}

// ---------------------------------------------------------------------------
// Scenario: alternate states
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_backing_with_alternate() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.meter", "unavailable"),
        r#"
sensors:
  s:
    formula: "state"
    UNAVAILABLE: 0
"#,
    )
    .await;
    manager
        .register_sensor_to_backing_mapping(HashMap::from([(
            "s".to_string(),
            "sensor.meter".to_string(),
        )]))
        .await
        .unwrap();

    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("s"), Some(Value::Number(0.0)));
}

#[tokio::test]
async fn unavailable_backing_without_alternate_emits_sentinel() {
    let (_, signals, manager) = engine(
        TestHost::new().with_state("sensor.meter", "unavailable"),
        r#"
sensors:
  s:
    formula: "state"
"#,
    )
    .await;
    manager
        .register_sensor_to_backing_mapping(HashMap::from([(
            "s".to_string(),
            "sensor.meter".to_string(),
        )]))
        .await
        .unwrap();

    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("s"), Some(Value::Unavailable));
    assert_eq!(signals.last_tag_for("s"), Some(StateTag::Unavailable));
}

#[tokio::test]
async fn false_and_zero_survive_alternates() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "0"),
        r#"
sensors:
  s:
    formula: "sensor.a"
    UNAVAILABLE: 42
    UNKNOWN: 42
    NONE: 42
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("s"), Some(Value::Number(0.0)));
}

// ---------------------------------------------------------------------------
// Scenario: metadata + durations
// ---------------------------------------------------------------------------

async fn grace_engine(minutes_ago: i64) -> SensorManager {
    let mut snapshot = StateSnapshot::new("450");
    snapshot.last_changed = Utc::now() - Duration::minutes(minutes_ago);
    let (_, _, manager) = engine(
        TestHost::new().with_snapshot("sensor.power", snapshot),
        r#"
sensors:
  grace_check:
    formula: "m < 15"
    variables:
      m:
        formula: "minutes_between(metadata(sensor.power, 'last_changed'), now())"
"#,
    )
    .await;
    manager
}

#[tokio::test]
async fn metadata_grace_window_inside() {
    let manager = grace_engine(10).await;
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("grace_check"), Some(Value::Bool(true)));
}

#[tokio::test]
async fn metadata_grace_window_outside() {
    let manager = grace_engine(20).await;
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("grace_check"), Some(Value::Bool(false)));
}

// ---------------------------------------------------------------------------
// Scenario: collection aggregation
// ---------------------------------------------------------------------------

fn power_host() -> TestHost {
    let host = TestHost::new();
    for (id, state) in [
        ("sensor.kitchen", "100"),
        ("sensor.oven", "200"),
        ("sensor.garage", "300"),
    ] {
        let snapshot = StateSnapshot::new(state).with_attribute("device_class", json!("power"));
        host.states
            .lock()
            .unwrap()
            .insert(id.to_string(), snapshot);
    }
    let energy = StateSnapshot::new("50").with_attribute("device_class", json!("energy"));
    host.states
        .lock()
        .unwrap()
        .insert("sensor.meter".to_string(), energy);
    host
}

#[tokio::test]
async fn collection_sum() {
    let (_, _, manager) = engine(
        power_host(),
        r#"
sensors:
  total_power:
    formula: "sum(\"device_class:power\")"
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(
        manager.current_value("total_power"),
        Some(Value::Number(600.0))
    );
}

#[tokio::test]
async fn collection_member_change_reevaluates_the_query() {
    let (host, _, manager) = engine(
        power_host(),
        r#"
sensors:
  total_power:
    formula: "sum(\"device_class:power\")"
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(
        manager.current_value("total_power"),
        Some(Value::Number(600.0))
    );

    host.set_state("sensor.kitchen", "150");
    let report = manager
        .on_backing_entities_changed(["sensor.kitchen".to_string()])
        .await
        .unwrap();
    assert_eq!(report.evaluated, vec!["total_power"]);
    assert_eq!(
        manager.current_value("total_power"),
        Some(Value::Number(650.0))
    );
}

#[tokio::test]
async fn collection_or_pattern() {
    let (_, _, manager) = engine(
        power_host(),
        r#"
sensors:
  total:
    formula: "sum(\"device_class:power|device_class:energy\")"
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("total"), Some(Value::Number(650.0)));
}

// ---------------------------------------------------------------------------
// Scenario: self-reference rewrite
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attribute_self_reference_means_state() {
    // `sensor.p * 2` inside p's own attribute formula is rewritten to
    // `state * 2` at registration, so it doubles the main result instead
    // of forming a cycle.
    let (_, signals, manager) = engine(
        TestHost::new().with_state("sensor.a", "21"),
        r#"
sensors:
  p:
    entity_id: sensor.p
    formula: "sensor.a"
    attributes:
      doubled:
        formula: "sensor.p * 2"
"#,
    )
    .await;

    manager.update_all().await.unwrap();
    let update = signals.last_update_for("p").unwrap();
    assert_eq!(update.value, Value::Number(21.0));
    assert_eq!(update.attributes.get("doubled"), Some(&json!(42.0)));
}

// ---------------------------------------------------------------------------
// Closure minimality & re-work
// ---------------------------------------------------------------------------

const TRIO_YAML: &str = r#"
sensors:
  a:
    formula: "sensor.x"
  b:
    formula: "sensor.y"
  c:
    formula: "a + 1"
"#;

#[tokio::test]
async fn only_affected_sensors_are_evaluated() {
    let (host, _, manager) = engine(
        TestHost::new()
            .with_state("sensor.x", "1")
            .with_state("sensor.y", "2"),
        TRIO_YAML,
    )
    .await;
    manager.update_all().await.unwrap();

    host.set_state("sensor.x", "5");
    let report = manager
        .on_backing_entities_changed(["sensor.x".to_string()])
        .await
        .unwrap();

    assert_eq!(report.evaluated, vec!["a", "c"]);
    assert!(!report.evaluated.contains(&"b".to_string()));
    assert_eq!(manager.current_value("b"), Some(Value::Number(2.0)));
}

#[tokio::test]
async fn unchanged_dependency_value_skips_dependents() {
    let (host, _, manager) = engine(
        TestHost::new()
            .with_state("sensor.x", "1")
            .with_state("sensor.y", "2"),
        TRIO_YAML,
    )
    .await;
    manager.update_all().await.unwrap();

    // The entity "changed" but its value did not; `a` re-evaluates to the
    // same number, so `c` needs no re-work.
    host.set_state("sensor.x", "1");
    let report = manager
        .on_backing_entities_changed(["sensor.x".to_string()])
        .await
        .unwrap();
    assert_eq!(report.evaluated, vec!["a"]);
    assert_eq!(report.skipped, vec!["c"]);
}

#[tokio::test]
async fn unrelated_change_touches_nothing() {
    let (_, _, manager) = engine(
        TestHost::new()
            .with_state("sensor.x", "1")
            .with_state("sensor.y", "2"),
        TRIO_YAML,
    )
    .await;
    manager.update_all().await.unwrap();

    let report = manager
        .on_backing_entities_changed(["sensor.unrelated".to_string()])
        .await
        .unwrap();
    assert!(report.is_empty());
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_failing_sensor_does_not_stop_the_cycle() {
    let (host, signals, manager) = engine(
        TestHost::new()
            .with_state("sensor.good", "5")
            .with_state("sensor.bad", "10"),
        r#"
sensors:
  healthy:
    formula: "sensor.good * 2"
  broken:
    formula: "sensor.bad * 2"
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("broken"), Some(Value::Number(20.0)));

    // `sensor.bad` turns into a malformed numeric.
    host.set_state("sensor.bad", "12.3.4");
    host.set_state("sensor.good", "6");
    let report = manager
        .on_backing_entities_changed(["sensor.bad".to_string(), "sensor.good".to_string()])
        .await
        .unwrap();

    assert!(report.failed.contains(&"broken".to_string()));
    assert!(report.evaluated.contains(&"healthy".to_string()));
    // The failing sensor kept its previous value.
    assert_eq!(manager.current_value("broken"), Some(Value::Number(20.0)));
    assert_eq!(manager.current_value("healthy"), Some(Value::Number(12.0)));
    assert_eq!(signals.last_tag_for("broken"), Some(StateTag::Error));
}

// ---------------------------------------------------------------------------
// Lazy memoization across sensors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shared_entity_is_read_once_per_cycle() {
    let (host, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "5"),
        r#"
sensors:
  first:
    formula: "sensor.a * 2"
  second:
    formula: "sensor.a + 1"
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(host.reads_of("sensor.a"), 1);

    // A second cycle reads afresh.
    host.set_state("sensor.a", "6");
    manager
        .on_backing_entities_changed(["sensor.a".to_string()])
        .await
        .unwrap();
    assert_eq!(host.reads_of("sensor.a"), 2);
}

// ---------------------------------------------------------------------------
// Globals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn global_variables_and_local_shadowing() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "100"),
        r#"
global_settings:
  variables:
    rate: 0.10
sensors:
  with_global:
    formula: "sensor.a * rate"
  with_local:
    formula: "sensor.a * rate"
    variables:
      rate: 0.15
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(
        manager.current_value("with_global"),
        Some(Value::Number(10.0))
    );
    assert_eq!(
        manager.current_value("with_local"),
        Some(Value::Number(15.0))
    );
}

// ---------------------------------------------------------------------------
// Data providers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn data_provider_supplies_virtual_entities() {
    let (_, _, manager) = engine(
        TestHost::new(),
        r#"
sensors:
  virtual_power:
    formula: "vp * 2"
    variables:
      vp: sensor.panel_virtual
"#,
    )
    .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    manager
        .register_data_provider(
            ["sensor.panel_virtual".to_string()],
            Arc::new(move |_id| {
                counter.fetch_add(1, Ordering::SeqCst);
                Some(ProviderResult {
                    value: Value::Number(123.0),
                    exists: true,
                    attributes: HashMap::new(),
                })
            }),
        )
        .await;

    manager.update_all().await.unwrap();
    assert_eq!(
        manager.current_value("virtual_power"),
        Some(Value::Number(246.0))
    );
    assert!(calls.load(Ordering::SeqCst) >= 1);
}

// ---------------------------------------------------------------------------
// Renames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn entity_rename_rewrites_references() {
    let (host, _, manager) = engine(
        TestHost::new().with_state("sensor.old_meter", "10"),
        r#"
sensors:
  reader:
    formula: "sensor.old_meter * 2"
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("reader"), Some(Value::Number(20.0)));

    // Host renames the entity.
    host.set_state("sensor.new_meter", "50");
    manager
        .apply_entity_renames(indexmap::IndexMap::from_iter([(
            "sensor.old_meter".to_string(),
            "sensor.new_meter".to_string(),
        )]))
        .await
        .unwrap();

    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("reader"), Some(Value::Number(100.0)));
}

// ---------------------------------------------------------------------------
// Runtime CRUD
// ---------------------------------------------------------------------------

fn plain_sensor(id: &str, formula: &str) -> sf_config::model::SensorConfig {
    sf_config::model::SensorConfig {
        unique_id: id.to_string(),
        name: None,
        entity_id: None,
        device_identifier: None,
        formulas: vec![sf_config::model::FormulaConfig::new(id, formula)],
        metadata: Default::default(),
    }
}

#[tokio::test]
async fn add_sensor_at_runtime() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "10"),
        r#"
sensors:
  base:
    formula: "sensor.a"
"#,
    )
    .await;
    manager.update_all().await.unwrap();

    manager
        .add_sensor(plain_sensor("added", "base * 3"))
        .await
        .unwrap();
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("added"), Some(Value::Number(30.0)));
}

#[tokio::test]
async fn add_sensor_with_cycle_is_rejected() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "10"),
        r#"
sensors:
  base:
    formula: "sensor.a"
"#,
    )
    .await;
    // `base` does not reference `intruder`, but `intruder` referencing
    // itself must still be rejected.
    assert!(
        manager
            .add_sensor(plain_sensor("intruder", "intruder + 1"))
            .await
            .is_err()
    );
    // The running configuration is untouched.
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("base"), Some(Value::Number(10.0)));
}

#[tokio::test]
async fn update_sensor_changes_the_formula() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "10"),
        r#"
sensors:
  s:
    formula: "sensor.a"
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("s"), Some(Value::Number(10.0)));

    manager
        .update_sensor(plain_sensor("s", "sensor.a * 5"))
        .await
        .unwrap();
    // The committed value survives until recomputation.
    assert_eq!(manager.current_value("s"), Some(Value::Number(10.0)));
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("s"), Some(Value::Number(50.0)));
}

#[tokio::test]
async fn remove_sensor_refuses_while_referenced() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "10"),
        CROSS_YAML,
    )
    .await;
    assert!(manager.remove_sensor("base").await.is_err());
    manager.remove_sensor("derived").await.unwrap();
    manager.remove_sensor("base").await.unwrap();
    assert_eq!(manager.current_value("base"), None);
}

#[tokio::test]
async fn rename_sensor_carries_value_and_rewrites_dependents() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "10"),
        CROSS_YAML,
    )
    .await;
    manager.update_all().await.unwrap();

    manager.rename_sensor("base", "root").await.unwrap();
    assert_eq!(manager.current_value("base"), None);
    assert_eq!(manager.current_value("root"), Some(Value::Number(10.0)));

    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("derived"), Some(Value::Number(11.0)));
}

// ---------------------------------------------------------------------------
// State token inside computed variables
// ---------------------------------------------------------------------------

#[tokio::test]
async fn computed_variable_may_reference_state() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.meter", "20"),
        r#"
sensors:
  scaled:
    formula: "half + 1"
    variables:
      half:
        formula: "state / 2"
"#,
    )
    .await;
    manager
        .register_sensor_to_backing_mapping(HashMap::from([(
            "scaled".to_string(),
            "sensor.meter".to_string(),
        )]))
        .await
        .unwrap();
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("scaled"), Some(Value::Number(11.0)));
}

// ---------------------------------------------------------------------------
// Composite: energy-analysis style configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn energy_analysis_composite() {
    // Globals + cross-sensor references + attribute formulas + alternates
    // in one set, the way real configurations compose them.
    let (host, signals, manager) = engine(
        TestHost::new().with_state("sensor.grid_power", "1000"),
        r#"
global_settings:
  variables:
    rate_per_kwh: 0.25
sensors:
  energy_cost:
    formula: "sensor.grid_power / 1000 * rate_per_kwh"
    UNAVAILABLE: 0
    attributes:
      daily_projected:
        formula: "state * 24"
      monthly_projected:
        formula: "state * 24 * 30"
  cost_with_margin:
    formula: "energy_cost * 1.1"
"#,
    )
    .await;

    manager.update_all().await.unwrap();
    assert_eq!(
        manager.current_value("energy_cost"),
        Some(Value::Number(0.25))
    );
    let update = signals.last_update_for("energy_cost").unwrap();
    assert_eq!(update.attributes.get("daily_projected"), Some(&json!(6.0)));
    assert_eq!(
        update.attributes.get("monthly_projected"),
        Some(&json!(180.0))
    );
    assert_eq!(
        manager.current_value("cost_with_margin"),
        Some(Value::Number(0.275))
    );

    // The grid meter drops out; the alternate keeps the cost at zero and
    // the dependent follows.
    host.set_state("sensor.grid_power", "unavailable");
    manager
        .on_backing_entities_changed(["sensor.grid_power".to_string()])
        .await
        .unwrap();
    assert_eq!(manager.current_value("energy_cost"), Some(Value::Number(0.0)));
    assert_eq!(
        manager.current_value("cost_with_margin"),
        Some(Value::Number(0.0))
    );
}

#[tokio::test]
async fn cache_stats_accumulate_across_cycles() {
    let (host, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "1"),
        r#"
sensors:
  s:
    formula: "sensor.a * 2"
"#,
    )
    .await;
    manager.update_all().await.unwrap();
    host.set_state("sensor.a", "2");
    manager
        .on_backing_entities_changed(["sensor.a".to_string()])
        .await
        .unwrap();

    let stats = manager.cache_stats();
    // First cycle compiles, second reuses.
    assert_eq!(stats.misses, 1);
    assert!(stats.hits >= 1);
    assert!(stats.hit_rate > 0.0);

    // Clearing caches is correctness-neutral.
    manager.clear_caches();
    manager.update_all().await.unwrap();
    assert_eq!(manager.current_value("s"), Some(Value::Number(4.0)));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_rejects_new_cycles() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "1"),
        r#"
sensors:
  s:
    formula: "sensor.a"
"#,
    )
    .await;
    manager.shutdown();
    assert!(manager.update_all().await.is_err());
    assert!(
        manager
            .on_backing_entities_changed(["sensor.a".to_string()])
            .await
            .is_err()
    );
}

#[tokio::test]
async fn cyclic_configuration_is_rejected_at_registration() {
    let host = Arc::new(TestHost::new());
    let manager = SensorManager::new(host, EngineSettings::default());
    let set = load(
        r#"
sensors:
  a:
    formula: "b + 1"
  b:
    formula: "a + 1"
"#,
    );
    let err = manager.register_sensors(set).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("a") && msg.contains("b"));
}

#[tokio::test]
async fn empty_change_set_is_a_no_op() {
    let (_, _, manager) = engine(
        TestHost::new().with_state("sensor.a", "1"),
        r#"
sensors:
  s:
    formula: "sensor.a"
"#,
    )
    .await;
    let report: CycleReport = manager
        .on_backing_entities_changed(Vec::new())
        .await
        .unwrap();
    assert!(report.is_empty());
}
