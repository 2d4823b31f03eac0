//! Round-trip and validation coverage over a realistic sensor-set
//! document exercising every configuration shape at once.

use sf_config::model::{AlternateValue, ScalarLiteral, VariableBinding};
use sf_config::yaml::{export_yaml, import_yaml};
use sf_config::{detect_cross_references, validate_sensor_set};

const FIXTURE: &str = r#"
version: "1.0"
global_settings:
  device_identifier: energy_panel
  variables:
    electricity_rate: 0.25
    grid: sensor.grid_power
  metadata:
    attribution: Energy Analysis
sensors:
  energy_cost_analysis:
    name: Energy Cost Analysis
    formula: "current_power_w / 1000 * electricity_rate"
    variables:
      current_power_w: sensor.span_panel_instantaneous_power
    attributes:
      daily_projected:
        formula: "state * 24"
        metadata:
          unit_of_measurement: USD
      monthly_projected:
        formula: "state * 24 * 30"
        metadata:
          unit_of_measurement: USD
    UNAVAILABLE: 0
    metadata:
      unit_of_measurement: USD
      state_class: total

  solar_sold_positive:
    name: Solar Sold
    entity_id: sensor.solar_sold_watts
    formula: "abs(min(grid, 0))"
    UNKNOWN:
      formula: "last_known * decay"
      variables:
        last_known: sensor.solar_sold_watts
        decay: 0.9
    metadata:
      unit_of_measurement: W
      device_class: power

  panel_status:
    formula: "\"exporting\" if solar_sold_positive > 0 else \"importing\""
    variables:
      threshold:
        formula: "energy_cost_analysis * 2"
        NONE: 0

  battery_low_count:
    formula: "count(\"attribute:battery_level<20\")"
    metadata:
      icon: mdi:battery-alert
"#;

#[test]
fn fixture_imports_cleanly() {
    let (set, result) = import_yaml(FIXTURE).unwrap();
    assert_eq!(result.sensors_imported, 4);
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert!(validate_sensor_set(&set).is_ok());

    assert_eq!(
        set.global_settings.device_identifier.as_deref(),
        Some("energy_panel")
    );
    assert_eq!(
        set.global_settings.metadata.get("attribution"),
        Some(&ScalarLiteral::Str("Energy Analysis".to_string()))
    );
}

#[test]
fn fixture_shapes_survive_lowering() {
    let (set, _) = import_yaml(FIXTURE).unwrap();

    let cost = set.sensor("energy_cost_analysis").unwrap();
    assert_eq!(cost.formulas.len(), 3);
    assert_eq!(
        cost.main_formula().alternates.unavailable,
        Some(AlternateValue::Literal(ScalarLiteral::Number(0.0)))
    );
    assert_eq!(
        cost.metadata.get("state_class"),
        Some(&ScalarLiteral::Str("total".to_string()))
    );

    let solar = set.sensor("solar_sold_positive").unwrap();
    assert_eq!(solar.resolved_entity_id(), "sensor.solar_sold_watts");
    match solar.main_formula().alternates.unknown.as_ref().unwrap() {
        AlternateValue::Detailed(detail) => {
            assert_eq!(detail.formula, "last_known * decay");
            assert_eq!(
                detail.variables.get("decay"),
                Some(&VariableBinding::Literal(ScalarLiteral::Number(0.9)))
            );
        }
        other => panic!("expected detailed alternate, got {other:?}"),
    }

    let status = set.sensor("panel_status").unwrap();
    match status.main_formula().variables.get("threshold").unwrap() {
        VariableBinding::Computed(c) => {
            assert_eq!(c.formula, "energy_cost_analysis * 2");
            assert!(matches!(
                c.alternates.none,
                Some(AlternateValue::Literal(ScalarLiteral::Number(n))) if n == 0.0
            ));
        }
        other => panic!("expected computed variable, got {other:?}"),
    }
}

#[test]
fn fixture_cross_references_are_detected() {
    let (set, _) = import_yaml(FIXTURE).unwrap();
    let refs = detect_cross_references(&set);

    // `panel_status` references two other sensors (formula + computed
    // variable); `solar_sold_positive` references its own entity only.
    let status_refs = refs.get("panel_status").unwrap();
    assert!(status_refs.contains(&"solar_sold_positive".to_string()));
    assert!(status_refs.contains(&"energy_cost_analysis".to_string()));
    assert!(refs.get("solar_sold_positive").is_none());
}

#[test]
fn fixture_round_trips_through_export() {
    let (set, _) = import_yaml(FIXTURE).unwrap();
    let exported = export_yaml(&set).unwrap();
    let (reimported, result) = import_yaml(&exported).unwrap();
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    assert_eq!(set, reimported);
}
