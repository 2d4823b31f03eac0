use super::*;
use crate::model::{AlternateValue, ScalarLiteral, VariableBinding};

const BASIC_YAML: &str = r#"
version: "1.0"
global_settings:
  device_identifier: panel_1
  variables:
    grid: sensor.grid_power
    rate: 0.15
sensors:
  doubled:
    name: Doubled
    formula: "x * 2"
    variables:
      x: sensor.a
    metadata:
      unit_of_measurement: W
      device_class: power
  derived:
    formula: "doubled + 1"
"#;

#[test]
fn import_basic_set() {
    let (set, result) = import_yaml(BASIC_YAML).unwrap();
    assert_eq!(result.sensors_imported, 2);
    assert_eq!(result.sensor_unique_ids, vec!["doubled", "derived"]);
    assert!(result.errors.is_empty());

    assert_eq!(set.version, "1.0");
    assert_eq!(
        set.global_settings.device_identifier.as_deref(),
        Some("panel_1")
    );
    assert_eq!(
        set.global_settings.variables.get("grid"),
        Some(&VariableBinding::EntityRef("sensor.grid_power".to_string()))
    );
    assert_eq!(
        set.global_settings.variables.get("rate"),
        Some(&VariableBinding::Literal(ScalarLiteral::Number(0.15)))
    );

    let doubled = set.sensor("doubled").unwrap();
    assert_eq!(doubled.name.as_deref(), Some("Doubled"));
    assert_eq!(doubled.main_formula().formula, "x * 2");
    assert_eq!(
        doubled.main_formula().variables.get("x"),
        Some(&VariableBinding::EntityRef("sensor.a".to_string()))
    );
    assert_eq!(
        doubled.metadata.get("unit_of_measurement"),
        Some(&ScalarLiteral::Str("W".to_string()))
    );
    assert_eq!(doubled.resolved_entity_id(), "sensor.doubled");
}

#[test]
fn bare_identifier_variable_is_reference() {
    let yaml = r#"
sensors:
  s:
    formula: "base * 2"
    variables:
      base: other_sensor
"#;
    let (set, _) = import_yaml(yaml).unwrap();
    assert_eq!(
        set.sensor("s").unwrap().main_formula().variables.get("base"),
        Some(&VariableBinding::Reference("other_sensor".to_string()))
    );
}

#[test]
fn computed_variable_with_alternates() {
    let yaml = r#"
sensors:
  grace:
    formula: "m < 15"
    variables:
      m:
        formula: "minutes_between(metadata(sensor.power, 'last_changed'), now())"
        UNKNOWN: 0
"#;
    let (set, _) = import_yaml(yaml).unwrap();
    let main = set.sensor("grace").unwrap().main_formula();
    match main.variables.get("m").unwrap() {
        VariableBinding::Computed(c) => {
            assert!(c.formula.starts_with("minutes_between"));
            assert_eq!(
                c.alternates.unknown,
                Some(AlternateValue::Literal(ScalarLiteral::Number(0.0)))
            );
        }
        other => panic!("expected computed binding, got {other:?}"),
    }
}

#[test]
fn sensor_alternates_literal_and_formula() {
    let yaml = r#"
sensors:
  s:
    formula: "state"
    UNAVAILABLE: 0
    UNKNOWN: "state * 0.5"
"#;
    let (set, _) = import_yaml(yaml).unwrap();
    let main = set.sensor("s").unwrap().main_formula();
    assert_eq!(
        main.alternates.unavailable,
        Some(AlternateValue::Literal(ScalarLiteral::Number(0.0)))
    );
    assert_eq!(
        main.alternates.unknown,
        Some(AlternateValue::Formula("state * 0.5".to_string()))
    );
}

#[test]
fn alternate_object_form() {
    let yaml = r#"
sensors:
  s:
    formula: "state"
    UNAVAILABLE:
      formula: "fallback * 2"
      variables:
        fallback: sensor.backup
"#;
    let (set, _) = import_yaml(yaml).unwrap();
    let main = set.sensor("s").unwrap().main_formula();
    match main.alternates.unavailable.as_ref().unwrap() {
        AlternateValue::Detailed(d) => {
            assert_eq!(d.formula, "fallback * 2");
            assert_eq!(
                d.variables.get("fallback"),
                Some(&VariableBinding::EntityRef("sensor.backup".to_string()))
            );
        }
        other => panic!("expected detailed alternate, got {other:?}"),
    }
}

#[test]
fn attributes_become_suffixed_formulas() {
    let yaml = r#"
sensors:
  power:
    formula: "sensor.a"
    attributes:
      daily:
        formula: "state * 24"
        metadata:
          unit_of_measurement: Wh
"#;
    let (set, _) = import_yaml(yaml).unwrap();
    let sensor = set.sensor("power").unwrap();
    assert_eq!(sensor.formulas.len(), 2);
    let attr = &sensor.formulas[1];
    assert_eq!(attr.id, "power_daily");
    assert_eq!(attr.attribute.as_deref(), Some("daily"));
    assert_eq!(attr.formula, "state * 24");
    assert_eq!(
        attr.metadata.get("unit_of_measurement"),
        Some(&ScalarLiteral::Str("Wh".to_string()))
    );
}

#[test]
fn bad_formula_is_skipped_and_reported() {
    let yaml = r#"
sensors:
  good:
    formula: "1 + 1"
  bad:
    formula: "1 +"
"#;
    let (set, result) = import_yaml(yaml).unwrap();
    assert_eq!(result.sensors_imported, 1);
    assert_eq!(result.sensor_unique_ids, vec!["good"]);
    assert_eq!(result.errors.len(), 1);
    assert!(set.sensor("bad").is_none());
}

#[test]
fn malformed_yaml_is_fatal() {
    assert!(import_yaml("sensors: [not, a, map").is_err());
}

#[test]
fn export_round_trips() {
    let (set, _) = import_yaml(BASIC_YAML).unwrap();
    let exported = export_yaml(&set).unwrap();
    let (reimported, result) = import_yaml(&exported).unwrap();
    assert!(result.errors.is_empty());
    assert_eq!(set, reimported);
}

#[test]
fn entity_id_override_is_kept() {
    let yaml = r#"
sensors:
  p:
    entity_id: sensor.panel_power
    formula: "sensor.a"
"#;
    let (set, _) = import_yaml(yaml).unwrap();
    assert_eq!(set.sensor("p").unwrap().resolved_entity_id(), "sensor.panel_power");
}
