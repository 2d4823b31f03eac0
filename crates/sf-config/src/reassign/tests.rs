use super::*;
use crate::model::ScalarLiteral;
use crate::yaml::import_yaml;

fn load(yaml: &str) -> SensorSet {
    let (set, result) = import_yaml(yaml).unwrap();
    assert!(result.errors.is_empty(), "import errors: {:?}", result.errors);
    set
}

// -----------------------------------------------------------------------
// Detection
// -----------------------------------------------------------------------

#[test]
fn detects_unique_id_references() {
    let set = load(
        r#"
sensors:
  base:
    formula: "sensor.a"
  derived:
    formula: "base + 1"
"#,
    );
    let refs = detect_cross_references(&set);
    assert_eq!(refs.get("derived"), Some(&vec!["base".to_string()]));
    assert!(refs.get("base").is_none());
}

#[test]
fn detects_entity_id_references() {
    let set = load(
        r#"
sensors:
  base:
    entity_id: sensor.base_power
    formula: "sensor.a"
  derived:
    formula: "sensor.base_power * 2"
"#,
    );
    let refs = detect_cross_references(&set);
    assert_eq!(refs.get("derived"), Some(&vec!["sensor.base_power".to_string()]));
}

#[test]
fn detects_references_in_variables_and_alternates() {
    let set = load(
        r#"
sensors:
  base:
    formula: "sensor.a"
  derived:
    formula: "x"
    variables:
      x: base
    UNKNOWN: "base * 0.5"
"#,
    );
    let refs = detect_cross_references(&set);
    assert_eq!(refs.get("derived"), Some(&vec!["base".to_string()]));
}

#[test]
fn no_references_in_simple_set() {
    let set = load(
        r#"
sensors:
  a:
    formula: "sensor.x + 1"
  b:
    formula: "sensor.y + 1"
"#,
    );
    assert!(detect_cross_references(&set).is_empty());
}

// -----------------------------------------------------------------------
// Rewriting
// -----------------------------------------------------------------------

#[test]
fn rewrites_formula_references() {
    let mut set = load(
        r#"
sensors:
  derived:
    formula: "sensor.old_power * 2 + sensor.old_power"
"#,
    );
    apply_reassignment(
        &mut set,
        &ReassignmentPlan::single("sensor.old_power", "sensor.new_power"),
    );
    assert_eq!(
        set.sensor("derived").unwrap().main_formula().formula,
        "sensor.new_power * 2 + sensor.new_power"
    );
}

#[test]
fn rewrites_variable_bindings() {
    let mut set = load(
        r#"
sensors:
  s:
    formula: "x"
    variables:
      x: sensor.old
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::single("sensor.old", "sensor.new"));
    assert_eq!(
        set.sensor("s").unwrap().main_formula().variables.get("x"),
        Some(&VariableBinding::EntityRef("sensor.new".to_string()))
    );
}

#[test]
fn rewrites_nested_alternate_structures() {
    let mut set = load(
        r#"
sensors:
  s:
    formula: "state"
    UNAVAILABLE:
      formula: "backup * 2"
      variables:
        backup: sensor.old
        scaled:
          formula: "sensor.old * 0.5"
          UNKNOWN: "sensor.old"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::single("sensor.old", "sensor.new"));
    let main = set.sensor("s").unwrap().main_formula();
    match main.alternates.unavailable.as_ref().unwrap() {
        AlternateValue::Detailed(d) => {
            assert_eq!(
                d.variables.get("backup"),
                Some(&VariableBinding::EntityRef("sensor.new".to_string()))
            );
            match d.variables.get("scaled").unwrap() {
                VariableBinding::Computed(c) => {
                    assert_eq!(c.formula, "sensor.new * 0.5");
                    assert_eq!(
                        c.alternates.unknown,
                        Some(AlternateValue::Formula("sensor.new".to_string()))
                    );
                }
                other => panic!("expected computed, got {other:?}"),
            }
        }
        other => panic!("expected detailed alternate, got {other:?}"),
    }
}

#[test]
fn string_literals_are_not_rewritten() {
    let mut set = load(
        r#"
sensors:
  s:
    formula: "sum(\"regex:sensor.old\") + sensor.old"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::single("sensor.old", "sensor.new"));
    assert_eq!(
        set.sensor("s").unwrap().main_formula().formula,
        "sum(\"regex:sensor.old\") + sensor.new"
    );
}

#[test]
fn identifier_boundaries_are_respected() {
    let mut set = load(
        r#"
sensors:
  s:
    formula: "base + base_load"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::single("base", "root"));
    assert_eq!(
        set.sensor("s").unwrap().main_formula().formula,
        "root + base_load"
    );
}

// -----------------------------------------------------------------------
// Self-reference rewrite (attribute formulas)
// -----------------------------------------------------------------------

#[test]
fn self_entity_reference_in_attribute_becomes_state() {
    let mut set = load(
        r#"
sensors:
  p:
    entity_id: sensor.p
    formula: "sensor.a"
    attributes:
      doubled:
        formula: "sensor.p * 2"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::default());
    assert_eq!(set.sensor("p").unwrap().formulas[1].formula, "state * 2");
}

#[test]
fn self_unique_id_in_attribute_becomes_state() {
    let mut set = load(
        r#"
sensors:
  p:
    formula: "sensor.a"
    attributes:
      doubled:
        formula: "p * 2"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::default());
    assert_eq!(set.sensor("p").unwrap().formulas[1].formula, "state * 2");
}

#[test]
fn self_reference_in_main_formula_is_left_alone() {
    // A main-formula self reference is a dependency cycle; detection is the
    // graph's job, not the rewriter's.
    let mut set = load(
        r#"
sensors:
  p:
    formula: "p + 1"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::default());
    assert_eq!(set.sensor("p").unwrap().main_formula().formula, "p + 1");
}

#[test]
fn dotted_navigation_survives_self_rewrite() {
    let mut set = load(
        r#"
sensors:
  p:
    entity_id: sensor.p
    formula: "sensor.a"
    attributes:
      volts:
        formula: "sensor.p.voltage * 1"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::default());
    assert_eq!(
        set.sensor("p").unwrap().formulas[1].formula,
        "state.voltage * 1"
    );
}

// -----------------------------------------------------------------------
// Identity updates & integrity
// -----------------------------------------------------------------------

#[test]
fn entity_rename_updates_override() {
    let mut set = load(
        r#"
sensors:
  p:
    entity_id: sensor.old_p
    formula: "sensor.a"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::single("sensor.old_p", "sensor.new_p"));
    assert_eq!(
        set.sensor("p").unwrap().entity_id.as_deref(),
        Some("sensor.new_p")
    );
}

#[test]
fn unique_id_rename_moves_the_sensor() {
    let mut set = load(
        r#"
sensors:
  old_name:
    formula: "sensor.a"
    attributes:
      daily:
        formula: "state * 24"
  derived:
    formula: "old_name + 1"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::single("old_name", "new_name"));
    assert!(set.sensor("old_name").is_none());
    let renamed = set.sensor("new_name").unwrap();
    assert_eq!(renamed.unique_id, "new_name");
    assert_eq!(renamed.formulas[0].id, "new_name");
    assert_eq!(renamed.formulas[1].id, "new_name_daily");
    assert_eq!(
        set.sensor("derived").unwrap().main_formula().formula,
        "new_name + 1"
    );
}

#[test]
fn formula_count_is_preserved() {
    let yaml = r#"
sensors:
  a:
    formula: "sensor.x"
    attributes:
      att:
        formula: "state * 2"
  b:
    formula: "a + 1"
"#;
    let mut set = load(yaml);
    let before = set.formula_count();
    apply_reassignment(&mut set, &ReassignmentPlan::single("a", "renamed_a"));
    assert_eq!(set.formula_count(), before);
}

#[test]
fn rewrites_global_variables() {
    let mut set = load(
        r#"
global_settings:
  variables:
    grid: sensor.old_grid
sensors:
  s:
    formula: "grid"
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::single("sensor.old_grid", "sensor.new_grid"));
    assert_eq!(
        set.global_settings.variables.get("grid"),
        Some(&VariableBinding::EntityRef("sensor.new_grid".to_string()))
    );
}

#[test]
fn literal_bindings_are_untouched() {
    let mut set = load(
        r#"
sensors:
  s:
    formula: "x"
    variables:
      x: 5
"#,
    );
    apply_reassignment(&mut set, &ReassignmentPlan::single("x", "y"));
    assert_eq!(
        set.sensor("s").unwrap().main_formula().variables.get("x"),
        Some(&VariableBinding::Literal(ScalarLiteral::Number(5.0)))
    );
}
