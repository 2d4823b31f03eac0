use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use orion_error::StructError;

use sf_config::{SensorSet, sensor_collection_queries, sensor_reference_names};
use sf_lang::analysis::is_builtin_function;
use sf_lang::ast::is_entity_reference;

use crate::collection::CollectionResolver;
use crate::error::{CoreReason, CoreResult};
use crate::host::HostAdapter;


// ---------------------------------------------------------------------------
// Dependency graph
// ---------------------------------------------------------------------------

/// Forward, reverse, and backing-entity indexes over one sensor set.
///
/// Rebuilt on configuration load and after every CRUD or reassignment.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// sensor → sensors it references.
    forward: IndexMap<String, IndexSet<String>>,
    /// sensor → sensors that reference it.
    reverse: IndexMap<String, IndexSet<String>>,
    /// entity_id → sensors that read it.
    backing: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Build the indexes for `set`.
    ///
    /// `backing_map` names each sensor's backing entity for the `state`
    /// token (sensors absent from the map have none).
    ///
    /// Fails with `MissingDependency` when a bare identifier in a formula
    /// is neither a bound variable, a builtin, the `state` token, nor a
    /// sensor key — such a reference can never resolve.
    pub fn build(set: &SensorSet, backing_map: &HashMap<String, String>) -> CoreResult<Self> {
        let mut graph = Self {
            forward: IndexMap::new(),
            reverse: IndexMap::new(),
            backing: IndexMap::new(),
        };

        // Identity lookup: unique_id and resolved entity_id per sensor.
        let mut by_identity: HashMap<String, String> = HashMap::new();
        for sensor in set.sensors.values() {
            by_identity.insert(sensor.unique_id.clone(), sensor.unique_id.clone());
            by_identity.insert(sensor.resolved_entity_id(), sensor.unique_id.clone());
        }

        for sensor in set.sensors.values() {
            graph.forward.entry(sensor.unique_id.clone()).or_default();
            graph.reverse.entry(sensor.unique_id.clone()).or_default();
        }

        for sensor in set.sensors.values() {
            let uid = &sensor.unique_id;

            // Names bound as variables (locally in any formula, or globally)
            // are resolved through their bindings, which were collected
            // alongside the formula-text names.
            let mut bound: IndexSet<&str> = IndexSet::new();
            for formula in &sensor.formulas {
                bound.extend(formula.variables.keys().map(String::as_str));
            }
            bound.extend(set.global_settings.variables.keys().map(String::as_str));

            for name in sensor_reference_names(sensor) {
                if name == "state" {
                    if let Some(backing) = backing_map.get(uid) {
                        graph.add_backing(backing, uid);
                    }
                    continue;
                }
                if bound.contains(name.as_str()) || is_builtin_function(&name) {
                    continue;
                }
                if let Some(target) = by_identity.get(&name) {
                    // A sensor naming itself is a self-edge; cycle
                    // validation rejects it.
                    graph.add_edge(uid, target);
                    continue;
                }
                if is_entity_reference(&name) {
                    graph.add_backing(&name, uid);
                    continue;
                }
                return StructError::from(CoreReason::MissingDependency(format!(
                    "sensor {uid}: reference {name:?} does not match any sensor or entity"
                )))
                .err();
            }
        }

        Ok(graph)
    }

    /// Like [`build`](Self::build), additionally registering the entities
    /// each collection query currently matches as backing dependencies, so
    /// member-entity changes re-evaluate the querying sensor.
    pub fn build_with_host(
        set: &SensorSet,
        backing_map: &HashMap<String, String>,
        host: &dyn HostAdapter,
    ) -> CoreResult<Self> {
        let mut graph = Self::build(set, backing_map)?;
        for sensor in set.sensors.values() {
            let own = sensor.resolved_entity_id();
            let resolver = CollectionResolver::excluding(host, &own);
            for query in sensor_collection_queries(sensor) {
                for entity in resolver.matching_entities(&query) {
                    graph.add_backing(&entity, &sensor.unique_id);
                }
            }
        }
        Ok(graph)
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.forward
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.reverse
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    fn add_backing(&mut self, entity_id: &str, sensor: &str) {
        self.backing
            .entry(entity_id.to_string())
            .or_default()
            .insert(sensor.to_string());
    }

    /// Sensors that `sensor` references.
    pub fn dependencies_of(&self, sensor: &str) -> IndexSet<String> {
        self.forward.get(sensor).cloned().unwrap_or_default()
    }

    /// Sensors that reference `sensor`.
    pub fn dependents_of(&self, sensor: &str) -> IndexSet<String> {
        self.reverse.get(sensor).cloned().unwrap_or_default()
    }

    /// Entities read by any sensor.
    pub fn backing_entities(&self) -> impl Iterator<Item = &String> {
        self.backing.keys()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Reject cyclic configurations. DFS with white/grey/black coloring;
    /// the error names the first cycle found as an ordered path.
    pub fn validate(&self) -> CoreResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Grey,
            Black,
        }

        fn visit(
            node: &str,
            forward: &IndexMap<String, IndexSet<String>>,
            color: &mut HashMap<String, Color>,
            path: &mut Vec<String>,
        ) -> Result<(), Vec<String>> {
            color.insert(node.to_string(), Color::Grey);
            path.push(node.to_string());
            if let Some(deps) = forward.get(node) {
                for dep in deps {
                    match color.get(dep.as_str()).copied().unwrap_or(Color::White) {
                        Color::Grey => {
                            let start = path.iter().position(|n| n == dep).unwrap_or(0);
                            let mut cycle: Vec<String> = path[start..].to_vec();
                            cycle.push(dep.clone());
                            return Err(cycle);
                        }
                        Color::White => visit(dep, forward, color, path)?,
                        Color::Black => {}
                    }
                }
            }
            path.pop();
            color.insert(node.to_string(), Color::Black);
            Ok(())
        }

        let mut color: HashMap<String, Color> = HashMap::new();
        let mut path = Vec::new();
        for root in self.forward.keys() {
            if color.get(root.as_str()).copied().unwrap_or(Color::White) == Color::White
                && let Err(cycle) = visit(root, &self.forward, &mut color, &mut path)
            {
                return StructError::from(CoreReason::CircularDependency(cycle.join(" -> ")))
                    .err();
            }
        }
        Ok(())
    }

    /// Check that every cross-sensor edge points at a sensor in the set.
    /// `build` guarantees this by construction; this re-checks after
    /// reassignment rewrites.
    pub fn validate_cross_sensor_references(&self, set: &SensorSet) -> CoreResult<()> {
        for (from, deps) in &self.forward {
            for dep in deps {
                if !set.sensors.contains_key(dep) {
                    return StructError::from(CoreReason::MissingDependency(format!(
                        "sensor {from}: cross-sensor reference {dep:?} not in set"
                    )))
                    .err();
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Ordering and closure
    // -----------------------------------------------------------------------

    /// Order `subset` so every sensor comes after its dependencies within
    /// the subset. Dependencies outside the subset are assumed current.
    /// Deterministic: ties break by sensor key order.
    pub fn topological_order(&self, subset: &IndexSet<String>) -> Vec<String> {
        let mut in_degree: IndexMap<&str, usize> = IndexMap::new();
        let mut members: Vec<&str> = subset.iter().map(String::as_str).collect();
        members.sort_unstable();

        for sensor in &members {
            let degree = self
                .forward
                .get(*sensor)
                .map(|deps| deps.iter().filter(|d| subset.contains(d.as_str())).count())
                .unwrap_or(0);
            in_degree.insert(*sensor, degree);
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(s, _)| *s)
            .collect();
        ready.sort_unstable();

        let mut order = Vec::with_capacity(members.len());
        while let Some(sensor) = ready.first().copied() {
            ready.remove(0);
            order.push(sensor.to_string());
            if let Some(dependents) = self.reverse.get(sensor) {
                let mut unlocked: Vec<&str> = Vec::new();
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            unlocked.push(dependent.as_str());
                        }
                    }
                }
                unlocked.sort_unstable();
                for u in unlocked {
                    let pos = ready.binary_search(&u).unwrap_or_else(|p| p);
                    ready.insert(pos, u);
                }
            }
        }
        order
    }

    /// Sensors that read any of `changed_entities` directly — the seed of
    /// the affected closure.
    pub fn direct_readers<'a>(
        &self,
        changed_entities: impl IntoIterator<Item = &'a str>,
    ) -> IndexSet<String> {
        let mut readers = IndexSet::new();
        for entity in changed_entities {
            if let Some(set) = self.backing.get(entity) {
                readers.extend(set.iter().cloned());
            }
        }
        readers
    }

    /// All sensors transitively affected by a change to any of
    /// `changed_entities`: direct readers expanded through the reverse
    /// index. Deterministic.
    pub fn affected_closure<'a>(
        &self,
        changed_entities: impl IntoIterator<Item = &'a str>,
    ) -> IndexSet<String> {
        let mut closure: IndexSet<String> = IndexSet::new();
        let mut frontier: Vec<String> = Vec::new();

        for entity in changed_entities {
            if let Some(readers) = self.backing.get(entity) {
                for reader in readers {
                    if closure.insert(reader.clone()) {
                        frontier.push(reader.clone());
                    }
                }
            }
        }

        while let Some(sensor) = frontier.pop() {
            if let Some(dependents) = self.reverse.get(&sensor) {
                for dependent in dependents {
                    if closure.insert(dependent.clone()) {
                        frontier.push(dependent.clone());
                    }
                }
            }
        }
        closure.sort_unstable();
        closure
    }
}
