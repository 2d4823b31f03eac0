use orion_error::StructError;

use sf_config::model::{ScalarLiteral, VariableBinding};
use sf_lang::ast::{is_entity_reference, is_host_domain};
use sf_lang::plan::StrategyTag;

use crate::context::{ContextEntry, HierarchicalContext};
use crate::error::{CoreReason, CoreResult};
use crate::host::attr_to_value;
use crate::value::{Value, looks_numeric_but_invalid, parse_state};

use super::{FormulaKind, Resolution, ResolutionEnv, ResolutionStrategy};

/// The chain in its fixed order.
pub fn default_strategies() -> Vec<Box<dyn ResolutionStrategy>> {
    vec![
        Box::new(ContextStrategy),
        Box::new(LiteralStrategy),
        Box::new(StateTokenStrategy),
        Box::new(DataProviderStrategy),
        Box::new(HostStateStrategy),
        Box::new(CrossSensorStrategy),
        Box::new(AttributeNavigationStrategy),
    ]
}

// ---------------------------------------------------------------------------
// 1. Context
// ---------------------------------------------------------------------------

/// A value already materialized in the hierarchical context (computed
/// variables, the seeded `state` of attribute formulas, synthetic keys).
struct ContextStrategy;

impl ResolutionStrategy for ContextStrategy {
    fn name(&self) -> &'static str {
        "context"
    }

    fn can_resolve(&self, name: &str, ctx: &HierarchicalContext, _env: &ResolutionEnv) -> bool {
        matches!(
            ctx.get(name),
            Some(ContextEntry::Value(_) | ContextEntry::Reference(_))
        )
    }

    fn resolve(
        &self,
        name: &str,
        ctx: &HierarchicalContext,
        _env: &ResolutionEnv,
    ) -> CoreResult<Resolution> {
        let value = ctx.get_value(name).cloned().unwrap_or(Value::None);
        Ok(Resolution::new(value, StrategyTag::Context))
    }
}

// ---------------------------------------------------------------------------
// 2. Literal
// ---------------------------------------------------------------------------

/// The binding is a constant. Bare-identifier bindings that match no
/// registered sensor degrade to plain strings here.
struct LiteralStrategy;

impl ResolutionStrategy for LiteralStrategy {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn can_resolve(&self, name: &str, _ctx: &HierarchicalContext, env: &ResolutionEnv) -> bool {
        match env.binding(name) {
            Some(VariableBinding::Literal(_)) => true,
            Some(VariableBinding::Reference(r)) => {
                !env.registry.contains(r) && !is_entity_reference(r)
            }
            _ => false,
        }
    }

    fn resolve(
        &self,
        name: &str,
        _ctx: &HierarchicalContext,
        env: &ResolutionEnv,
    ) -> CoreResult<Resolution> {
        let value = match env.binding(name) {
            Some(VariableBinding::Literal(ScalarLiteral::Number(n))) => Value::Number(*n),
            Some(VariableBinding::Literal(ScalarLiteral::Bool(b))) => Value::Bool(*b),
            Some(VariableBinding::Literal(ScalarLiteral::Str(s))) => Value::Str(s.clone()),
            Some(VariableBinding::Reference(r)) => Value::Str(r.clone()),
            _ => Value::None,
        };
        Ok(Resolution::new(value, StrategyTag::Literal))
    }
}

// ---------------------------------------------------------------------------
// 3. Self-reference via the `state` token
// ---------------------------------------------------------------------------

/// `state` in a main formula reads the sensor's backing entity. Attribute
/// formulas never reach this strategy: their `state` is seeded into the
/// context with the main formula's result.
struct StateTokenStrategy;

impl ResolutionStrategy for StateTokenStrategy {
    fn name(&self) -> &'static str {
        "state_token"
    }

    fn can_resolve(&self, name: &str, _ctx: &HierarchicalContext, env: &ResolutionEnv) -> bool {
        name == "state" && env.kind == FormulaKind::Main
    }

    fn resolve(
        &self,
        _name: &str,
        _ctx: &HierarchicalContext,
        env: &ResolutionEnv,
    ) -> CoreResult<Resolution> {
        let Some(backing) = env.backing_entity.as_deref() else {
            return StructError::from(CoreReason::MissingDependency(
                "state token used without a backing entity".to_string(),
            ))
            .err();
        };
        let value = read_entity(backing, env)?;
        Ok(Resolution::new(value, StrategyTag::HaState))
    }
}

// ---------------------------------------------------------------------------
// 4. Integration data provider
// ---------------------------------------------------------------------------

/// Virtual entities owned by the hosting integration, invisible to the
/// host's ordinary state bus.
struct DataProviderStrategy;

impl ResolutionStrategy for DataProviderStrategy {
    fn name(&self) -> &'static str {
        "data_provider"
    }

    fn can_resolve(&self, name: &str, _ctx: &HierarchicalContext, env: &ResolutionEnv) -> bool {
        env.entity_for(name)
            .is_some_and(|entity| env.providers.owns(&entity))
    }

    fn resolve(
        &self,
        name: &str,
        _ctx: &HierarchicalContext,
        env: &ResolutionEnv,
    ) -> CoreResult<Resolution> {
        let entity = env.entity_for(name).unwrap_or_else(|| name.to_string());
        match env.providers.query(&entity) {
            Some(result) if result.exists => Ok(Resolution {
                value: result.value,
                exists: true,
                source: StrategyTag::DataProvider,
            }),
            Some(_) => Ok(Resolution {
                value: Value::Unknown,
                exists: false,
                source: StrategyTag::DataProvider,
            }),
            None => StructError::from(CoreReason::UnavailableDependency(entity)).err(),
        }
    }
}

// ---------------------------------------------------------------------------
// 5. Host state
// ---------------------------------------------------------------------------

/// Ordinary host entities. Declines entities that belong to a registered
/// synthetic sensor — within a cycle the registry carries the fresh value,
/// the host may still hold last cycle's.
struct HostStateStrategy;

impl ResolutionStrategy for HostStateStrategy {
    fn name(&self) -> &'static str {
        "host_state"
    }

    fn can_resolve(&self, name: &str, _ctx: &HierarchicalContext, env: &ResolutionEnv) -> bool {
        env.entity_for(name)
            .is_some_and(|entity| !env.registry.contains(&entity))
    }

    fn resolve(
        &self,
        name: &str,
        _ctx: &HierarchicalContext,
        env: &ResolutionEnv,
    ) -> CoreResult<Resolution> {
        let entity = env.entity_for(name).unwrap_or_else(|| name.to_string());
        let value = read_entity(&entity, env)?;
        Ok(Resolution::new(value, StrategyTag::HaState))
    }
}

/// Shared host/provider entity read with numeric sanity checking.
///
/// An entity the host does not know (yet) reads as `unknown` — it may
/// appear later, and the sentinel lets alternate branches take over
/// instead of failing the whole evaluation.
fn read_entity(entity_id: &str, env: &ResolutionEnv) -> CoreResult<Value> {
    if env.providers.owns(entity_id) {
        return match env.providers.query(entity_id) {
            Some(result) if result.exists => Ok(result.value),
            Some(_) => Ok(Value::Unknown),
            None => StructError::from(CoreReason::UnavailableDependency(entity_id.to_string()))
                .err(),
        };
    }
    let Some(snapshot) = env.host.get_state(entity_id) else {
        log::debug!("entity {entity_id} not present in host state, resolving as unknown");
        return Ok(Value::Unknown);
    };
    if looks_numeric_but_invalid(&snapshot.state) {
        return StructError::from(CoreReason::NonNumericState {
            entity: entity_id.to_string(),
            state: snapshot.state.clone(),
        })
        .err();
    }
    Ok(parse_state(&snapshot.state))
}

// ---------------------------------------------------------------------------
// 6. Cross-sensor
// ---------------------------------------------------------------------------

/// Another synthetic sensor's last committed value, by unique_id or
/// entity_id.
struct CrossSensorStrategy;

impl ResolutionStrategy for CrossSensorStrategy {
    fn name(&self) -> &'static str {
        "cross_sensor"
    }

    fn can_resolve(&self, name: &str, _ctx: &HierarchicalContext, env: &ResolutionEnv) -> bool {
        if env.registry.contains(name) {
            return true;
        }
        match env.binding(name) {
            Some(VariableBinding::Reference(r)) | Some(VariableBinding::EntityRef(r)) => {
                env.registry.contains(r)
            }
            _ => false,
        }
    }

    fn resolve(
        &self,
        name: &str,
        _ctx: &HierarchicalContext,
        env: &ResolutionEnv,
    ) -> CoreResult<Resolution> {
        let key = match env.binding(name) {
            Some(VariableBinding::Reference(r)) | Some(VariableBinding::EntityRef(r))
                if env.registry.contains(r) =>
            {
                r.clone()
            }
            _ => name.to_string(),
        };
        match env.registry.get(&key) {
            Some(sensor) => Ok(Resolution::new(sensor.value, StrategyTag::CrossSensor)),
            None => StructError::from(CoreReason::MissingDependency(key)).err(),
        }
    }
}

// ---------------------------------------------------------------------------
// 7. Attribute navigation
// ---------------------------------------------------------------------------

/// `base.attr1.attr2…` — resolve `base` to an entity and walk into its
/// attributes. A missing intermediate key yields `none`.
struct AttributeNavigationStrategy;

impl AttributeNavigationStrategy {
    /// Split a dotted name into (entity id, attribute path).
    fn split<'n>(name: &'n str, env: &ResolutionEnv) -> Option<(String, Vec<&'n str>)> {
        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() < 2 {
            return None;
        }
        // `domain.object.attr…`
        if is_host_domain(segments[0]) {
            if segments.len() < 3 {
                return None;
            }
            let entity = format!("{}.{}", segments[0], segments[1]);
            return Some((entity, segments[2..].to_vec()));
        }
        // `variable.attr…` where the variable is bound to an entity.
        let entity = env.entity_for(segments[0])?;
        Some((entity, segments[1..].to_vec()))
    }
}

impl ResolutionStrategy for AttributeNavigationStrategy {
    fn name(&self) -> &'static str {
        "attribute_navigation"
    }

    fn can_resolve(&self, name: &str, _ctx: &HierarchicalContext, env: &ResolutionEnv) -> bool {
        Self::split(name, env).is_some()
    }

    fn resolve(
        &self,
        name: &str,
        _ctx: &HierarchicalContext,
        env: &ResolutionEnv,
    ) -> CoreResult<Resolution> {
        let Some((entity, path)) = Self::split(name, env) else {
            return StructError::from(CoreReason::MissingDependency(name.to_string())).err();
        };

        let attributes = if env.providers.owns(&entity) {
            match env.providers.query(&entity) {
                Some(result) if result.exists => result.attributes,
                _ => {
                    return Ok(Resolution::new(Value::None, StrategyTag::HaState));
                }
            }
        } else {
            let Some(snapshot) = env.host.get_state(&entity) else {
                return StructError::from(CoreReason::MissingDependency(entity)).err();
            };
            snapshot.attributes
        };

        // Walk the path; intermediate segments must be objects.
        let mut current = match attributes.get(path[0]) {
            Some(v) => v.clone(),
            None => return Ok(Resolution::new(Value::None, StrategyTag::HaState)),
        };
        for segment in &path[1..] {
            match current.get(segment) {
                Some(next) => current = next.clone(),
                None => return Ok(Resolution::new(Value::None, StrategyTag::HaState)),
            }
        }
        Ok(Resolution::new(attr_to_value(&current), StrategyTag::HaState))
    }
}
