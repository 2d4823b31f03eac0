use indexmap::IndexMap;

use orion_error::StructError;

use sf_config::model::VariableBinding;
use sf_lang::ast::is_entity_reference;
use sf_lang::plan::StrategyTag;

use crate::context::HierarchicalContext;
use crate::error::{CoreReason, CoreResult};
use crate::host::{DataProviderRegistry, HostAdapter};
use crate::registry::SensorRegistry;
use crate::value::Value;

mod lazy;
mod strategies;

pub use lazy::LazyResolver;
pub use strategies::default_strategies;


// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Which formula of a sensor is being evaluated. The `state` token means
/// "the backing entity's state" in main formulas and "the main formula's
/// just-computed result" in attribute formulas; the two interpretations
/// never cross over. Computed variables inherit the kind of the formula
/// that declares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaKind {
    Main,
    Attribute,
}

/// Everything a strategy may consult to resolve one name.
#[derive(Clone)]
pub struct ResolutionEnv<'a> {
    pub host: &'a dyn HostAdapter,
    pub registry: &'a SensorRegistry,
    pub providers: &'a DataProviderRegistry,
    /// The formula's own variables.
    pub locals: &'a IndexMap<String, VariableBinding>,
    /// The sensor set's global variables.
    pub globals: &'a IndexMap<String, VariableBinding>,
    /// Backing entity that fills the `state` token for main formulas.
    pub backing_entity: Option<String>,
    /// The evaluating sensor's published entity id (collection
    /// self-exclusion).
    pub own_entity_id: Option<String>,
    pub kind: FormulaKind,
}

impl<'a> ResolutionEnv<'a> {
    /// Local binding wins over a global of the same name.
    pub fn binding(&self, name: &str) -> Option<&'a VariableBinding> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }

    /// The entity id a name stands for, if any: either the name itself or
    /// its entity-reference binding.
    pub fn entity_for(&self, name: &str) -> Option<String> {
        if is_entity_reference(name) {
            return Some(name.to_string());
        }
        match self.binding(name) {
            Some(VariableBinding::EntityRef(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// The same environment with a different local-variable table — used
    /// for alternate branches that bring their own variables. The result
    /// borrows from both `self` and the new table.
    pub fn with_locals<'b>(
        &'b self,
        locals: &'b IndexMap<String, VariableBinding>,
    ) -> ResolutionEnv<'b> {
        ResolutionEnv {
            host: self.host,
            registry: self.registry,
            providers: self.providers,
            locals,
            globals: self.globals,
            backing_entity: self.backing_entity.clone(),
            own_entity_id: self.own_entity_id.clone(),
            kind: self.kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy interface
// ---------------------------------------------------------------------------

/// Result of one resolution: the value, whether the underlying source
/// exists, and which strategy answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Value,
    pub exists: bool,
    pub source: StrategyTag,
}

impl Resolution {
    pub fn new(value: Value, source: StrategyTag) -> Self {
        Self {
            value,
            exists: true,
            source,
        }
    }
}

/// One algorithm for mapping a symbolic name to a typed value.
///
/// Strategies form an ordered chain; the first whose `can_resolve` answers
/// true provides the value. Adding a strategy means appending to the list,
/// not extending a type hierarchy.
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_resolve(&self, name: &str, ctx: &HierarchicalContext, env: &ResolutionEnv) -> bool;

    fn resolve(
        &self,
        name: &str,
        ctx: &HierarchicalContext,
        env: &ResolutionEnv,
    ) -> CoreResult<Resolution>;
}

// ---------------------------------------------------------------------------
// Resolver chain
// ---------------------------------------------------------------------------

/// The fixed-order strategy chain: context → literal → state token → data
/// provider → host state → cross-sensor → attribute navigation.
pub struct VariableResolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl Default for VariableResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableResolver {
    pub fn new() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }

    /// Resolve `name` through the chain. No strategy claiming the name is
    /// a missing dependency.
    pub fn resolve(
        &self,
        name: &str,
        ctx: &HierarchicalContext,
        env: &ResolutionEnv,
    ) -> CoreResult<Resolution> {
        for strategy in &self.strategies {
            if strategy.can_resolve(name, ctx, env) {
                log::trace!("resolving {name:?} via {}", strategy.name());
                return strategy.resolve(name, ctx, env);
            }
        }
        StructError::from(CoreReason::MissingDependency(name.to_string())).err()
    }
}
