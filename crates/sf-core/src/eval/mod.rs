use indexmap::IndexMap;

use orion_error::StructError;

use sf_config::model::{AlternateValue, ComputedVariable, FormulaConfig, VariableBinding};
use sf_config::validate::computed_variable_order;
use sf_lang::ast::is_entity_reference;
use sf_lang::plan::StrategyTag;

use crate::alternate::{literal_value, select_branch};
use crate::collection::CollectionResolver;
use crate::context::HierarchicalContext;
use crate::error::{CoreReason, CoreResult};
use crate::metadata::MetadataHandler;
use crate::resolve::{FormulaKind, LazyResolver, ResolutionEnv, VariableResolver};
use crate::value::{ReferenceValue, Value};

mod ast_service;
mod compile;
mod functions;
mod walker;

pub use ast_service::{AstService, AstStats};
pub use compile::{CacheStats, CompilationCache, CompiledFormula};
pub use walker::{EvalEnv, PreparedCalls};

#[cfg(test)]
mod tests;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The result of one formula evaluation: the typed value plus the
/// reference-value chain behind it, for traceability.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub value: Value,
    pub references: Vec<ReferenceValue>,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// The core formula evaluator: analyze → prepare a minimal context →
/// pre-evaluate metadata and collections → run the compiled AST → apply
/// alternate-state branches.
pub struct Evaluator {
    ast: AstService,
    cache: CompilationCache,
    resolver: VariableResolver,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_capacities(1024, 512, 256)
    }

    pub fn with_capacities(ast: usize, compiled: usize, numeric: usize) -> Self {
        Self {
            ast: AstService::new(ast),
            cache: CompilationCache::new(compiled, numeric),
            resolver: VariableResolver::new(),
        }
    }

    pub fn ast_service(&self) -> &AstService {
        &self.ast
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_caches(&self) {
        self.ast.clear();
        self.cache.clear();
    }

    /// Evaluate one formula of a sensor.
    ///
    /// The context gains a fresh frame for the duration; the frame is
    /// popped before returning, win or lose.
    pub fn evaluate_formula(
        &self,
        formula: &FormulaConfig,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
        lazy: &mut LazyResolver,
    ) -> CoreResult<EvaluationOutcome> {
        let compiled = self.compile(&formula.formula)?;

        ctx.push_layer();
        let result = self.eval_in_frame(&compiled, formula, env, ctx, lazy);
        let references = ctx.frame_references();
        ctx.pop_layer();

        result.map(|value| EvaluationOutcome { value, references })
    }

    fn compile(&self, text: &str) -> CoreResult<CompiledFormula> {
        self.cache.get_or_compile(text, &self.ast)
    }

    fn eval_in_frame(
        &self,
        compiled: &CompiledFormula,
        formula: &FormulaConfig,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
        lazy: &mut LazyResolver,
    ) -> CoreResult<Value> {
        self.insert_placeholders(compiled, env, ctx);
        self.eval_computed_variables(&formula.variables, env, ctx, lazy)?;
        let prepared = self.prepare_calls(compiled, env, ctx)?;

        let value = self.run(compiled, env, ctx, lazy, &prepared);
        self.apply_alternates(value, formula, env, ctx, lazy)
    }

    /// Populate the frame minimally: one lazy placeholder per free name of
    /// the plan, tagged with its resolution strategy. Names already bound
    /// in an outer layer (seeded `state`, sensor-set globals) are left to
    /// the context strategy.
    fn insert_placeholders(
        &self,
        compiled: &CompiledFormula,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
    ) {
        for name in &compiled.plan.names {
            if ctx.contains(name) {
                continue;
            }
            let (reference, strategy) = placeholder_for(name, env);
            ctx.insert_lazy(name.clone(), reference, strategy);
        }
    }

    /// Evaluate computed variables in dependency order, each with its own
    /// alternate branches applied to its own result.
    fn eval_computed_variables(
        &self,
        variables: &IndexMap<String, VariableBinding>,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
        lazy: &mut LazyResolver,
    ) -> CoreResult<()> {
        let order = computed_variable_order(variables).map_err(|cycle| {
            StructError::from(CoreReason::SensorConfiguration(format!(
                "computed variable cycle: {}",
                cycle.join(" -> ")
            )))
        })?;

        for name in order {
            let Some(VariableBinding::Computed(cv)) = variables.get(&name) else {
                continue;
            };
            let value = self.eval_computed(cv, env, ctx, lazy)?;
            ctx.insert_reference(name.clone(), ReferenceValue::new(name, value));
        }
        Ok(())
    }

    /// One computed variable: evaluated like a miniature formula in the
    /// current frame, inheriting the enclosing formula's kind (so its
    /// `state` token means the same thing). An unresolved dependency
    /// propagates the variable's alternate branch value, never the raw
    /// failure.
    fn eval_computed(
        &self,
        cv: &ComputedVariable,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
        lazy: &mut LazyResolver,
    ) -> CoreResult<Value> {
        let compiled = self.compile(&cv.formula)?;
        self.insert_placeholders(&compiled, env, ctx);
        let prepared = self.prepare_calls(&compiled, env, ctx)?;

        let value = self.run(&compiled, env, ctx, lazy, &prepared)?;

        // A sentinel result propagates the variable's own branch value,
        // never the raw sentinel.
        if value.is_sentinel()
            && let Some(branch) = select_branch(&cv.alternates, &value)
        {
            return self.eval_alternate(branch, env, ctx, lazy).or(Ok(value));
        }
        Ok(value)
    }

    /// Pre-evaluate metadata calls and collection queries into synthetic
    /// context keys; the AST walker only ever sees values.
    fn prepare_calls(
        &self,
        compiled: &CompiledFormula,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
    ) -> CoreResult<PreparedCalls> {
        let mut prepared = PreparedCalls::default();

        for (i, call) in compiled.plan.metadata_calls.iter().enumerate() {
            let entity = self.metadata_target(&call.entity_ref, env, ctx)?;
            let value = MetadataHandler::new(env.host).resolve(&entity, &call.key)?;
            ctx.insert_value(format!("_metadata_{i}"), value.clone());
            prepared.metadata.insert(call.clone(), value);
        }

        for (i, query) in compiled.plan.queries.iter().enumerate() {
            let resolver = match env.own_entity_id.as_deref() {
                Some(own) => CollectionResolver::excluding(env.host, own),
                None => CollectionResolver::new(env.host),
            };
            let value = resolver.resolve(query);
            ctx.insert_value(format!("_collection_{i}"), value.clone());
            prepared.collections.insert(query.clone(), value);
        }

        Ok(prepared)
    }

    /// Resolve a metadata call's first argument to a concrete entity id.
    fn metadata_target(
        &self,
        reference: &str,
        env: &ResolutionEnv,
        ctx: &HierarchicalContext,
    ) -> CoreResult<String> {
        if is_entity_reference(reference) {
            return Ok(reference.to_string());
        }
        if let Some(entity) = env.entity_for(reference) {
            return Ok(entity);
        }
        if reference == "state"
            && env.kind == FormulaKind::Main
            && let Some(backing) = env.backing_entity.as_deref()
        {
            return Ok(backing.to_string());
        }
        // A previously materialized reference (e.g. a computed variable
        // bound to an entity).
        if let Some(crate::context::ContextEntry::Reference(rv)) = ctx.get(reference)
            && is_entity_reference(&rv.reference)
        {
            return Ok(rv.reference.clone());
        }
        StructError::from(CoreReason::MissingDependency(format!(
            "metadata target {reference:?} is not an entity reference"
        )))
        .err()
    }

    /// Run the compiled expression: numeric fast path first where the plan
    /// allows it, the full walker otherwise.
    fn run(
        &self,
        compiled: &CompiledFormula,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
        lazy: &mut LazyResolver,
        prepared: &PreparedCalls,
    ) -> CoreResult<Value> {
        if compiled.plan.pure_numeric {
            let mut resolve = |name: &str| -> Option<f64> {
                match lazy.resolve_if_needed(name, ctx, &self.resolver, env) {
                    Ok(v) if !v.is_sentinel() => v.as_f64(),
                    _ => None,
                }
            };
            if let Some(value) = walker::try_eval_numeric(&compiled.expr, &mut resolve) {
                return Ok(value);
            }
        }

        let mut ee = EvalEnv {
            ctx,
            resolver: &self.resolver,
            renv: env,
            lazy,
            prepared,
        };
        walker::eval_expr(&compiled.expr, &mut ee)
    }

    /// Alternate-state handling for the formula's own result.
    fn apply_alternates(
        &self,
        value: CoreResult<Value>,
        formula: &FormulaConfig,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
        lazy: &mut LazyResolver,
    ) -> CoreResult<Value> {
        let value = value?;
        if value.is_sentinel() {
            if let Some(branch) = select_branch(&formula.alternates, &value) {
                match self.eval_alternate(branch, env, ctx, lazy) {
                    Ok(replacement) => return Ok(replacement),
                    Err(e) => {
                        // A failing branch leaves the raw sentinel.
                        log::debug!("alternate branch for {} failed: {e}", formula.id);
                    }
                }
            }
        }
        Ok(value)
    }

    /// Evaluate one alternate branch in the same context. The branch's own
    /// alternates are *not* applied to its output; a failing branch
    /// surfaces as an error for the caller to fall back on the sentinel.
    fn eval_alternate(
        &self,
        branch: &AlternateValue,
        env: &ResolutionEnv,
        ctx: &mut HierarchicalContext,
        lazy: &mut LazyResolver,
    ) -> CoreResult<Value> {
        match branch {
            AlternateValue::Literal(lit) => Ok(literal_value(lit)),
            AlternateValue::Formula(text) => {
                let compiled = self.compile(text)?;
                self.insert_placeholders(&compiled, env, ctx);
                let prepared = self.prepare_calls(&compiled, env, ctx)?;
                self.run(&compiled, env, ctx, lazy, &prepared)
            }
            AlternateValue::Detailed(detail) => {
                // The branch sees the main formula's variables, with its
                // own layered on top.
                let mut merged = env.locals.clone();
                for (name, binding) in &detail.variables {
                    merged.insert(name.clone(), binding.clone());
                }
                let branch_env = env.with_locals(&merged);

                let compiled = self.compile(&detail.formula)?;
                ctx.push_layer();
                let result = (|| {
                    self.insert_placeholders(&compiled, &branch_env, ctx);
                    self.eval_computed_variables(&detail.variables, &branch_env, ctx, lazy)?;
                    let prepared = self.prepare_calls(&compiled, &branch_env, ctx)?;
                    self.run(&compiled, &branch_env, ctx, lazy, &prepared)
                })();
                ctx.pop_layer();
                result
            }
            _ => unreachable!("non_exhaustive enum; all known variants handled"),
        }
    }
}

/// The placeholder a plan name gets: its underlying reference and the
/// strategy expected to answer it.
fn placeholder_for(name: &str, env: &ResolutionEnv) -> (String, StrategyTag) {
    if name == "state" {
        let reference = env
            .backing_entity
            .clone()
            .unwrap_or_else(|| name.to_string());
        return (reference, StrategyTag::HaState);
    }
    match env.binding(name) {
        Some(VariableBinding::Literal(_)) => (name.to_string(), StrategyTag::Literal),
        Some(VariableBinding::Computed(_)) => (name.to_string(), StrategyTag::Computed),
        Some(VariableBinding::EntityRef(entity)) => {
            let tag = if env.providers.owns(entity) {
                StrategyTag::DataProvider
            } else if env.registry.contains(entity) {
                StrategyTag::CrossSensor
            } else {
                StrategyTag::HaState
            };
            (entity.clone(), tag)
        }
        Some(VariableBinding::Reference(target)) => {
            if env.registry.contains(target) {
                (target.clone(), StrategyTag::CrossSensor)
            } else {
                (name.to_string(), StrategyTag::Literal)
            }
        }
        None => {
            if env.registry.contains(name) {
                (name.to_string(), StrategyTag::CrossSensor)
            } else if is_entity_reference(name) {
                let tag = if env.providers.owns(name) {
                    StrategyTag::DataProvider
                } else {
                    StrategyTag::HaState
                };
                (name.to_string(), tag)
            } else {
                (name.to_string(), StrategyTag::HaState)
            }
        }
        Some(_) => unreachable!("non_exhaustive enum; all known variants handled"),
    }
}
