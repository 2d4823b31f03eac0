use indexmap::IndexMap;

use sf_config::model::{
    AlternateStates, ComputedVariable, FormulaConfig, ScalarLiteral, VariableBinding,
};

use crate::context::HierarchicalContext;
use crate::error::CoreResult;
use crate::host::DataProviderRegistry;
use crate::registry::SensorRegistry;
use crate::resolve::{FormulaKind, LazyResolver, ResolutionEnv};
use crate::testkit::MockHost;
use crate::value::{ReferenceValue, Value};

use super::*;

mod caches;

// -----------------------------------------------------------------------
// Fixture
// -----------------------------------------------------------------------

pub(super) struct EvalFixture {
    pub host: MockHost,
    pub registry: SensorRegistry,
    pub providers: DataProviderRegistry,
    pub globals: IndexMap<String, VariableBinding>,
    pub backing: Option<String>,
    pub kind: FormulaKind,
    /// Seeded main-formula result for attribute formulas.
    pub state_seed: Option<Value>,
}

impl EvalFixture {
    pub fn new(host: MockHost) -> Self {
        Self {
            host,
            registry: SensorRegistry::new(),
            providers: DataProviderRegistry::default(),
            globals: IndexMap::new(),
            backing: None,
            kind: FormulaKind::Main,
            state_seed: None,
        }
    }

    pub fn eval_with(
        &self,
        evaluator: &Evaluator,
        formula: &FormulaConfig,
    ) -> CoreResult<EvaluationOutcome> {
        let mut ctx = HierarchicalContext::new();
        if let Some(seed) = &self.state_seed {
            ctx.push_layer();
            ctx.insert_reference("state", ReferenceValue::new("state", seed.clone()));
        }
        let mut lazy = LazyResolver::new();
        lazy.start_new_cycle();
        let env = ResolutionEnv {
            host: &self.host,
            registry: &self.registry,
            providers: &self.providers,
            locals: &formula.variables,
            globals: &self.globals,
            backing_entity: self.backing.clone(),
            own_entity_id: None,
            kind: self.kind,
        };
        evaluator.evaluate_formula(formula, &env, &mut ctx, &mut lazy)
    }

    pub fn eval(&self, formula: &FormulaConfig) -> CoreResult<EvaluationOutcome> {
        self.eval_with(&Evaluator::new(), formula)
    }

    pub fn value(&self, formula: &FormulaConfig) -> Value {
        self.eval(formula).unwrap().value
    }
}

// -----------------------------------------------------------------------
// Formula builders
// -----------------------------------------------------------------------

pub(super) fn formula(text: &str) -> FormulaConfig {
    FormulaConfig::new("test", text)
}

pub(super) fn with_entity_var(mut f: FormulaConfig, name: &str, entity: &str) -> FormulaConfig {
    f.variables.insert(
        name.to_string(),
        VariableBinding::EntityRef(entity.to_string()),
    );
    f
}

pub(super) fn with_literal_var(mut f: FormulaConfig, name: &str, n: f64) -> FormulaConfig {
    f.variables.insert(
        name.to_string(),
        VariableBinding::Literal(ScalarLiteral::Number(n)),
    );
    f
}

pub(super) fn with_computed_var(
    mut f: FormulaConfig,
    name: &str,
    text: &str,
    alternates: AlternateStates,
) -> FormulaConfig {
    f.variables.insert(
        name.to_string(),
        VariableBinding::Computed(Box::new(ComputedVariable {
            formula: text.to_string(),
            alternates,
        })),
    );
    f
}
