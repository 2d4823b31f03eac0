use std::collections::HashMap;

use crate::context::{ContextEntry, HierarchicalContext};
use crate::error::CoreResult;
use crate::value::{ReferenceValue, Value};

use super::{ResolutionEnv, VariableResolver};

/// Cycle-scoped lazy dereferencing with memoization.
///
/// Context preparation inserts placeholders; the first read of a name goes
/// through the strategy chain and the result is memoized under the
/// placeholder's *reference* (the entity id), so every later read of the
/// same entity — under any variable name, in any formula of the cycle —
/// reuses it. A new cycle clears the memo.
#[derive(Debug, Default)]
pub struct LazyResolver {
    cycle_id: u64,
    memo: HashMap<String, Value>,
}

impl LazyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_new_cycle(&mut self) {
        self.cycle_id += 1;
        self.memo.clear();
    }

    pub fn cycle_id(&self) -> u64 {
        self.cycle_id
    }

    /// Read `name` from the context, dereferencing a lazy placeholder on
    /// first access. Names absent from the context resolve through the
    /// chain directly (attribute paths, entity references appearing only
    /// in sub-expressions).
    pub fn resolve_if_needed(
        &mut self,
        name: &str,
        ctx: &mut HierarchicalContext,
        resolver: &VariableResolver,
        env: &ResolutionEnv,
    ) -> CoreResult<Value> {
        let reference = match ctx.get(name) {
            Some(ContextEntry::Value(v)) => return Ok(v.clone()),
            Some(ContextEntry::Reference(rv)) => return Ok(rv.value.clone()),
            Some(ContextEntry::Lazy { reference, .. }) => reference.clone(),
            None => name.to_string(),
        };

        if let Some(value) = self.memo.get(&reference) {
            let value = value.clone();
            ctx.materialize(name, ReferenceValue::new(reference, value.clone()));
            return Ok(value);
        }

        let resolution = resolver.resolve(name, ctx, env)?;
        self.memo.insert(reference.clone(), resolution.value.clone());
        ctx.materialize(name, ReferenceValue::new(reference, resolution.value.clone()));
        Ok(resolution.value)
    }
}
