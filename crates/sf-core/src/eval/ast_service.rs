use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use orion_error::StructError;

use sf_lang::analysis::AnalysisError;
use sf_lang::ast::Expr;
use sf_lang::plan::{BindingPlan, DynamicQuery};
use sf_lang::{analyze, parse_formula};

use crate::error::{CoreReason, CoreResult, syntax_error};

use super::compile::CompiledFormula;

// ---------------------------------------------------------------------------
// AST analysis service
// ---------------------------------------------------------------------------

/// Parse-once, analyze-once service: formula text → (AST, binding plan),
/// memoized by the exact text. No normalization is applied — the text a
/// sensor configuration carries is stable across cycles, which is what
/// makes text-keyed caching pay off.
#[derive(Debug)]
pub struct AstService {
    capacity: usize,
    plans: Mutex<HashMap<String, CompiledFormula>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for AstService {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl AstService {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            plans: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Idempotent, memoized plan construction. Parse failures carry the
    /// offending position.
    pub fn get_or_build_plan(&self, text: &str) -> CoreResult<CompiledFormula> {
        {
            let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = plans.get(text) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached.clone());
            }
        }

        let expr = parse_formula(text).map_err(|e| syntax_error(&e))?;
        let analysis = analyze(&expr).map_err(map_analysis_error)?;
        let compiled = CompiledFormula::new(expr, BindingPlan::from_analysis(&analysis));

        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        if plans.len() >= self.capacity {
            // Wholesale flush; the cache is correctness-neutral.
            plans.clear();
        }
        plans.insert(text.to_string(), compiled.clone());
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(compiled)
    }

    /// The free names a formula needs resolved externally (built-in
    /// functions excluded).
    pub fn extract_dependencies(&self, text: &str) -> CoreResult<IndexSet<String>> {
        Ok(self.get_or_build_plan(text)?.plan.names.clone())
    }

    /// Collection query sites of a formula.
    pub fn extract_dynamic_queries(&self, text: &str) -> CoreResult<Vec<DynamicQuery>> {
        Ok(self.get_or_build_plan(text)?.plan.queries.clone())
    }

    pub fn stats(&self) -> AstStats {
        AstStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.plans.lock().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }

    pub fn clear(&self) {
        self.plans.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AstStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Analysis failures are configuration problems: malformed metadata calls
/// read as syntax errors, bad collection patterns as configuration errors.
fn map_analysis_error(err: AnalysisError) -> crate::error::CoreError {
    match &err {
        AnalysisError::InvalidCollectionPattern { .. } => {
            StructError::from(CoreReason::SensorConfiguration(err.to_string()))
        }
        _ => StructError::from(CoreReason::FormulaSyntax {
            position: 0,
            message: err.to_string(),
        }),
    }
}

impl CompiledFormula {
    pub(crate) fn new(expr: Expr, plan: BindingPlan) -> Self {
        Self {
            expr: std::sync::Arc::new(expr),
            plan: std::sync::Arc::new(plan),
        }
    }
}
