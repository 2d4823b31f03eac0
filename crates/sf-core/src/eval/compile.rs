use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;

use sf_lang::ast::Expr;
use sf_lang::plan::BindingPlan;

use crate::error::CoreResult;

use super::ast_service::AstService;

// ---------------------------------------------------------------------------
// Compiled formula
// ---------------------------------------------------------------------------

/// A formula ready to run: the shared AST plus its binding plan.
///
/// Immutable and cheap to clone; per-evaluation state (context, lazy
/// resolver) lives outside so one compiled formula may serve concurrent
/// evaluations.
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    pub expr: Arc<Expr>,
    pub plan: Arc<BindingPlan>,
}

// ---------------------------------------------------------------------------
// Compilation cache
// ---------------------------------------------------------------------------

/// Cache statistics, queryable at any time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

/// LRU of compiled formulas keyed by formula text, with a companion LRU
/// holding the pure-numeric subset for the fast evaluation path.
///
/// Correctness-neutral: clearing either cache changes no result, only
/// timing.
#[derive(Debug)]
pub struct CompilationCache {
    lru: Mutex<LruCache<String, CompiledFormula>>,
    numeric: Mutex<LruCache<String, CompiledFormula>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for CompilationCache {
    fn default() -> Self {
        Self::new(512, 256)
    }
}

impl CompilationCache {
    pub fn new(capacity: usize, numeric_capacity: usize) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(nonzero(capacity))),
            numeric: Mutex::new(LruCache::new(nonzero(numeric_capacity))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch the compiled form of `text`, compiling through the AST
    /// service on a miss.
    pub fn get_or_compile(&self, text: &str, ast: &AstService) -> CoreResult<CompiledFormula> {
        {
            let mut lru = self.lru.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = lru.get(text) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached.clone());
            }
        }

        let compiled = ast.get_or_build_plan(text)?;
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut lru = self.lru.lock().unwrap_or_else(|e| e.into_inner());
        lru.put(text.to_string(), compiled.clone());
        if compiled.plan.pure_numeric {
            self.numeric
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .put(text.to_string(), compiled.clone());
        }
        Ok(compiled)
    }

    /// The numeric-subset entry for `text`, if it was compiled as
    /// pure-numeric.
    pub fn get_numeric(&self, text: &str) -> Option<CompiledFormula> {
        self.numeric
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(text)
            .cloned()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries: self.lru.lock().unwrap_or_else(|e| e.into_inner()).len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    pub fn clear(&self) {
        self.lru
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.numeric
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

fn nonzero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n.max(1)).unwrap_or(NonZeroUsize::MIN)
}
