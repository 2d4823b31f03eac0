use sf_lang::plan::{CollectionFn, QueryType};

use super::*;

// -----------------------------------------------------------------------
// AST service
// -----------------------------------------------------------------------

#[test]
fn plans_are_memoized_by_text() {
    let ast = AstService::new(16);
    ast.get_or_build_plan("a + b").unwrap();
    ast.get_or_build_plan("a + b").unwrap();
    ast.get_or_build_plan("a + b").unwrap();
    let stats = ast.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.entries, 1);
}

#[test]
fn no_text_normalization_is_applied() {
    let ast = AstService::new(16);
    ast.get_or_build_plan("a + b").unwrap();
    ast.get_or_build_plan("a+b").unwrap();
    assert_eq!(ast.stats().entries, 2);
}

#[test]
fn syntax_errors_carry_a_position() {
    let ast = AstService::new(16);
    let err = ast.get_or_build_plan("1 +").unwrap_err();
    assert!(err.to_string().contains("offset"));
}

#[test]
fn extract_dependencies_excludes_builtins() {
    let ast = AstService::new(16);
    let deps = ast.extract_dependencies("max(a, round(b, 2)) + sensor.c").unwrap();
    assert_eq!(
        deps.iter().collect::<Vec<_>>(),
        vec!["a", "b", "sensor.c"]
    );
}

#[test]
fn extract_dynamic_queries_reports_sites() {
    let ast = AstService::new(16);
    let queries = ast
        .extract_dynamic_queries(r#"sum("device_class:power") + 1"#)
        .unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].function, CollectionFn::Sum);
    assert_eq!(queries[0].query_type, QueryType::DeviceClass);
}

#[test]
fn capacity_overflow_flushes() {
    let ast = AstService::new(2);
    ast.get_or_build_plan("1").unwrap();
    ast.get_or_build_plan("2").unwrap();
    ast.get_or_build_plan("3").unwrap();
    assert!(ast.stats().entries <= 2);
    // Still serves correct plans after the flush.
    assert!(ast.get_or_build_plan("1").is_ok());
}

// -----------------------------------------------------------------------
// Compilation cache
// -----------------------------------------------------------------------

#[test]
fn compilation_cache_stats() {
    let ast = AstService::new(16);
    let cache = CompilationCache::new(8, 8);
    cache.get_or_compile("x * 2", &ast).unwrap();
    cache.get_or_compile("x * 2", &ast).unwrap();
    cache.get_or_compile("y * 2", &ast).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.entries, 2);
    assert!((stats.hit_rate - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn pure_numeric_formulas_land_in_the_numeric_cache() {
    let ast = AstService::new(16);
    let cache = CompilationCache::new(8, 8);
    cache.get_or_compile("x * 2", &ast).unwrap();
    assert!(cache.get_numeric("x * 2").is_some());

    cache.get_or_compile(r#"upper(name)"#, &ast).unwrap();
    assert!(cache.get_numeric(r#"upper(name)"#).is_none());
}

#[test]
fn lru_evicts_oldest() {
    let ast = AstService::new(16);
    let cache = CompilationCache::new(2, 2);
    cache.get_or_compile("1", &ast).unwrap();
    cache.get_or_compile("2", &ast).unwrap();
    cache.get_or_compile("3", &ast).unwrap();
    assert_eq!(cache.stats().entries, 2);
}

// -----------------------------------------------------------------------
// Cache neutrality
// -----------------------------------------------------------------------

#[test]
fn results_match_with_cold_and_warm_caches() {
    let host = MockHost::new().with_state("sensor.a", "7");
    let fixture = EvalFixture::new(host);
    let f = with_entity_var(formula("x * 2 + 1"), "x", "sensor.a");

    let warm = Evaluator::new();
    let first = fixture.eval_with(&warm, &f).unwrap().value;
    let second = fixture.eval_with(&warm, &f).unwrap().value;
    let cold = fixture.eval_with(&Evaluator::new(), &f).unwrap().value;

    assert_eq!(first, Value::Number(15.0));
    assert_eq!(first, second);
    assert_eq!(first, cold);
}

#[test]
fn clearing_caches_changes_no_result() {
    let fixture = EvalFixture::new(MockHost::new().with_state("sensor.a", "7"));
    let f = with_entity_var(formula("x * 3"), "x", "sensor.a");

    let evaluator = Evaluator::new();
    let before = fixture.eval_with(&evaluator, &f).unwrap().value;
    evaluator.clear_caches();
    let after = fixture.eval_with(&evaluator, &f).unwrap().value;
    assert_eq!(before, after);
}

#[test]
fn numeric_fast_path_matches_full_walker() {
    // `m < 15` is pure-numeric and yields a boolean either way.
    let fixture = EvalFixture::new(MockHost::new().with_state("sensor.a", "10"));
    let f = with_entity_var(formula("x < 15"), "x", "sensor.a");
    assert_eq!(fixture.value(&f), Value::Bool(true));

    let g = with_entity_var(formula("x + 1"), "x", "sensor.a");
    assert_eq!(fixture.value(&g), Value::Number(11.0));
}
