//! Formula subsystem: compiles `if`-style boolean expressions with `rhai`
//! and caches the resulting AST by source text.
//!
//! A compiled AST is immutable and cheap to clone (it's reference-counted
//! internally), so the process-wide cache below lets repeated evaluations
//! of the same formula (e.g. the same rule evaluated per-request) skip
//! parsing entirely.

use crate::context::EvaluationContext;
use crate::error::{ConditionError, Result};
use crate::value::Value;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use rhai::{Engine, Scope, AST};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static AST_CACHE: Lazy<DashMap<String, Arc<AST>>> = Lazy::new(DashMap::new);
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CACHE_MISSES: AtomicU64 = AtomicU64::new(0);

/// Formula cache hit/miss counters, for metrics reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaCacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Snapshot the process-wide formula AST cache counters.
pub fn cache_stats() -> FormulaCacheStats {
    FormulaCacheStats {
        hits: CACHE_HITS.load(Ordering::Relaxed),
        misses: CACHE_MISSES.load(Ordering::Relaxed),
    }
}

/// Number of distinct formulas currently cached.
pub fn cache_len() -> usize {
    AST_CACHE.len()
}

fn build_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depth(64);
    engine.set_max_string_size(64 * 1024);
    engine.set_max_array_size(10_000);
    engine
}

fn compile_cached(engine: &Engine, formula: &str) -> Result<Arc<AST>> {
    compile_cached_tracked(engine, formula).map(|(ast, _hit)| ast)
}

/// Same as [`compile_cached`], but also reports whether the lookup was a
/// cache hit, for callers that need to attribute the hit/miss to a
/// particular evaluation's metrics.
fn compile_cached_tracked(engine: &Engine, formula: &str) -> Result<(Arc<AST>, bool)> {
    if let Some(ast) = AST_CACHE.get(formula) {
        CACHE_HITS.fetch_add(1, Ordering::Relaxed);
        return Ok((ast.clone(), true));
    }

    CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
    let ast = engine
        .compile(formula)
        .map_err(|e| ConditionError::FormulaCompile(e.to_string()))?;
    let ast = Arc::new(ast);
    AST_CACHE.insert(formula.to_string(), ast.clone());
    Ok((ast, false))
}

/// Build the scope a formula executes against: every top-level field of
/// the context's data bag, plus a reserved `now` variable holding the
/// evaluation clock as epoch milliseconds.
fn build_scope(ctx: &EvaluationContext) -> Scope<'static> {
    let mut scope = Scope::new();
    if let Value::Map(fields) = ctx.data() {
        for (key, value) in fields {
            scope.push_dynamic(key.clone(), value.to_dynamic());
        }
    }
    scope.push_constant("now", ctx.now().timestamp_millis());
    scope
}

/// Compile (or fetch) `formula` and evaluate it against `ctx`, requiring a
/// boolean result. A formula that compiles but evaluates to a non-boolean
/// type, or traps at runtime, fails with [`ConditionError::FormulaEval`].
pub fn eval_bool(formula: &str, ctx: &EvaluationContext) -> Result<bool> {
    eval_bool_tracked(formula, ctx).map(|(result, _hit)| result)
}

/// Same as [`eval_bool`], but also reports whether the AST came from the
/// cache, so a caller tracking per-evaluation cache-hit/miss metrics
/// doesn't have to read the process-wide counters itself.
pub fn eval_bool_tracked(formula: &str, ctx: &EvaluationContext) -> Result<(bool, bool)> {
    let engine = build_engine();
    let (ast, hit) = compile_cached_tracked(&engine, formula)?;
    let mut scope = build_scope(ctx);

    let result = engine
        .eval_ast_with_scope::<bool>(&mut scope, &ast)
        .map_err(|e| ConditionError::FormulaEval(e.to_string()))?;
    Ok((result, hit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ctx_with(fields: Vec<(&str, Value)>) -> EvaluationContext {
        let mut m = HashMap::new();
        for (k, v) in fields {
            m.insert(k.to_string(), v);
        }
        EvaluationContext::new().with_data(Value::Map(m))
    }

    #[test]
    fn simple_boolean_literal() {
        let ctx = EvaluationContext::new();
        assert!(eval_bool("true", &ctx).unwrap());
        assert!(!eval_bool("false", &ctx).unwrap());
    }

    #[test]
    fn references_context_fields() {
        let ctx = ctx_with(vec![("age", Value::Int(21))]);
        assert!(eval_bool("age >= 18", &ctx).unwrap());
        assert!(!eval_bool("age >= 65", &ctx).unwrap());
    }

    #[test]
    fn references_now() {
        let ctx = EvaluationContext::new();
        assert!(eval_bool("now > 0", &ctx).unwrap());
    }

    #[test]
    fn non_boolean_result_errors() {
        let ctx = EvaluationContext::new();
        let err = eval_bool("1 + 1", &ctx).unwrap_err();
        assert!(matches!(err, ConditionError::FormulaEval(_)));
    }

    #[test]
    fn compile_error_surfaces() {
        let ctx = EvaluationContext::new();
        let err = eval_bool("this is not rhai (((", &ctx).unwrap_err();
        assert!(matches!(err, ConditionError::FormulaCompile(_)));
    }

    #[test]
    fn repeated_formula_hits_cache() {
        let ctx = EvaluationContext::new();
        let formula = "1 == 1 && true";
        eval_bool(formula, &ctx).unwrap();
        let before = cache_stats().hits;
        eval_bool(formula, &ctx).unwrap();
        assert!(cache_stats().hits > before);
    }
}
