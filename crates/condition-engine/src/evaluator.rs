//! Tree walker: evaluates a validated [`Node`] against an
//! [`EvaluationContext`] under a bounded resource envelope.

use crate::context::EvaluationContext;
use crate::error::{ConditionError, Result};
use crate::formula;
use crate::kernel;
use crate::regex_cache::RegexCache;
use crate::resolver::resolve_path;
use crate::types::{Conjunction, Expression, FunctionCall, Group, Node, OperatorType, Rule, RightItem, RightOperand};
use crate::value::Value;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide regex cache — initialised lazily on first use and shared by
/// every evaluation for the rest of the process's lifetime, so its bounded
/// LRU eviction is actually exercised instead of starting empty every call.
static REGEX_CACHE: Lazy<RegexCache> = Lazy::new(RegexCache::new);

/// Bounds on a single evaluation run. Every default mirrors the values
/// named for the engine's resource envelope.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationOptions {
    pub max_depth: usize,
    pub max_conditions: u64,
    pub timeout: Duration,
    pub regex_timeout: Duration,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_conditions: 1_000,
            timeout: Duration::from_secs(30),
            regex_timeout: Duration::from_millis(100),
        }
    }
}

/// Running counters for a single evaluation, exposed to callers via
/// [`EvaluationMetrics::snapshot`].
pub struct EvaluationMetrics {
    conditions_evaluated: AtomicU64,
    rules_evaluated: AtomicU64,
    groups_evaluated: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
    /// Finalised once, under a short lock, rather than recomputed from
    /// `started_at` on every snapshot call.
    duration: Mutex<Option<Duration>>,
}

/// A point-in-time copy of [`EvaluationMetrics`], safe to log or export.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationMetricsSnapshot {
    pub conditions_evaluated: u64,
    pub rules_evaluated: u64,
    pub groups_evaluated: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl EvaluationMetrics {
    fn new() -> Self {
        Self {
            conditions_evaluated: AtomicU64::new(0),
            rules_evaluated: AtomicU64::new(0),
            groups_evaluated: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
            duration: Mutex::new(None),
        }
    }

    fn record_rule(&self) {
        self.rules_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    fn record_group(&self) {
        self.groups_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_outcome(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counters out, finalizing `elapsed` on first call so
    /// later snapshots of the same evaluation report the same duration.
    pub fn snapshot(&self) -> EvaluationMetricsSnapshot {
        let mut duration = self.duration.lock();
        let elapsed = *duration.get_or_insert_with(|| self.started_at.elapsed());
        EvaluationMetricsSnapshot {
            conditions_evaluated: self.conditions_evaluated.load(Ordering::Relaxed),
            rules_evaluated: self.rules_evaluated.load(Ordering::Relaxed),
            groups_evaluated: self.groups_evaluated.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

struct EvalState<'a> {
    ctx: &'a EvaluationContext,
    options: EvaluationOptions,
    regex_cache: &'a RegexCache,
    metrics: EvaluationMetrics,
}

impl EvalState<'_> {
    fn check_budget(&self, depth: usize) -> Result<()> {
        if depth > self.options.max_depth {
            return Err(ConditionError::MaxDepthExceeded {
                limit: self.options.max_depth,
            });
        }
        if self.metrics.started_at.elapsed() > self.options.timeout {
            return Err(ConditionError::EvaluationTimeout {
                elapsed_ms: self.metrics.started_at.elapsed().as_millis(),
            });
        }
        let seen = self.metrics.conditions_evaluated.fetch_add(1, Ordering::Relaxed) + 1;
        if seen > self.options.max_conditions {
            return Err(ConditionError::ResourceLimitExceeded {
                limit: self.options.max_conditions as usize,
            });
        }
        Ok(())
    }
}

/// Evaluate a tree rooted at `node` against `ctx` with default resource
/// limits. Returns the root outcome (or error) alongside a metrics snapshot
/// that reflects the run either way.
pub fn evaluate(node: &Node, ctx: &EvaluationContext) -> (Result<bool>, EvaluationMetricsSnapshot) {
    evaluate_with_options(node, ctx, EvaluationOptions::default())
}

/// Evaluate a tree rooted at `node` against `ctx` with explicit resource
/// limits. The metrics snapshot is always returned, even when the walk
/// errors out partway through, so a caller can inspect e.g. the error
/// counter without having to catch the error separately.
pub fn evaluate_with_options(
    node: &Node,
    ctx: &EvaluationContext,
    options: EvaluationOptions,
) -> (Result<bool>, EvaluationMetricsSnapshot) {
    let state = EvalState {
        ctx,
        options,
        regex_cache: &REGEX_CACHE,
        metrics: EvaluationMetrics::new(),
    };
    let outcome = walk_node(node, 0, &state);
    if outcome.is_err() {
        state.metrics.record_error();
    }
    (outcome, state.metrics.snapshot())
}

fn walk_node(node: &Node, depth: usize, state: &EvalState) -> Result<bool> {
    state.check_budget(depth)?;
    match node {
        Node::Group(group) => walk_group(group, depth, state),
        Node::Rule(rule) => walk_rule(rule, state),
        Node::Raw(raw) => {
            let coerced = coerce_raw_node(raw)?;
            walk_node(&coerced, depth, state)
        }
    }
}

fn walk_group(group: &Group, depth: usize, state: &EvalState) -> Result<bool> {
    state.metrics.record_group();
    let outcome = if group.is_formula_group() {
        let (result, hit) = formula::eval_bool_tracked(&group.formula, state.ctx)?;
        state.metrics.record_cache_outcome(hit);
        result
    } else {
        match group.conjunction {
            Conjunction::And => {
                let mut result = true;
                for child in &group.children {
                    if !walk_node(child, depth + 1, state)? {
                        result = false;
                        break;
                    }
                }
                result
            }
            Conjunction::Or => {
                let mut result = false;
                for child in &group.children {
                    if walk_node(child, depth + 1, state)? {
                        result = true;
                        break;
                    }
                }
                result
            }
        }
    };
    Ok(outcome != group.not)
}

fn walk_rule(rule: &Rule, state: &EvalState) -> Result<bool> {
    state.metrics.record_rule();
    if rule.is_formula_rule() {
        let (result, hit) = formula::eval_bool_tracked(&rule.formula, state.ctx)?;
        state.metrics.record_cache_outcome(hit);
        return Ok(result);
    }

    let left = resolve_expr(&rule.left, state.ctx)?;

    if rule.op.is_unary() {
        return Ok(match rule.op {
            OperatorType::IsEmpty => kernel::is_empty(&left, false),
            OperatorType::IsNotEmpty => kernel::is_empty(&left, true),
            _ => unreachable!("is_unary() only returns true for IsEmpty/IsNotEmpty"),
        });
    }

    match rule.op {
        OperatorType::Between | OperatorType::NotBetween => {
            let items = resolve_right_list(&rule.right, state.ctx)?;
            let (low, high) = match items.as_slice() {
                [low, high] => (low, high),
                _ => {
                    return Err(ConditionError::InvalidOperator {
                        node_id: rule.id.clone(),
                        reason: "between requires exactly two right values".into(),
                    })
                }
            };
            Ok(kernel::between(&left, low, high, rule.op == OperatorType::NotBetween))
        }
        OperatorType::SelectAnyIn | OperatorType::SelectNotAnyIn => {
            let items = resolve_right_list(&rule.right, state.ctx)?;
            Ok(kernel::select_any_in(
                &left,
                &items,
                rule.op == OperatorType::SelectNotAnyIn,
            ))
        }
        OperatorType::MatchRegexp => {
            let right = resolve_right_single(&rule.right, state.ctx)?;
            let (hits_before, misses_before) = state.regex_cache.hit_miss_counts();
            let outcome = kernel::match_regexp(state.regex_cache, &left, &right, state.options.regex_timeout);
            let (hits_after, misses_after) = state.regex_cache.hit_miss_counts();
            if hits_after > hits_before {
                state.metrics.record_cache_outcome(true);
            } else if misses_after > misses_before {
                state.metrics.record_cache_outcome(false);
            }
            outcome
        }
        _ => {
            let right = resolve_right_single(&rule.right, state.ctx)?;
            Ok(match rule.op {
                OperatorType::Equal => kernel::equal(&left, &right),
                OperatorType::NotEqual => !kernel::equal(&left, &right),
                OperatorType::Less
                | OperatorType::LessOrEqual
                | OperatorType::Greater
                | OperatorType::GreaterOrEqual => kernel::order(&left, &right, rule.op),
                OperatorType::Contains => kernel::contains(&left, &right),
                OperatorType::NotContains => !kernel::contains(&left, &right),
                OperatorType::StartsWith => kernel::starts_with(&left, &right),
                OperatorType::EndsWith => kernel::ends_with(&left, &right),
                other => {
                    return Err(ConditionError::InvalidOperator {
                        node_id: rule.id.clone(),
                        reason: format!("operator {other:?} has no binary evaluation rule"),
                    })
                }
            })
        }
    }
}

fn resolve_expr(expr: &Expression, ctx: &EvaluationContext) -> Result<Value> {
    match expr {
        Expression::Value { value } => Ok(value.clone()),
        Expression::Field { field } => resolve_path(ctx.data(), field).cloned(),
        Expression::Func { func } => call_function(func, ctx),
    }
}

fn call_function(call: &FunctionCall, ctx: &EvaluationContext) -> Result<Value> {
    ctx.call_function(&call.type_name, &call.args)
}

/// A right operand that is a bare literal or a single expression.
fn resolve_right_single(right: &RightOperand, ctx: &EvaluationContext) -> Result<Value> {
    match right {
        RightOperand::Literal(v) => Ok(v.clone()),
        RightOperand::Expr(expr) => resolve_expr(expr, ctx),
        RightOperand::List(items) => {
            // A single-element list is accepted as a single operand — callers
            // that always wrap right-hand values in a list still work.
            match items.as_slice() {
                [item] => resolve_right_item(item, ctx),
                _ => Err(ConditionError::InvalidExpression {
                    reason: "expected a single right-hand value, found a list".into(),
                }),
            }
        }
        RightOperand::None => Err(ConditionError::InvalidExpression {
            reason: "operator requires a right-hand value".into(),
        }),
    }
}

/// A right operand that is a list (`between`'s two bounds, `select_any_in`'s
/// set). Every item in the list resolves independently — whether an item is
/// a literal or an expression is decided per-item by how it deserialized,
/// not by inspecting the first element.
fn resolve_right_list(right: &RightOperand, ctx: &EvaluationContext) -> Result<Vec<Value>> {
    match right {
        RightOperand::List(items) => items.iter().map(|item| resolve_right_item(item, ctx)).collect(),
        RightOperand::Literal(v) => Ok(vec![v.clone()]),
        RightOperand::Expr(expr) => Ok(vec![resolve_expr(expr, ctx)?]),
        RightOperand::None => Ok(vec![]),
    }
}

fn resolve_right_item(item: &RightItem, ctx: &EvaluationContext) -> Result<Value> {
    match item {
        RightItem::Literal(v) => Ok(v.clone()),
        RightItem::Expr(expr) => resolve_expr(expr, ctx),
    }
}

/// Coerce a raw JSON mapping into a typed [`Node`]. A mapping with a
/// `conjunction` key is a group; one with an `op` key is a rule; anything
/// else is an invalid expression.
pub fn coerce_raw_node(raw: &serde_json::Value) -> Result<Node> {
    let obj = raw.as_object().ok_or_else(|| ConditionError::InvalidExpression {
        reason: "dynamic node is not a JSON object".into(),
    })?;

    if obj.contains_key("conjunction") {
        let group: Group = serde_json::from_value(raw.clone())
            .map_err(|e| ConditionError::InvalidExpression { reason: e.to_string() })?;
        return Ok(Node::Group(group));
    }
    if obj.contains_key("op") || obj.contains_key("if") {
        let rule: Rule = serde_json::from_value(raw.clone())
            .map_err(|e| ConditionError::InvalidExpression { reason: e.to_string() })?;
        return Ok(Node::Rule(rule));
    }

    Err(ConditionError::InvalidExpression {
        reason: "dynamic node has neither a conjunction nor an op field".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RightItem;

    fn field_rule(id: &str, field: &str, op: OperatorType, right: RightOperand) -> Node {
        Node::Rule(Rule {
            id: id.into(),
            left: Expression::field(field),
            op,
            right,
            formula: String::new(),
        })
    }

    fn ctx_with(json: serde_json::Value) -> EvaluationContext {
        EvaluationContext::new().with_data(json)
    }

    #[test]
    fn single_rule_equal() {
        let ctx = ctx_with(serde_json::json!({"role": "admin"}));
        let node = field_rule(
            "r1",
            "role",
            OperatorType::Equal,
            RightOperand::Literal(Value::from("admin")),
        );
        let (result, _) = evaluate(&node, &ctx);
        assert!(result.unwrap());
    }

    #[test]
    fn and_group_short_circuits() {
        let ctx = ctx_with(serde_json::json!({"age": 15, "role": "admin"}));
        let group = Node::Group(Group {
            id: "g1".into(),
            conjunction: Conjunction::And,
            not: false,
            children: vec![
                field_rule(
                    "r1",
                    "age",
                    OperatorType::GreaterOrEqual,
                    RightOperand::Literal(Value::Int(18)),
                ),
                field_rule(
                    "r2",
                    "role",
                    OperatorType::Equal,
                    RightOperand::Literal(Value::from("admin")),
                ),
            ],
            formula: String::new(),
        });
        let (result, _) = evaluate(&group, &ctx);
        assert!(!result.unwrap());
    }

    #[test]
    fn group_not_negates_outcome() {
        let ctx = ctx_with(serde_json::json!({"role": "admin"}));
        let group = Node::Group(Group {
            id: "g1".into(),
            conjunction: Conjunction::And,
            not: true,
            children: vec![field_rule(
                "r1",
                "role",
                OperatorType::Equal,
                RightOperand::Literal(Value::from("admin")),
            )],
            formula: String::new(),
        });
        let (result, _) = evaluate(&group, &ctx);
        assert!(!result.unwrap());
    }

    #[test]
    fn between_uses_two_item_list() {
        let ctx = ctx_with(serde_json::json!({"age": 30}));
        let node = field_rule(
            "r1",
            "age",
            OperatorType::Between,
            RightOperand::List(vec![
                RightItem::Literal(Value::Int(18)),
                RightItem::Literal(Value::Int(65)),
            ]),
        );
        let (result, _) = evaluate(&node, &ctx);
        assert!(result.unwrap());
    }

    #[test]
    fn formula_group_overrides_children() {
        let ctx = ctx_with(serde_json::json!({"age": 30}));
        let group = Node::Group(Group {
            id: "g1".into(),
            conjunction: Conjunction::And,
            not: false,
            children: vec![],
            formula: "age >= 18".into(),
        });
        let (result, _) = evaluate(&group, &ctx);
        assert!(result.unwrap());
    }

    #[test]
    fn depth_limit_is_enforced() {
        let ctx = ctx_with(serde_json::json!({}));
        let mut node = field_rule(
            "leaf",
            "x",
            OperatorType::IsEmpty,
            RightOperand::None,
        );
        for i in 0..20 {
            node = Node::Group(Group {
                id: format!("g{i}"),
                conjunction: Conjunction::And,
                not: false,
                children: vec![node],
                formula: String::new(),
            });
        }
        let (result, _) = evaluate(&node, &ctx);
        assert!(matches!(result.unwrap_err(), ConditionError::MaxDepthExceeded { .. }));
    }

    #[test]
    fn raw_node_coerces_to_rule() {
        let raw = serde_json::json!({
            "id": "r1",
            "left": {"type": "field", "field": "role"},
            "op": "equal",
            "right": {"type": "value", "value": "admin"}
        });
        let node = coerce_raw_node(&raw).unwrap();
        assert!(matches!(node, Node::Rule(_)));
    }

    #[test]
    fn raw_node_without_shape_markers_errors() {
        let raw = serde_json::json!({"foo": "bar"});
        assert!(coerce_raw_node(&raw).is_err());
    }

    #[test]
    fn error_counter_increments_once_on_non_boolean_formula() {
        let ctx = ctx_with(serde_json::json!({}));
        let node = Node::Rule(Rule {
            id: "r1".into(),
            left: Expression::literal(Value::Bool(true)),
            op: OperatorType::Equal,
            right: RightOperand::Literal(Value::Bool(true)),
            formula: "1 + 1".into(),
        });

        let (result, metrics) = evaluate(&node, &ctx);
        assert!(matches!(result.unwrap_err(), ConditionError::FormulaEval(_)));
        assert_eq!(metrics.errors, 1);
    }

    #[test]
    fn rules_and_groups_evaluated_are_counted() {
        let ctx = ctx_with(serde_json::json!({"age": 30, "role": "admin"}));
        let group = Node::Group(Group {
            id: "g1".into(),
            conjunction: Conjunction::And,
            not: false,
            children: vec![
                field_rule("r1", "age", OperatorType::GreaterOrEqual, RightOperand::Literal(Value::Int(18))),
                field_rule("r2", "role", OperatorType::Equal, RightOperand::Literal(Value::from("admin"))),
            ],
            formula: String::new(),
        });
        let (result, metrics) = evaluate(&group, &ctx);
        assert!(result.unwrap());
        assert_eq!(metrics.groups_evaluated, 1);
        assert_eq!(metrics.rules_evaluated, 2);
    }

    #[test]
    fn repeated_formula_rule_reports_a_cache_hit() {
        let ctx = ctx_with(serde_json::json!({"age": 30}));
        let node = Node::Rule(Rule {
            id: "r1".into(),
            left: Expression::literal(Value::Bool(true)),
            op: OperatorType::Equal,
            right: RightOperand::Literal(Value::Bool(true)),
            formula: "age >= 18".into(),
        });
        evaluate(&node, &ctx).0.unwrap();
        let (_, metrics) = evaluate(&node, &ctx);
        assert_eq!(metrics.cache_hits, 1);
    }

    #[test]
    fn function_call_expression_invokes_registered_handler() {
        let ctx = EvaluationContext::new()
            .with_data(serde_json::json!({}))
            .with_function("always_true", |_args, _data| Ok(Value::Bool(true)));
        let node = Node::Rule(Rule {
            id: "r1".into(),
            left: Expression::func("always_true", vec![]),
            op: OperatorType::Equal,
            right: RightOperand::Literal(Value::Bool(true)),
            formula: String::new(),
        });
        let (result, _) = evaluate(&node, &ctx);
        assert!(result.unwrap());
    }
}
