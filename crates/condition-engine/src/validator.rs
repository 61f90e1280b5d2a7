//! Structural validation of a condition tree.
//!
//! Validation is a pure structural pass: it never resolves fields, never
//! calls functions, and never compiles formulas. It only checks tree shape.

use crate::error::{ConditionError, Result};
use crate::types::{Expression, FunctionCall, Group, Node, Rule};

/// Maximum formula length in characters.
pub const MAX_FORMULA_LEN: usize = 10_000;

/// Validate a [`Group`] tree, recursing into every child.
///
/// Returns the first structural defect found, annotated with the offending
/// node's identifier.
pub fn validate_group(group: &Group) -> Result<()> {
    if group.id.is_empty() {
        return Err(ConditionError::validation("<unknown>", "group id is empty"));
    }
    if group.formula.is_empty() && group.children.is_empty() {
        return Err(ConditionError::validation(
            &group.id,
            "group has neither children nor a formula",
        ));
    }
    if group.formula.len() > MAX_FORMULA_LEN {
        return Err(ConditionError::FormulaComplexity {
            len: group.formula.len(),
            max: MAX_FORMULA_LEN,
        });
    }

    for child in &group.children {
        validate_node(child)?;
    }
    Ok(())
}

/// Validate a dynamic [`Node`]: dispatches to group/rule validation, or
/// coerces+validates a raw mapping.
pub fn validate_node(node: &Node) -> Result<()> {
    match node {
        Node::Group(g) => validate_group(g),
        Node::Rule(r) => validate_rule(r),
        Node::Raw(raw) => {
            let coerced = crate::evaluator::coerce_raw_node(raw)?;
            validate_node(&coerced)
        }
    }
}

/// Validate a single [`Rule`].
pub fn validate_rule(rule: &Rule) -> Result<()> {
    if rule.id.is_empty() {
        return Err(ConditionError::validation("<unknown>", "rule id is empty"));
    }

    if rule.is_formula_rule() {
        if rule.formula.len() > MAX_FORMULA_LEN {
            return Err(ConditionError::FormulaComplexity {
                len: rule.formula.len(),
                max: MAX_FORMULA_LEN,
            });
        }
        validate_expression(&rule.left, &rule.id)?;
        return Ok(());
    }

    validate_expression(&rule.left, &rule.id)?;

    let has_right = !matches!(rule.right, crate::types::RightOperand::None);
    if rule.op.is_unary() {
        if has_right {
            return Err(ConditionError::InvalidOperator {
                node_id: rule.id.clone(),
                reason: format!("operator {:?} is unary but a right value was supplied", rule.op),
            });
        }
    } else if !has_right {
        return Err(ConditionError::InvalidOperator {
            node_id: rule.id.clone(),
            reason: format!("operator {:?} requires a right value", rule.op),
        });
    }

    if let crate::types::RightOperand::List(items) = &rule.right {
        if rule.op.requires_exactly_two() && items.len() != 2 {
            return Err(ConditionError::InvalidOperator {
                node_id: rule.id.clone(),
                reason: format!(
                    "operator {:?} requires exactly two right values, got {}",
                    rule.op,
                    items.len()
                ),
            });
        }
        if rule.op.requires_at_least_one_set() && items.is_empty() {
            return Err(ConditionError::InvalidOperator {
                node_id: rule.id.clone(),
                reason: format!("operator {:?} requires at least one right value", rule.op),
            });
        }
    } else if rule.op.requires_exactly_two() {
        return Err(ConditionError::InvalidOperator {
            node_id: rule.id.clone(),
            reason: format!("operator {:?} requires exactly two right values", rule.op),
        });
    }

    Ok(())
}

fn validate_expression(expr: &Expression, node_id: &str) -> Result<()> {
    match expr {
        Expression::Value { .. } => Ok(()),
        Expression::Field { field } => {
            if field.is_empty() {
                Err(ConditionError::InvalidExpression {
                    reason: format!("field expression on node {node_id} has an empty path"),
                })
            } else {
                Ok(())
            }
        }
        Expression::Func { func } => validate_function_call(func, node_id),
    }
}

fn validate_function_call(call: &FunctionCall, node_id: &str) -> Result<()> {
    if call.type_name.is_empty() {
        Err(ConditionError::InvalidExpression {
            reason: format!("function expression on node {node_id} has an empty type name"),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Conjunction, OperatorType, RightOperand};

    fn rule(id: &str, op: OperatorType, right: RightOperand) -> Rule {
        Rule {
            id: id.into(),
            left: Expression::field("x"),
            op,
            right,
            formula: String::new(),
        }
    }

    #[test]
    fn empty_group_id_rejected() {
        let g = Group {
            id: String::new(),
            conjunction: Conjunction::And,
            not: false,
            children: vec![Node::Rule(rule("r1", OperatorType::IsEmpty, RightOperand::None))],
            formula: String::new(),
        };
        assert!(validate_group(&g).is_err());
    }

    #[test]
    fn group_without_children_or_formula_rejected() {
        let g = Group {
            id: "g1".into(),
            conjunction: Conjunction::And,
            not: false,
            children: vec![],
            formula: String::new(),
        };
        assert!(validate_group(&g).is_err());
    }

    #[test]
    fn group_with_formula_only_is_valid() {
        let g = Group {
            id: "g1".into(),
            conjunction: Conjunction::And,
            not: false,
            children: vec![],
            formula: "true".into(),
        };
        assert!(validate_group(&g).is_ok());
    }

    #[test]
    fn unary_operator_with_right_value_rejected() {
        let r = rule(
            "r1",
            OperatorType::IsEmpty,
            RightOperand::Literal(crate::value::Value::Int(1)),
        );
        assert!(validate_rule(&r).is_err());
    }

    #[test]
    fn non_unary_operator_without_right_value_rejected() {
        let r = rule("r1", OperatorType::Equal, RightOperand::None);
        assert!(validate_rule(&r).is_err());
    }

    #[test]
    fn between_requires_exactly_two_items() {
        let r = rule(
            "r1",
            OperatorType::Between,
            RightOperand::List(vec![crate::types::RightItem::Literal(crate::value::Value::Int(1))]),
        );
        assert!(validate_rule(&r).is_err());
    }

    #[test]
    fn select_any_in_rejects_empty_list() {
        let r = rule("r1", OperatorType::SelectAnyIn, RightOperand::List(vec![]));
        assert!(validate_rule(&r).is_err());
    }

    #[test]
    fn formula_over_length_cap_rejected() {
        let mut r = rule("r1", OperatorType::Equal, RightOperand::None);
        r.formula = "a".repeat(MAX_FORMULA_LEN + 1);
        assert!(validate_rule(&r).is_err());
    }

    #[test]
    fn valid_rule_passes() {
        let r = rule(
            "r1",
            OperatorType::Equal,
            RightOperand::Literal(crate::value::Value::Int(1)),
        );
        assert!(validate_rule(&r).is_ok());
    }
}
