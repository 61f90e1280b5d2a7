//! Type model: expressions, rules, groups, and the closed operator set.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// The closed set of comparison/membership/regex operators.
///
/// Any operator outside this set is rejected at validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Between,
    NotBetween,
    IsEmpty,
    IsNotEmpty,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    SelectAnyIn,
    SelectNotAnyIn,
    MatchRegexp,
}

impl OperatorType {
    /// Unary operators require no right operand.
    pub fn is_unary(self) -> bool {
        matches!(self, OperatorType::IsEmpty | OperatorType::IsNotEmpty)
    }

    /// `between`/`not_between` require exactly two right-hand values.
    pub fn requires_exactly_two(self) -> bool {
        matches!(self, OperatorType::Between | OperatorType::NotBetween)
    }

    /// `select_any_in`/`select_not_any_in` require at least one right-hand
    /// value but place no upper bound on the count.
    pub fn requires_at_least_one_set(self) -> bool {
        matches!(
            self,
            OperatorType::SelectAnyIn | OperatorType::SelectNotAnyIn
        )
    }
}

/// A field reference, literal, or function call.
///
/// Field paths are dotted, e.g. `user.profile.email`. Function calls name a
/// registered function and carry literal arguments — function arguments are
/// never themselves expressions, only literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    /// A literal value, carried verbatim (nullable).
    Value {
        #[serde(default)]
        value: Value,
    },
    /// A dotted path into the evaluation context's data bag.
    Field { field: String },
    /// A call to a registered function with literal arguments.
    Func { func: FunctionCall },
}

/// A function call expression: a registered type name plus literal
/// arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Expression {
    /// Construct a literal-value expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Value {
            value: value.into(),
        }
    }

    /// Construct a field-path expression.
    pub fn field(path: impl Into<String>) -> Self {
        Expression::Field { field: path.into() }
    }

    /// Construct a function-call expression.
    pub fn func(type_name: impl Into<String>, args: Vec<Value>) -> Self {
        Expression::Func {
            func: FunctionCall {
                type_name: type_name.into(),
                args,
            },
        }
    }
}

/// The right-hand side of a rule: absent (unary), a single expression, a
/// list of expressions, a single literal, or a list of literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RightOperand {
    /// No right operand — only valid for unary operators.
    None,
    /// A single expression.
    Expr(Expression),
    /// A list of expressions or literals, disambiguated at evaluation time.
    List(Vec<RightItem>),
    /// A single bare literal — normalized at construction time, see
    /// DESIGN.md.
    Literal(Value),
}

impl Default for RightOperand {
    fn default() -> Self {
        RightOperand::None
    }
}

/// One element of a right-hand list: either an expression or a bare
/// literal. The evaluator's "first element is expression-shaped" heuristic
/// decides which interpretation applies to the whole list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RightItem {
    Expr(Expression),
    Literal(Value),
}

/// An atomic comparison: `left op right`, or a boolean formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub left: Expression,
    pub op: OperatorType,
    #[serde(default, skip_serializing_if = "is_none_operand")]
    pub right: RightOperand,
    #[serde(rename = "if", default, skip_serializing_if = "String::is_empty")]
    pub formula: String,
}

fn is_none_operand(op: &RightOperand) -> bool {
    matches!(op, RightOperand::None)
}

impl Rule {
    /// A formula rule ignores `left`/`op`/`right` entirely.
    pub fn is_formula_rule(&self) -> bool {
        !self.formula.is_empty()
    }
}

/// AND/OR conjunction for a [`Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    And,
    Or,
}

/// A child of a [`Group`]: a typed [`Rule`]/[`Group`], or a raw mapping to
/// be coerced at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Group(Group),
    Rule(Rule),
    Raw(serde_json::Value),
}

/// A logical combination of children under AND/OR, optionally negated, or
/// replaced entirely by a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub conjunction: Conjunction,
    #[serde(default)]
    pub not: bool,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(rename = "if", default, skip_serializing_if = "String::is_empty")]
    pub formula: String,
}

impl Group {
    /// A formula group ignores `children` entirely.
    pub fn is_formula_group(&self) -> bool {
        !self.formula.is_empty()
    }
}

/// Registration metadata for a field the evaluation context may expose.
/// Optional — most contexts resolve fields without any registered
/// definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub allowed_value_types: Vec<String>,
    #[serde(default)]
    pub allowed_operators: Vec<OperatorType>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub select_options: Vec<Value>,
}

/// Registration metadata for a callable function. Optional. The handler
/// itself is stored separately in the [`crate::context::EvaluationContext`]
/// registry since `dyn Fn` is not `Serialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    #[serde(rename = "type")]
    pub type_name: String,
    pub return_type: String,
    #[serde(default)]
    pub arg_schema: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unary_operator_classification() {
        assert!(OperatorType::IsEmpty.is_unary());
        assert!(OperatorType::IsNotEmpty.is_unary());
        assert!(!OperatorType::Equal.is_unary());
    }

    #[test]
    fn between_requires_two() {
        assert!(OperatorType::Between.requires_exactly_two());
        assert!(OperatorType::NotBetween.requires_exactly_two());
        assert!(!OperatorType::Equal.requires_exactly_two());
    }

    #[test]
    fn rule_formula_detection() {
        let mut rule = Rule {
            id: "r1".into(),
            left: Expression::field("a"),
            op: OperatorType::Equal,
            right: RightOperand::Literal(Value::Int(1)),
            formula: String::new(),
        };
        assert!(!rule.is_formula_rule());
        rule.formula = "a == 1".into();
        assert!(rule.is_formula_rule());
    }

    #[test]
    fn wire_round_trip_rule() {
        let rule = Rule {
            id: "r1".into(),
            left: Expression::field("user.role"),
            op: OperatorType::Equal,
            right: RightOperand::Expr(Expression::literal("admin")),
            formula: String::new(),
        };
        let json = serde_json::to_string(&rule).unwrap();
        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule, back);
    }
}
