//! Fluent construction of condition trees.
//!
//! Every builder stamps a fresh UUID onto the node it produces unless the
//! caller supplies one explicitly. Invalid additions are dropped silently
//! at the call site — callers that need to know why should build then call
//! [`GroupBuilder::validate`] explicitly, which surfaces the same error
//! [`crate::validator::validate_group`] would.

use crate::types::{Conjunction, Expression, Group, Node, OperatorType, RightOperand, Rule};
use crate::validator::{validate_group, validate_rule};
use uuid::Uuid;

/// Builds a [`Rule`] field by field.
pub struct RuleBuilder {
    id: String,
    left: Expression,
    op: OperatorType,
    right: RightOperand,
    formula: String,
}

impl RuleBuilder {
    /// Start a new rule comparing `field` with `op`.
    pub fn new(field: impl Into<String>, op: OperatorType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            left: Expression::field(field),
            op,
            right: RightOperand::None,
            formula: String::new(),
        }
    }

    /// Start a new formula rule; `left`/`op`/`right` are ignored once a
    /// formula is set.
    pub fn formula(formula: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            left: Expression::field(""),
            op: OperatorType::Equal,
            right: RightOperand::None,
            formula: formula.into(),
        }
    }

    /// Override the auto-generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Compare against a single literal right-hand value.
    pub fn value(mut self, value: impl Into<crate::value::Value>) -> Self {
        self.right = RightOperand::Literal(value.into());
        self
    }

    /// Compare against another field's resolved value.
    pub fn field_value(mut self, field: impl Into<String>) -> Self {
        self.right = RightOperand::Expr(Expression::field(field));
        self
    }

    /// Supply a list right-hand operand (for `between`, `select_any_in`, ...).
    pub fn values(mut self, values: Vec<crate::value::Value>) -> Self {
        self.right = RightOperand::List(
            values
                .into_iter()
                .map(crate::types::RightItem::Literal)
                .collect(),
        );
        self
    }

    /// Finish building.
    pub fn build(self) -> Rule {
        Rule {
            id: self.id,
            left: self.left,
            op: self.op,
            right: self.right,
            formula: self.formula,
        }
    }
}

/// Builds a [`Group`] by accumulating children.
pub struct GroupBuilder {
    id: String,
    conjunction: Conjunction,
    not: bool,
    children: Vec<Node>,
    formula: String,
}

impl GroupBuilder {
    /// Start a new group under the given conjunction.
    pub fn new(conjunction: Conjunction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conjunction,
            not: false,
            children: Vec::new(),
            formula: String::new(),
        }
    }

    /// Override the auto-generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Negate the group's outcome.
    pub fn negated(mut self) -> Self {
        self.not = true;
        self
    }

    /// Replace the group's children entirely with a formula.
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = formula.into();
        self
    }

    /// Add a rule child. Dropped silently if it fails structural
    /// validation — call [`Self::validate`] on the finished tree to
    /// surface that failure.
    pub fn add_rule(mut self, rule: Rule) -> Self {
        if validate_rule(&rule).is_ok() {
            self.children.push(Node::Rule(rule));
        }
        self
    }

    /// Add a nested group child, likewise dropped silently if invalid.
    pub fn add_group(mut self, group: Group) -> Self {
        if validate_group(&group).is_ok() {
            self.children.push(Node::Group(group));
        }
        self
    }

    /// Finish building without validating.
    pub fn build(self) -> Group {
        Group {
            id: self.id,
            conjunction: self.conjunction,
            not: self.not,
            children: self.children,
            formula: self.formula,
        }
    }

    /// Finish building and validate the resulting tree in one step.
    pub fn build_validated(self) -> crate::error::Result<Group> {
        let group = self.build();
        validate_group(&group)?;
        Ok(group)
    }
}
