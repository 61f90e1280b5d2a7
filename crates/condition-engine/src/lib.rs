//! Runtime condition-evaluation engine.
//!
//! Evaluates a tree of rules and groups — the building blocks of feature
//! flags, attribute-based access control policies, and workflow branch
//! conditions — against a per-request context. A tree is either built
//! programmatically via [`builder`], deserialized from the wire form in
//! [`types`], or a mix of both via [`types::Node::Raw`].
//!
//! ```
//! use condition_engine::{builder::{GroupBuilder, RuleBuilder}, context::EvaluationContext, types::{Conjunction, OperatorType}, value::Value};
//!
//! let tree = GroupBuilder::new(Conjunction::And)
//!     .add_rule(RuleBuilder::new("age", OperatorType::GreaterOrEqual).value(Value::Int(18)).build())
//!     .build_validated()
//!     .unwrap();
//!
//! let ctx = EvaluationContext::new().with_data(serde_json::json!({"age": 21}));
//! let (result, _metrics) = condition_engine::evaluate(&condition_engine::types::Node::Group(tree), &ctx);
//! assert!(result.unwrap());
//! ```

pub mod builder;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod formula;
pub mod kernel;
pub mod regex_cache;
pub mod resolver;
pub mod types;
pub mod validator;
pub mod value;

pub use context::EvaluationContext;
pub use error::{ConditionError, Result};
pub use evaluator::{evaluate, evaluate_with_options, EvaluationMetricsSnapshot, EvaluationOptions};
pub use types::{Group, Node, Rule};
pub use validator::validate_group;
pub use value::Value;
