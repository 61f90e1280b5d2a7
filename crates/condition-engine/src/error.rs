//! Error types for the condition-evaluation engine.
//!
//! We use `thiserror` for `Display`/`Error` impls, matching the style of the
//! rest of the platform's Rust crates. `ConditionError` is the unified error
//! type returned by validation, resolution, and evaluation.

use thiserror::Error;

/// Result type alias for condition-engine operations.
pub type Result<T> = std::result::Result<T, ConditionError>;

/// Error kinds produced by the condition-evaluation engine.
///
/// Variants map 1:1 onto the error *kinds* the engine's callers are expected
/// to distinguish (validation defects, missing data, resource-envelope
/// breaches, regex/formula safety limits).
#[derive(Debug, Error)]
pub enum ConditionError {
    /// Structural defect found during validation.
    #[error("validation failed for node {node_id}: {reason}")]
    Validation {
        /// Identifier of the offending rule/group.
        node_id: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The resolver could not walk a dotted path to completion.
    #[error("field not found: {path}")]
    FieldNotFound {
        /// The dotted path that failed to resolve.
        path: String,
    },

    /// A field path passed through a `null`/`nil` intermediate segment.
    #[error("nil value at {prefix}")]
    NilIntermediate {
        /// The path prefix at which a nil value was encountered.
        prefix: String,
    },

    /// A referenced function name has no registered handler.
    #[error("function not found: {name}")]
    FunctionNotFound {
        /// The unregistered function type name.
        name: String,
    },

    /// An operator is unknown, or used with the wrong operand arity.
    #[error("invalid operator on node {node_id}: {reason}")]
    InvalidOperator {
        /// Identifier of the offending rule.
        node_id: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A dynamic (raw-mapping) node did not conform to a Rule or Group shape.
    #[error("invalid expression: {reason}")]
    InvalidExpression {
        /// Human-readable reason.
        reason: String,
    },

    /// Recursion depth exceeded the configured maximum.
    #[error("max depth exceeded: limit {limit}")]
    MaxDepthExceeded {
        /// The configured depth limit that was breached.
        limit: usize,
    },

    /// The per-evaluation node-visit budget was exhausted.
    #[error("resource limit exceeded: visited more than {limit} conditions")]
    ResourceLimitExceeded {
        /// The configured condition-count limit that was breached.
        limit: usize,
    },

    /// The evaluation's wall-clock budget, or caller cancellation, fired.
    #[error("evaluation timeout after {elapsed_ms}ms")]
    EvaluationTimeout {
        /// Milliseconds elapsed before the timeout/cancellation fired.
        elapsed_ms: u128,
    },

    /// A single regex match exceeded its per-call wall-clock budget.
    #[error("regex timeout: pattern did not complete within {limit_ms}ms")]
    RegexTimeout {
        /// The configured per-match timeout that was breached.
        limit_ms: u64,
    },

    /// A regex pattern exceeded the configured length cap.
    #[error("pattern too complex: {len} bytes exceeds maximum {max}")]
    RegexComplexity {
        /// Length of the offending pattern in bytes.
        len: usize,
        /// Configured maximum pattern length.
        max: usize,
    },

    /// A regex pattern failed to compile.
    #[error("invalid regex pattern: {0}")]
    RegexInvalid(String),

    /// A formula string exceeded the configured length cap.
    #[error("formula complexity: {len} characters exceeds maximum {max}")]
    FormulaComplexity {
        /// Length of the offending formula in characters.
        len: usize,
        /// Configured maximum formula length.
        max: usize,
    },

    /// A formula failed to compile.
    #[error("formula compile error: {0}")]
    FormulaCompile(String),

    /// A formula executed but produced a non-boolean / errored result.
    #[error("formula evaluation error: {0}")]
    FormulaEval(String),

    /// A function handler returned an error.
    #[error("function '{name}' failed: {reason}")]
    FunctionError {
        /// Name of the function that failed.
        name: String,
        /// Human-readable reason.
        reason: String,
    },
}

impl ConditionError {
    /// Attach a node identifier to a validation-shaped error, building a
    /// [`ConditionError::Validation`] from a bare reason string.
    pub fn validation(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ConditionError::Validation {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}
