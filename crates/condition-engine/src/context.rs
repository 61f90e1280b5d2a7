//! Evaluation context: the data bag, function registry, and field registry
//! a tree is evaluated against.
//!
//! Mirrors the builder-style fluent construction the platform's config types
//! use (see `DatabaseConfig` in the cache crate) rather than a constructor
//! with a dozen positional arguments.

use crate::error::{ConditionError, Result};
use crate::types::{FieldDefinition, FunctionDefinition};
use crate::value::Value;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered function handler: takes the call's literal arguments and
/// the context's data bag, returns a [`Value`] or an error.
pub type FunctionHandler = Arc<dyn Fn(&[Value], &Value) -> Result<Value> + Send + Sync>;

/// Everything a single evaluation run needs beyond the condition tree
/// itself: the data bag fields resolve against, the functions calls may
/// invoke, and optional metadata describing both for UI-facing validation.
#[derive(Clone)]
pub struct EvaluationContext {
    data: Value,
    functions: Arc<RwLock<HashMap<String, FunctionHandler>>>,
    field_defs: Arc<RwLock<HashMap<String, FieldDefinition>>>,
    function_defs: Arc<RwLock<HashMap<String, FunctionDefinition>>>,
    now: DateTime<Utc>,
}

impl EvaluationContext {
    /// Start building a context with an empty data bag and no registered
    /// functions.
    pub fn new() -> Self {
        Self {
            data: Value::Map(HashMap::new()),
            functions: Arc::new(RwLock::new(HashMap::new())),
            field_defs: Arc::new(RwLock::new(HashMap::new())),
            function_defs: Arc::new(RwLock::new(HashMap::new())),
            now: Utc::now(),
        }
    }

    /// Replace the data bag wholesale. Accepts anything convertible into a
    /// [`Value`] — typically a `serde_json::Value` produced by serializing
    /// a caller's struct.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// Pin the evaluation clock to a fixed instant instead of the moment
    /// the context was built. Lets formula/operator code that reads `now`
    /// stay deterministic in tests.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Register a callable function under `type_name`.
    pub fn with_function(
        self,
        type_name: impl Into<String>,
        handler: impl Fn(&[Value], &Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.functions
            .write()
            .insert(type_name.into(), Arc::new(handler));
        self
    }

    /// Attach field metadata (for UI-facing introspection; not consulted
    /// during evaluation itself).
    pub fn with_field_definition(self, def: FieldDefinition) -> Self {
        self.field_defs.write().insert(def.name.clone(), def);
        self
    }

    /// Attach function metadata (for UI-facing introspection).
    pub fn with_function_definition(self, def: FunctionDefinition) -> Self {
        self.function_defs.write().insert(def.type_name.clone(), def);
        self
    }

    /// The data bag fields resolve against.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The evaluation clock — either pinned via [`Self::with_now`] or the
    /// instant the context was constructed.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Invoke a registered function by type name.
    pub fn call_function(&self, type_name: &str, args: &[Value]) -> Result<Value> {
        let handler = self
            .functions
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| ConditionError::FunctionNotFound {
                name: type_name.to_string(),
            })?;
        handler(args, &self.data).map_err(|e| match e {
            ConditionError::FunctionError { .. } => e,
            other => ConditionError::FunctionError {
                name: type_name.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Registered field definitions, keyed by name.
    pub fn field_definitions(&self) -> HashMap<String, FieldDefinition> {
        self.field_defs.read().clone()
    }

    /// Registered function definitions, keyed by type name.
    pub fn function_definitions(&self) -> HashMap<String, FunctionDefinition> {
        self.function_defs.read().clone()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_round_trips() {
        let ctx = EvaluationContext::new().with_data(serde_json::json!({"a": 1}));
        assert_eq!(ctx.data(), &Value::from(serde_json::json!({"a": 1})));
    }

    #[test]
    fn unregistered_function_errors() {
        let ctx = EvaluationContext::new();
        let err = ctx.call_function("missing", &[]).unwrap_err();
        assert!(matches!(err, ConditionError::FunctionNotFound { .. }));
    }

    #[test]
    fn registered_function_is_invoked_with_args_and_data() {
        let ctx = EvaluationContext::new()
            .with_data(serde_json::json!({"threshold": 10}))
            .with_function("double", |args, _data| {
                let n = args.first().and_then(Value::as_f64).unwrap_or(0.0);
                Ok(Value::Float(n * 2.0))
            });
        let result = ctx.call_function("double", &[Value::Int(21)]).unwrap();
        assert_eq!(result, Value::Float(42.0));
    }

    #[test]
    fn function_error_is_wrapped_with_name() {
        let ctx = EvaluationContext::new().with_function("boom", |_args, _data| {
            Err(ConditionError::validation("n/a", "deliberate failure"))
        });
        let err = ctx.call_function("boom", &[]).unwrap_err();
        match err {
            ConditionError::FunctionError { name, .. } => assert_eq!(name, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pinned_now_is_stable() {
        let fixed = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ctx = EvaluationContext::new().with_now(fixed);
        assert_eq!(ctx.now(), fixed);
    }
}
