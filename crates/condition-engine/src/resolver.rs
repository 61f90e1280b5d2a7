//! Dotted-path resolver over a context data bag.
//!
//! The data bag here is always a [`Value::Map`]. Reflection-based struct
//! access from a dynamically-typed host collapses to map lookup once data
//! crosses into our `Value` model (structs become maps via `serde_json` on
//! the way in).

use crate::error::{ConditionError, Result};
use crate::value::Value;

/// Resolve a dotted path (e.g. `"user.profile.email"`) against a data bag.
///
/// Walks one segment at a time:
/// - a `Value::Map` node looks the segment up as a key;
/// - any other non-null node is not walkable further and the path fails;
/// - a missing segment fails with [`ConditionError::FieldNotFound`];
/// - a `Null` intermediate fails with [`ConditionError::NilIntermediate`].
///
/// An empty path is rejected.
pub fn resolve_path<'a>(data: &'a Value, path: &str) -> Result<&'a Value> {
    if path.is_empty() {
        return Err(ConditionError::FieldNotFound {
            path: String::new(),
        });
    }

    let mut current = data;
    let mut walked = String::new();

    for (i, segment) in path.split('.').enumerate() {
        if i > 0 {
            walked.push('.');
        }
        walked.push_str(segment);

        if matches!(current, Value::Null) {
            return Err(ConditionError::NilIntermediate {
                prefix: walked_prefix(&walked),
            });
        }

        match current {
            Value::Map(map) => match map.get(segment) {
                Some(next) => current = next,
                None => {
                    return Err(ConditionError::FieldNotFound { path: path.into() });
                }
            },
            _ => {
                return Err(ConditionError::FieldNotFound { path: path.into() });
            }
        }
    }

    Ok(current)
}

/// The "prefix at which a nil was encountered" excludes the segment that
/// was nil itself — it names the last successfully-walked ancestor.
fn walked_prefix(walked: &str) -> String {
    match walked.rsplit_once('.') {
        Some((prefix, _)) => prefix.to_string(),
        None => walked.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        let mut m = HashMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        Value::Map(m)
    }

    #[test]
    fn resolves_nested_path() {
        let data = map(vec![(
            "user",
            map(vec![("profile", map(vec![("email", Value::from("a@b.com"))]))]),
        )]);
        let v = resolve_path(&data, "user.profile.email").unwrap();
        assert_eq!(v, &Value::from("a@b.com"));
    }

    #[test]
    fn missing_segment_errors() {
        let data = map(vec![("user", map(vec![]))]);
        let err = resolve_path(&data, "user.missing").unwrap_err();
        assert!(matches!(err, ConditionError::FieldNotFound { .. }));
    }

    #[test]
    fn nil_intermediate_errors() {
        let data = map(vec![("user", Value::Null)]);
        let err = resolve_path(&data, "user.profile.email").unwrap_err();
        match err {
            ConditionError::NilIntermediate { prefix } => assert_eq!(prefix, "user"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_path_rejected() {
        let data = map(vec![]);
        assert!(resolve_path(&data, "").is_err());
    }

    #[test]
    fn non_map_intermediate_is_field_not_found() {
        let data = map(vec![("user", Value::Int(1))]);
        let err = resolve_path(&data, "user.name").unwrap_err();
        assert!(matches!(err, ConditionError::FieldNotFound { .. }));
    }
}
