//! Local state type definitions
//!
//! Defines attribute declarations, change events and watcher identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat name → value mapping used for attribute batches and wire messages
///
/// Ordered so that outbound messages serialize deterministically.
pub type PropertyMap = BTreeMap<String, Value>;

/// Declared kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Boolean,
    Integer,
    Number,
    String,
    /// Any JSON value, including null
    Any,
}

impl ParamKind {
    /// Check whether a value is acceptable for this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::String => value.is_string(),
            ParamKind::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Boolean => "boolean",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::String => "string",
            ParamKind::Any => "any",
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declaration of a single attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: Value,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            default: default.into(),
        }
    }

    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, ParamKind::Boolean, default)
    }

    pub fn integer(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, ParamKind::Integer, default)
    }

    pub fn number(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, ParamKind::Number, default)
    }

    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::new(name, ParamKind::String, default.into())
    }

    pub fn any(name: impl Into<String>, default: Value) -> Self {
        Self::new(name, ParamKind::Any, default)
    }
}

/// A single observed attribute change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChanged {
    pub name: String,
    pub old: Value,
    pub new: Value,
}

/// Identifier of a registered watcher (unique per `LocalState`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(pub(crate) u64);

impl std::fmt::Display for WatcherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "w{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_accepts() {
        assert!(ParamKind::Boolean.accepts(&json!(true)));
        assert!(!ParamKind::Boolean.accepts(&json!(1)));
        assert!(ParamKind::Integer.accepts(&json!(-3)));
        assert!(!ParamKind::Integer.accepts(&json!(1.5)));
        assert!(ParamKind::Number.accepts(&json!(1.5)));
        assert!(ParamKind::Number.accepts(&json!(2)));
        assert!(ParamKind::String.accepts(&json!("x")));
        assert!(ParamKind::Any.accepts(&Value::Null));
    }

    #[test]
    fn test_spec_constructors() {
        let spec = ParamSpec::boolean("a", false);
        assert_eq!(spec.kind, ParamKind::Boolean);
        assert_eq!(spec.default, json!(false));

        let spec = ParamSpec::string("title", "hello");
        assert_eq!(spec.default, json!("hello"));
    }

    #[test]
    fn test_kind_serde() {
        let kind: ParamKind = serde_json::from_str("\"integer\"").unwrap();
        assert_eq!(kind, ParamKind::Integer);
        assert_eq!(kind.to_string(), "integer");
    }
}
