//! Rename/Transform table
//!
//! Maps local attribute names to remote property names and back. Entity
//! types may additionally supply a [`Transform`] that coerces values in
//! either direction; the transform always sees names that have already been
//! translated, so overriding it never requires touching the name table.

use crate::error::Result;
use crate::state::PropertyMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable bidirectional name map (local attribute ↔ remote property)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameTable {
    forward: HashMap<String, String>,
    inverse: HashMap<String, String>,
}

impl RenameTable {
    pub fn new<L, R>(pairs: impl IntoIterator<Item = (L, R)>) -> Self
    where
        L: Into<String>,
        R: Into<String>,
    {
        let forward: HashMap<String, String> = pairs
            .into_iter()
            .map(|(l, r)| (l.into(), r.into()))
            .collect();
        // Literal inversion: if two locals share a remote name, the last one wins
        let inverse = forward
            .iter()
            .map(|(l, r)| (r.clone(), l.clone()))
            .collect();
        Self { forward, inverse }
    }

    /// Identity table
    pub fn identity() -> Self {
        Self::default()
    }

    /// Local attribute name → remote property name (identity if unmapped)
    pub fn forward<'a>(&'a self, name: &'a str) -> &'a str {
        self.forward.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Remote property name → local attribute name (identity if unmapped)
    pub fn inverse<'a>(&'a self, name: &'a str) -> &'a str {
        self.inverse.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn to_remote(&self, msg: PropertyMap) -> PropertyMap {
        msg.into_iter()
            .map(|(k, v)| (self.forward(&k).to_string(), v))
            .collect()
    }

    pub fn to_local(&self, msg: PropertyMap) -> PropertyMap {
        msg.into_iter()
            .map(|(k, v)| (self.inverse(&k).to_string(), v))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Value-level coercion between local attributes and remote properties
///
/// Both methods default to identity. Errors indicate an entity-level
/// programming defect and are propagated to the caller of the write.
pub trait Transform: Send + Sync {
    /// Coerce a local value for the remote property `property`
    fn to_remote(&self, _property: &str, value: Value) -> Result<Value> {
        Ok(value)
    }

    /// Coerce a remote value for the local attribute `attribute`
    fn to_local(&self, _attribute: &str, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Transform that leaves values untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {}

/// Name table plus value transform for one entity type
#[derive(Clone)]
pub struct Codec {
    table: Arc<RenameTable>,
    transform: Arc<dyn Transform>,
}

impl Codec {
    pub fn new(table: RenameTable) -> Self {
        Self {
            table: Arc::new(table),
            transform: Arc::new(IdentityTransform),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn table(&self) -> &RenameTable {
        &self.table
    }

    /// Translate local attribute changes into a remote property message
    pub fn process_param_change(&self, msg: PropertyMap) -> Result<PropertyMap> {
        self.table
            .to_remote(msg)
            .into_iter()
            .map(|(k, v)| {
                let v = self.transform.to_remote(&k, v)?;
                Ok((k, v))
            })
            .collect()
    }

    /// Translate remote property changes into local attribute updates
    pub fn process_property_change(&self, msg: PropertyMap) -> Result<PropertyMap> {
        self.table
            .to_local(msg)
            .into_iter()
            .map(|(k, v)| {
                let v = self.transform.to_local(&k, v)?;
                Ok((k, v))
            })
            .collect()
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(RenameTable::identity())
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use proptest::prelude::*;
    use serde_json::json;

    fn msg(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_forward_and_inverse() {
        let table = RenameTable::new([("value", "active"), ("name", "title")]);
        assert_eq!(table.forward("value"), "active");
        assert_eq!(table.inverse("active"), "value");
        assert_eq!(table.forward("other"), "other");
        assert_eq!(table.inverse("other"), "other");
    }

    #[test]
    fn test_message_translation() {
        let table = RenameTable::new([("name", "title")]);
        let remote = table.to_remote(msg(&[("name", json!("A")), ("value", json!(1))]));
        assert_eq!(remote, msg(&[("title", json!("A")), ("value", json!(1))]));
        assert_eq!(table.to_local(remote), msg(&[("name", json!("A")), ("value", json!(1))]));
    }

    /// Percent on the local side, fraction on the remote side
    struct PercentTransform;

    impl Transform for PercentTransform {
        fn to_remote(&self, property: &str, value: Value) -> Result<Value> {
            if property != "fraction" {
                return Ok(value);
            }
            let pct = value.as_f64().ok_or_else(|| SyncError::Transform {
                name: property.to_string(),
                reason: "not a number".to_string(),
            })?;
            Ok(json!(pct / 100.0))
        }

        fn to_local(&self, attribute: &str, value: Value) -> Result<Value> {
            if attribute != "percent" {
                return Ok(value);
            }
            Ok(json!(value.as_f64().unwrap_or_default() * 100.0))
        }
    }

    #[test]
    fn test_transform_composes_with_rename() {
        let codec = Codec::new(RenameTable::new([("percent", "fraction")]))
            .with_transform(Arc::new(PercentTransform));

        let remote = codec
            .process_param_change(msg(&[("percent", json!(50.0))]))
            .unwrap();
        assert_eq!(remote, msg(&[("fraction", json!(0.5))]));

        let local = codec
            .process_property_change(msg(&[("fraction", json!(0.25))]))
            .unwrap();
        assert_eq!(local, msg(&[("percent", json!(25.0))]));
    }

    #[test]
    fn test_transform_error_propagates() {
        let codec = Codec::new(RenameTable::new([("percent", "fraction")]))
            .with_transform(Arc::new(PercentTransform));
        let err = codec
            .process_param_change(msg(&[("percent", json!("half"))]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Transform { name, .. } if name == "fraction"));
    }

    proptest! {
        #[test]
        fn prop_single_entry_round_trips(local in "[a-z_]{1,12}", remote in "[a-z_]{1,12}") {
            let table = RenameTable::new([(local.clone(), remote.clone())]);
            prop_assert_eq!(table.inverse(table.forward(&local)), local.as_str());
        }

        #[test]
        fn prop_unmapped_name_is_identity(name in "[a-z]{1,12}") {
            let table = RenameTable::new([("_mapped", "_remote")]);
            prop_assert_eq!(table.forward(&name), name.as_str());
            prop_assert_eq!(table.inverse(&name), name.as_str());
        }
    }
}
