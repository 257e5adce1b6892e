//! Typed extras attached to notifications.
//!
//! Extras are string-keyed JSON values. Analyzers stage domain objects and
//! flags here; receivers read them back into typed values. Keeping extras as
//! JSON makes notifications cloneable, replayable and snapshot-friendly.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which default failure details are stored.
pub const EXTRA_ERROR: &str = "error";

/// Ordered key/value payload carried by a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extras(BTreeMap<String, Value>);

impl Extras {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes `value` and stores it under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON.
    pub fn insert<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(value)?;
        self.0.insert(key.into(), json);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON.
    pub fn with<T: Serialize + ?Sized>(
        mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Stores a raw JSON value.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Stores a boolean flag. Infallible builder.
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>, flag: bool) -> Self {
        self.0.insert(key.into(), Value::Bool(flag));
        self
    }

    /// Reads a boolean flag; missing or non-boolean entries read as `false`.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Deserializes the entry under `key`.
    ///
    /// Returns `None` when the key is absent or its value does not match `T`.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.0.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(typed) => Some(typed),
            Err(err) => {
                tracing::debug!(key, error = %err, "extra does not match requested type");
                None
            }
        }
    }

    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copies every entry of `other` into `self`; entries of `other` win on collision.
    pub fn merge(&mut self, other: Extras) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: String,
        size: u32,
    }

    #[test]
    fn typed_values_come_back_typed() {
        let sample = Sample {
            id: "1".to_string(),
            size: 3,
        };
        let extras = Extras::new().with("sample", &sample).unwrap();
        assert_eq!(extras.get::<Sample>("sample"), Some(sample));
    }

    #[test]
    fn mismatched_type_reads_as_none() {
        let extras = Extras::new().with("sample", "just a string").unwrap();
        assert_eq!(extras.get::<Sample>("sample"), None);
        assert_eq!(extras.get::<Sample>("missing"), None);
    }

    #[test]
    fn flags_default_to_false() {
        let extras = Extras::new().with_flag("not_found", true);
        assert!(extras.flag("not_found"));
        assert!(!extras.flag("other"));
    }

    #[test]
    fn merge_prefers_incoming_entries() {
        let mut base = Extras::new().with_flag("a", true).with_flag("b", false);
        base.merge(Extras::new().with_flag("b", true));
        assert_eq!(base.len(), 2);
        assert!(base.flag("b"));
    }

    #[test]
    fn serializes_as_plain_object() {
        let extras = Extras::new().with_flag("not_found", true);
        let json = serde_json::to_string(&extras).unwrap();
        assert_eq!(json, r#"{"not_found":true}"#);
    }
}
