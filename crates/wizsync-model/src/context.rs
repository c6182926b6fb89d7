//! Accumulated step outputs held by the server session

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known context keys
pub mod fields {
    /// Research topic
    pub const ONDERWERP: &str = "onderwerp";
    /// Selected government layer (gemeente, provincie, ...)
    pub const OVERHEIDSLAAG: &str = "overheidslaag";
    /// Selected government entity
    pub const SELECTED_ENTITY: &str = "selectedEntity";
    /// Linked query resource
    pub const QUERY_ID: &str = "queryId";
    /// Website ids chosen for scraping
    pub const SELECTED_WEBSITES: &str = "selectedWebsites";

    /// Every key the draft mirrors, in comparison order
    pub const ALL: [&str; 5] = [
        ONDERWERP,
        OVERHEIDSLAAG,
        SELECTED_ENTITY,
        QUERY_ID,
        SELECTED_WEBSITES,
    ];
}

/// Mapping of accumulated step outputs
///
/// Keys are unique; `null` values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionContext(BTreeMap<String, Value>);

impl SessionContext {
    /// Empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, ignoring explicit nulls
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Whether a non-null value exists for `key`
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Merge `other` into this context, `other` winning on shared keys
    pub fn extend(&mut self, other: &SessionContext) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Non-null entries in key order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Whether no non-null entries exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Whether any well-known field carries a non-empty value
    #[must_use]
    pub fn has_usable_fields(&self) -> bool {
        fields::ALL
            .iter()
            .filter_map(|k| self.get(k))
            .any(|v| !is_blank(v))
    }

    /// String value for `key`
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// String-list value for `key`
    #[must_use]
    pub fn list_field(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }

    /// Research topic
    #[inline]
    #[must_use]
    pub fn onderwerp(&self) -> Option<&str> {
        self.str_field(fields::ONDERWERP)
    }

    /// Government layer
    #[inline]
    #[must_use]
    pub fn overheidslaag(&self) -> Option<&str> {
        self.str_field(fields::OVERHEIDSLAAG)
    }

    /// Linked query id
    #[inline]
    #[must_use]
    pub fn query_id(&self) -> Option<&str> {
        self.str_field(fields::QUERY_ID)
    }
}

impl FromIterator<(String, Value)> for SessionContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Empty string, empty array, empty object
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
