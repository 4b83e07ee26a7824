use crate::model::DID_FIELD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Structured predicate selecting a subset of documents.
///
/// Keys are field names (dotted paths walk nested objects) or the logical
/// operators `$and`, `$or`, `$nor`, `$text`. A field maps either to a
/// literal (equality) or to an operator object such as `{"$gt": 5}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct FilterSpec(pub Map<String, JsonValue>);

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching exactly one identifier: `{did: <did>}`.
    pub fn by_did(did: &str) -> Self {
        let mut m = Map::new();
        m.insert(DID_FIELD.to_string(), JsonValue::String(did.to_string()));
        Self(m)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) -> Option<JsonValue> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.0)
    }
}

impl From<Map<String, JsonValue>> for FilterSpec {
    fn from(m: Map<String, JsonValue>) -> Self {
        Self(m)
    }
}

impl std::fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(&self.0).map_err(|_| std::fmt::Error)?;
        f.write_str(&s)
    }
}
