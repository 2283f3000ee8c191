use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Meta key holding the schema version the attributes were written under.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Legacy flat encoding: dotted attribute path to string value.
pub type FlatAttributes = BTreeMap<String, String>;

/// Opaque per-instance metadata carried alongside the attributes.
pub type StateMeta = BTreeMap<String, serde_json::Value>;

/// A resource instance's state as read from and written to durable storage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub id: String,
    #[serde(default)]
    pub attributes: FlatAttributes,
    #[serde(default)]
    pub meta: StateMeta,
}

impl PersistedState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn with_schema_version(self, version: impl Into<String>) -> Self {
        self.with_meta(SCHEMA_VERSION_KEY, serde_json::Value::String(version.into()))
    }
}
