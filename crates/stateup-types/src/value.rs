use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// In-flight representation of a resource's attributes while it moves through the
/// upgrade pipeline. Serializes to and from plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<TreeValue>),
    Map(IndexMap<String, TreeValue>),
}

impl TreeValue {
    /// Human-readable kind string used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TreeValue::Null => "null",
            TreeValue::Bool(_) => "bool",
            TreeValue::Number(_) => "number",
            TreeValue::String(_) => "string",
            TreeValue::List(_) => "list",
            TreeValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TreeValue::Null)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            TreeValue::Bool(_) | TreeValue::Number(_) | TreeValue::String(_)
        )
    }

    /// Convenience helper to build a map from field/value pairs.
    pub fn map(fields: impl IntoIterator<Item = (impl Into<String>, TreeValue)>) -> Self {
        let mut map = IndexMap::new();
        for (key, value) in fields.into_iter() {
            map.insert(key.into(), value);
        }
        TreeValue::Map(map)
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, TreeValue>> {
        match self {
            TreeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, TreeValue>> {
        match self {
            TreeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TreeValue]> {
        match self {
            TreeValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TreeValue::String(text) => Some(text),
            _ => None,
        }
    }

    /// Look up a key on a map value; `None` for every other kind.
    pub fn get(&self, key: &str) -> Option<&TreeValue> {
        self.as_map()?.get(key)
    }

    /// Render a scalar the way the flat attribute encoding stores it.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            TreeValue::Bool(b) => Some(b.to_string()),
            TreeValue::Number(n) => Some(n.to_string()),
            TreeValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl From<bool> for TreeValue {
    fn from(value: bool) -> Self {
        TreeValue::Bool(value)
    }
}

impl From<i64> for TreeValue {
    fn from(value: i64) -> Self {
        TreeValue::Number(value.into())
    }
}

impl From<u64> for TreeValue {
    fn from(value: u64) -> Self {
        TreeValue::Number(value.into())
    }
}

impl From<String> for TreeValue {
    fn from(value: String) -> Self {
        TreeValue::String(value)
    }
}

impl From<&str> for TreeValue {
    fn from(value: &str) -> Self {
        TreeValue::String(value.to_owned())
    }
}

impl From<Vec<TreeValue>> for TreeValue {
    fn from(value: Vec<TreeValue>) -> Self {
        TreeValue::List(value)
    }
}

impl From<IndexMap<String, TreeValue>> for TreeValue {
    fn from(value: IndexMap<String, TreeValue>) -> Self {
        TreeValue::Map(value)
    }
}
