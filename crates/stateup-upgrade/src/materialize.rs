use serde_json::Value;
use stateup_types::{AttrType, AttributePath, TreeValue, ValueTypeError, validate_value};
use thiserror::Error;

use crate::flatmap::{LIST_COUNT, MAP_COUNT, child_key};
use crate::state::{FlatAttributes, PersistedState, SCHEMA_VERSION_KEY};
use crate::version::ResolvedVersion;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("upgraded value must be an object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("upgraded value does not match the current schema: {0}")]
    NonConforming(#[from] ValueTypeError),
    #[error("{path}: map key '{key}' cannot be written as a flat attribute")]
    UnencodableKey { path: AttributePath, key: String },
}

/// Flatten `value` back into the legacy dotted-key encoding. Nulls are omitted;
/// empty collections keep their `#`/`%` count.
pub fn flatten_value(value: &TreeValue, ty: &AttrType) -> Result<FlatAttributes, MaterializeError> {
    if !matches!(value, TreeValue::Map(_)) {
        return Err(MaterializeError::NotAnObject { found: value.kind() });
    }
    validate_value(value, ty)?;
    let mut out = FlatAttributes::new();
    flatten_into(&mut out, "", value, ty, &AttributePath::root())?;
    Ok(out)
}

fn flatten_into(
    out: &mut FlatAttributes,
    key: &str,
    value: &TreeValue,
    ty: &AttrType,
    path: &AttributePath,
) -> Result<(), MaterializeError> {
    match (value, ty) {
        (TreeValue::Null, _) => {}
        (TreeValue::List(items), AttrType::List(elem) | AttrType::Set(elem)) => {
            out.insert(child_key(key, LIST_COUNT), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                flatten_into(out, &child_key(key, &i.to_string()), item, elem, &path.index(i))?;
            }
        }
        (TreeValue::Map(entries), AttrType::Map(elem)) => {
            out.insert(child_key(key, MAP_COUNT), entries.len().to_string());
            for (entry, item) in entries {
                // Entries of nested values are split at the first dot on decode.
                if entry == MAP_COUNT || (!elem.is_primitive() && entry.contains('.')) {
                    return Err(MaterializeError::UnencodableKey {
                        path: path.clone(),
                        key: entry.clone(),
                    });
                }
                flatten_into(out, &child_key(key, entry), item, elem, &path.key(entry.as_str()))?;
            }
        }
        (TreeValue::Map(entries), AttrType::Object(fields)) => {
            for (name, field_ty) in fields {
                if let Some(item) = entries.get(name) {
                    flatten_into(out, &child_key(key, name), item, field_ty, &path.attr(name.as_str()))?;
                }
            }
        }
        (scalar, _) => {
            if let Some(text) = scalar.scalar_text() {
                out.insert(key.to_string(), text);
            }
        }
    }
    Ok(())
}

/// Build the new persisted state: flattened attributes, the original id, and
/// the original meta with `schema_version` stamped to `final_version` when the
/// input recorded a version or the version is non-zero.
pub fn materialize_state(
    value: &TreeValue,
    ty: &AttrType,
    original: &PersistedState,
    resolved: ResolvedVersion,
    final_version: u64,
) -> Result<PersistedState, MaterializeError> {
    let attributes = flatten_value(value, ty)?;
    let mut meta = original.meta.clone();
    if resolved.explicit || final_version > 0 {
        log::debug!("'{}': stamping schema version {final_version}", original.id);
        meta.insert(
            SCHEMA_VERSION_KEY.to_string(),
            Value::String(final_version.to_string()),
        );
    }
    Ok(PersistedState {
        id: original.id.clone(),
        attributes,
        meta,
    })
}
