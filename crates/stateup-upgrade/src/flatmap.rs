//! Decoding of the legacy flat attribute encoding.
//!
//! Nested values are spread over dotted keys: lists and sets carry a `path.#`
//! count and `path.<n>` elements, maps a `path.%` count and `path.<key>`
//! entries, objects `path.<attr>` fields. A missing count means null.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;

use indexmap::IndexMap;
use serde_json::Number;
use stateup_types::{AttrType, AttributePath, TreeValue};
use thiserror::Error;

use crate::state::FlatAttributes;

/// Placeholder written by old tooling for values not known at plan time.
pub const UNKNOWN_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

pub(crate) const LIST_COUNT: &str = "#";
pub(crate) const MAP_COUNT: &str = "%";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("flat attributes must decode into an object, schema declares {found}")]
    RootNotObject { found: &'static str },
    #[error("{path}: entries present but count marker '{key}' is missing")]
    MissingCount { path: AttributePath, key: String },
    #[error("{path}: count marker '{key}' has invalid value '{found}'")]
    InvalidCount {
        path: AttributePath,
        key: String,
        found: String,
    },
    #[error("{path}: element '{segment}' is outside the {count} counted by the marker")]
    UncountedElement {
        path: AttributePath,
        segment: String,
        count: usize,
    },
    #[error("{path}: cannot parse '{found}' as {expected}")]
    InvalidLeaf {
        path: AttributePath,
        expected: &'static str,
        found: String,
    },
}

/// Tree value paired with the schema version its shape corresponds to.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub version: u64,
    pub value: TreeValue,
}

/// Decode `attrs` against the object type `ty`, tagging the result with `version`.
pub fn decode_state(
    attrs: &FlatAttributes,
    ty: &AttrType,
    version: u64,
) -> Result<VersionedValue, DecodeError> {
    let AttrType::Object(fields) = ty else {
        return Err(DecodeError::RootNotObject { found: ty.kind() });
    };
    let value = decode_object_fields(attrs, "", fields, &AttributePath::root())?;
    Ok(VersionedValue { version, value })
}

fn decode_value(
    attrs: &FlatAttributes,
    key: &str,
    ty: &AttrType,
    path: &AttributePath,
) -> Result<TreeValue, DecodeError> {
    match ty {
        AttrType::Bool | AttrType::Number | AttrType::String => match attrs.get(key) {
            None => Ok(TreeValue::Null),
            Some(raw) if raw == UNKNOWN_VALUE => Ok(TreeValue::Null),
            Some(raw) => parse_leaf(raw, ty, path),
        },
        AttrType::List(elem) => {
            let Some(count) = read_count(attrs, key, LIST_COUNT, path)? else {
                return Ok(TreeValue::Null);
            };
            check_list_count(attrs, key, elem, count, path)?;
            let mut items = Vec::new();
            for i in 0..count {
                let item_key = child_key(key, &i.to_string());
                items.push(decode_value(attrs, &item_key, elem, &path.index(i))?);
            }
            Ok(TreeValue::List(items))
        }
        AttrType::Set(elem) => {
            let Some(count) = read_count(attrs, key, LIST_COUNT, path)? else {
                return Ok(TreeValue::Null);
            };
            let mut segments: Vec<&str> = child_segments(attrs, key, LIST_COUNT)
                .into_iter()
                .collect();
            check_count_bound(attrs, key, elem, count, segments.len(), path)?;
            segments.sort_by(|a, b| compare_element_keys(a, b));
            let mut items = Vec::with_capacity(segments.len());
            for (i, segment) in segments.into_iter().enumerate() {
                let item_key = child_key(key, segment);
                items.push(decode_value(attrs, &item_key, elem, &path.index(i))?);
            }
            Ok(TreeValue::List(items))
        }
        AttrType::Map(elem) => {
            if read_count(attrs, key, MAP_COUNT, path)?.is_none() {
                return Ok(TreeValue::Null);
            }
            let prefix = format!("{key}.");
            let entry_keys: Vec<String> = if elem.is_primitive() {
                keys_under(attrs, &prefix)
                    .map(|k| k[prefix.len()..].to_string())
                    .filter(|k| k != MAP_COUNT)
                    .collect()
            } else {
                child_segments(attrs, key, MAP_COUNT)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            };
            let mut entries = IndexMap::with_capacity(entry_keys.len());
            for entry in entry_keys {
                let item_key = child_key(key, &entry);
                let item = decode_value(attrs, &item_key, elem, &path.key(entry.as_str()))?;
                entries.insert(entry, item);
            }
            Ok(TreeValue::Map(entries))
        }
        AttrType::Object(fields) => {
            if keys_under(attrs, &format!("{key}.")).next().is_none() {
                return Ok(TreeValue::Null);
            }
            decode_object_fields(attrs, key, fields, path)
        }
    }
}

fn decode_object_fields(
    attrs: &FlatAttributes,
    key: &str,
    fields: &IndexMap<String, AttrType>,
    path: &AttributePath,
) -> Result<TreeValue, DecodeError> {
    let mut out = IndexMap::with_capacity(fields.len());
    for (name, field_ty) in fields {
        let field_key = child_key(key, name);
        let value = decode_value(attrs, &field_key, field_ty, &path.attr(name.as_str()))?;
        out.insert(name.clone(), value);
    }
    Ok(TreeValue::Map(out))
}

fn read_count(
    attrs: &FlatAttributes,
    key: &str,
    marker: &str,
    path: &AttributePath,
) -> Result<Option<usize>, DecodeError> {
    let count_key = child_key(key, marker);
    match attrs.get(&count_key) {
        None => {
            if keys_under(attrs, &format!("{key}.")).next().is_some() {
                Err(DecodeError::MissingCount {
                    path: path.clone(),
                    key: count_key,
                })
            } else {
                Ok(None)
            }
        }
        Some(raw) if raw == UNKNOWN_VALUE => Ok(None),
        Some(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| DecodeError::InvalidCount {
                path: path.clone(),
                key: count_key,
                found: raw.clone(),
            }),
    }
}

/// Every element key must be a counted index.
fn check_list_count(
    attrs: &FlatAttributes,
    key: &str,
    elem: &AttrType,
    count: usize,
    path: &AttributePath,
) -> Result<(), DecodeError> {
    let segments = child_segments(attrs, key, LIST_COUNT);
    if let Some(stray) = segments
        .iter()
        .find(|segment| segment.parse::<usize>().map_or(true, |i| i >= count))
    {
        return Err(DecodeError::UncountedElement {
            path: path.clone(),
            segment: stray.to_string(),
            count,
        });
    }
    check_count_bound(attrs, key, elem, count, segments.len(), path)
}

/// A count of primitives must match the elements present. Object elements whose
/// fields are all null leave no keys behind, so their count is only bounded by
/// the size of the input.
fn check_count_bound(
    attrs: &FlatAttributes,
    key: &str,
    elem: &AttrType,
    count: usize,
    present: usize,
    path: &AttributePath,
) -> Result<(), DecodeError> {
    let limit = if elem.is_primitive() {
        present
    } else {
        attrs.len()
    };
    if count > limit {
        return Err(DecodeError::InvalidCount {
            path: path.clone(),
            key: child_key(key, LIST_COUNT),
            found: count.to_string(),
        });
    }
    Ok(())
}

fn parse_leaf(raw: &str, ty: &AttrType, path: &AttributePath) -> Result<TreeValue, DecodeError> {
    let invalid = || DecodeError::InvalidLeaf {
        path: path.clone(),
        expected: ty.kind(),
        found: raw.to_string(),
    };
    match ty {
        AttrType::String => Ok(TreeValue::String(raw.to_string())),
        AttrType::Number => parse_number(raw).map(TreeValue::Number).ok_or_else(invalid),
        AttrType::Bool => match raw {
            "true" | "1" => Ok(TreeValue::Bool(true)),
            "false" | "0" => Ok(TreeValue::Bool(false)),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

/// Parse a number written as text; surrounding whitespace is not accepted.
pub(crate) fn parse_number(raw: &str) -> Option<Number> {
    if raw.is_empty() || raw.trim() != raw {
        return None;
    }
    serde_json::from_str::<Number>(raw).ok()
}

/// All keys strictly below `prefix` (which must end in `.`).
fn keys_under<'a, 'p>(
    attrs: &'a FlatAttributes,
    prefix: &'p str,
) -> impl Iterator<Item = &'a str> {
    attrs
        .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .map(|(k, _)| k.as_str())
        .take_while(move |k| k.starts_with(prefix))
}

/// Distinct first path segments below `key`, excluding the count marker.
fn child_segments<'a>(attrs: &'a FlatAttributes, key: &str, marker: &str) -> BTreeSet<&'a str> {
    let prefix = format!("{key}.");
    keys_under(attrs, &prefix)
        .map(|k| {
            let rest = &k[prefix.len()..];
            rest.split_once('.').map_or(rest, |(head, _)| head)
        })
        .filter(|segment| *segment != marker)
        .collect()
}

/// Numeric element keys sort numerically, anything else lexically after them.
fn compare_element_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

pub(crate) fn child_key(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}
