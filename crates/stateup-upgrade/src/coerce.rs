use indexmap::IndexMap;
use stateup_types::{AttrType, AttributePath, Block, NestedBlock, NestingMode, TreeValue};
use thiserror::Error;

use crate::flatmap::parse_number;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{path}: cannot use {actual} where {expected} is required")]
pub struct CoercionError {
    pub path: AttributePath,
    pub expected: String,
    pub actual: String,
}

impl CoercionError {
    fn new(path: &AttributePath, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            path: path.clone(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Reshape `value` so it matches `block` exactly: every declared attribute and
/// block present (null when unknown), scalars converted to their declared kind,
/// and nested blocks in the collection shape their nesting mode requires.
pub fn coerce_block(value: TreeValue, block: &Block) -> Result<TreeValue, CoercionError> {
    coerce_block_at(value, block, &AttributePath::root())
}

fn coerce_block_at(
    value: TreeValue,
    block: &Block,
    path: &AttributePath,
) -> Result<TreeValue, CoercionError> {
    let mut entries = match unwrap_single(value, path)? {
        TreeValue::Null => IndexMap::new(),
        TreeValue::Map(entries) => entries,
        other => return Err(CoercionError::new(path, "object", other.kind())),
    };

    let mut out = IndexMap::with_capacity(block.attributes.len() + block.block_types.len());
    for (name, attr) in &block.attributes {
        let raw = entries.shift_remove(name).unwrap_or_default();
        let item = coerce_value_at(raw, &attr.ty, &path.attr(name.as_str()))?;
        out.insert(name.clone(), item);
    }
    for (name, nested) in &block.block_types {
        let raw = entries.shift_remove(name).unwrap_or_default();
        let item = coerce_nested(raw, nested, &path.attr(name.as_str()))?;
        out.insert(name.clone(), item);
    }
    if let Some((extra, _)) = entries.into_iter().next() {
        return Err(CoercionError::new(
            &path.attr(extra.as_str()),
            "a declared attribute",
            "unsupported attribute",
        ));
    }
    Ok(TreeValue::Map(out))
}

fn coerce_nested(
    value: TreeValue,
    nested: &NestedBlock,
    path: &AttributePath,
) -> Result<TreeValue, CoercionError> {
    match nested.nesting {
        NestingMode::Single => match unwrap_single(value, path)? {
            TreeValue::Null => Ok(TreeValue::Null),
            other => coerce_block_at(other, &nested.block, path),
        },
        NestingMode::Group => coerce_block_at(value, &nested.block, path),
        NestingMode::List | NestingMode::Set => {
            let items = match value {
                TreeValue::Null => return Ok(TreeValue::Null),
                TreeValue::List(items) => items,
                TreeValue::Map(_) => vec![value],
                other => return Err(CoercionError::new(path, "list of blocks", other.kind())),
            };
            if nested.max_items > 0 && items.len() as u64 > nested.max_items {
                return Err(CoercionError::new(
                    path,
                    format!("at most {} block(s)", nested.max_items),
                    format!("{} blocks", items.len()),
                ));
            }
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(coerce_block_at(item, &nested.block, &path.index(i))?);
            }
            if nested.nesting == NestingMode::Set {
                dedup_in_place(&mut out);
            }
            Ok(TreeValue::List(out))
        }
        NestingMode::Map => match value {
            TreeValue::Null => Ok(TreeValue::Null),
            TreeValue::Map(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, item) in entries {
                    let item = coerce_block_at(item, &nested.block, &path.key(key.as_str()))?;
                    out.insert(key, item);
                }
                Ok(TreeValue::Map(out))
            }
            other => Err(CoercionError::new(path, "map of blocks", other.kind())),
        },
    }
}

/// Reshape `value` to match the attribute type `ty`.
pub fn coerce_value(value: TreeValue, ty: &AttrType) -> Result<TreeValue, CoercionError> {
    coerce_value_at(value, ty, &AttributePath::root())
}

fn coerce_value_at(
    value: TreeValue,
    ty: &AttrType,
    path: &AttributePath,
) -> Result<TreeValue, CoercionError> {
    if value.is_null() {
        return Ok(TreeValue::Null);
    }
    match ty {
        AttrType::Bool | AttrType::Number | AttrType::String => coerce_scalar(value, ty, path),
        AttrType::List(elem) | AttrType::Set(elem) => {
            let items = match value {
                TreeValue::List(items) => items,
                single => vec![single],
            };
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(coerce_value_at(item, elem, &path.index(i))?);
            }
            if matches!(ty, AttrType::Set(_)) {
                dedup_in_place(&mut out);
            }
            Ok(TreeValue::List(out))
        }
        AttrType::Map(elem) => {
            let TreeValue::Map(entries) = value else {
                return Err(CoercionError::new(path, "map", value.kind()));
            };
            let mut out = IndexMap::with_capacity(entries.len());
            for (key, item) in entries {
                let item = coerce_value_at(item, elem, &path.key(key.as_str()))?;
                out.insert(key, item);
            }
            Ok(TreeValue::Map(out))
        }
        AttrType::Object(fields) => {
            let mut entries = match unwrap_single(value, path)? {
                TreeValue::Null => return Ok(TreeValue::Null),
                TreeValue::Map(entries) => entries,
                other => return Err(CoercionError::new(path, "object", other.kind())),
            };
            let mut out = IndexMap::with_capacity(fields.len());
            for (name, field_ty) in fields {
                let raw = entries.shift_remove(name).unwrap_or_default();
                let item = coerce_value_at(raw, field_ty, &path.attr(name.as_str()))?;
                out.insert(name.clone(), item);
            }
            if let Some((extra, _)) = entries.into_iter().next() {
                return Err(CoercionError::new(
                    &path.attr(extra.as_str()),
                    "a declared attribute",
                    "unsupported attribute",
                ));
            }
            Ok(TreeValue::Map(out))
        }
    }
}

fn coerce_scalar(
    value: TreeValue,
    ty: &AttrType,
    path: &AttributePath,
) -> Result<TreeValue, CoercionError> {
    let mismatch = |value: &TreeValue| CoercionError::new(path, ty.kind(), value.kind());
    match (ty, value) {
        (AttrType::String, TreeValue::String(s)) => Ok(TreeValue::String(s)),
        (AttrType::String, TreeValue::Bool(b)) => Ok(TreeValue::String(b.to_string())),
        (AttrType::String, TreeValue::Number(n)) => Ok(TreeValue::String(n.to_string())),
        (AttrType::Number, TreeValue::Number(n)) => Ok(TreeValue::Number(n)),
        (AttrType::Number, TreeValue::String(s)) => match parse_number(&s) {
            Some(n) => Ok(TreeValue::Number(n)),
            None => Err(mismatch(&TreeValue::String(s))),
        },
        (AttrType::Bool, TreeValue::Bool(b)) => Ok(TreeValue::Bool(b)),
        (AttrType::Bool, TreeValue::String(s)) => match s.as_str() {
            "true" | "1" => Ok(TreeValue::Bool(true)),
            "false" | "0" => Ok(TreeValue::Bool(false)),
            _ => Err(CoercionError::new(path, "bool", "string")),
        },
        (_, value) => Err(mismatch(&value)),
    }
}

/// A one-element list where a single object is declared is unwrapped; an empty
/// list becomes null.
fn unwrap_single(value: TreeValue, path: &AttributePath) -> Result<TreeValue, CoercionError> {
    match value {
        TreeValue::List(mut items) => match items.len() {
            0 => Ok(TreeValue::Null),
            1 => Ok(items.remove(0)),
            n => Err(CoercionError::new(path, "object", format!("list of {n} elements"))),
        },
        other => Ok(other),
    }
}

/// Remove repeated set elements, keeping the first occurrence.
fn dedup_in_place(items: &mut Vec<TreeValue>) {
    let mut kept: Vec<TreeValue> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !kept.contains(&item) {
            kept.push(item);
        }
    }
    *items = kept;
}
