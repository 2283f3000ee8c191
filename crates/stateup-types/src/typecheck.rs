use thiserror::Error;

use crate::{AttrType, AttributePath, TreeValue};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueTypeError {
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: AttributePath,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{path}: unexpected object field '{field}'")]
    UnexpectedField { path: AttributePath, field: String },
    #[error("{path}: duplicate set element at index {index}")]
    DuplicateSetElement { path: AttributePath, index: usize },
}

/// Check that `value` has exactly the shape of `ty`. Null is accepted for every
/// type and missing object fields count as null.
pub fn validate_value(value: &TreeValue, ty: &AttrType) -> Result<(), ValueTypeError> {
    validate_at(value, ty, &AttributePath::root())
}

fn validate_at(
    value: &TreeValue,
    ty: &AttrType,
    path: &AttributePath,
) -> Result<(), ValueTypeError> {
    if value.is_null() {
        return Ok(());
    }
    match ty {
        AttrType::Bool => expect_kind(matches!(value, TreeValue::Bool(_)), ty, value, path),
        AttrType::Number => expect_kind(matches!(value, TreeValue::Number(_)), ty, value, path),
        AttrType::String => expect_kind(matches!(value, TreeValue::String(_)), ty, value, path),
        AttrType::List(elem) => {
            let items = expect_list(value, ty, path)?;
            for (i, item) in items.iter().enumerate() {
                validate_at(item, elem, &path.index(i))?;
            }
            Ok(())
        }
        AttrType::Set(elem) => {
            let items = expect_list(value, ty, path)?;
            for (i, item) in items.iter().enumerate() {
                validate_at(item, elem, &path.index(i))?;
                if items[..i].contains(item) {
                    return Err(ValueTypeError::DuplicateSetElement {
                        path: path.clone(),
                        index: i,
                    });
                }
            }
            Ok(())
        }
        AttrType::Map(elem) => {
            let TreeValue::Map(entries) = value else {
                return Err(mismatch(ty, value, path));
            };
            for (key, item) in entries {
                validate_at(item, elem, &path.key(key.as_str()))?;
            }
            Ok(())
        }
        AttrType::Object(fields) => {
            let TreeValue::Map(entries) = value else {
                return Err(mismatch(ty, value, path));
            };
            for (name, item) in entries {
                let Some(field_ty) = fields.get(name) else {
                    return Err(ValueTypeError::UnexpectedField {
                        path: path.clone(),
                        field: name.clone(),
                    });
                };
                validate_at(item, field_ty, &path.attr(name.as_str()))?;
            }
            Ok(())
        }
    }
}

fn expect_list<'a>(
    value: &'a TreeValue,
    ty: &AttrType,
    path: &AttributePath,
) -> Result<&'a [TreeValue], ValueTypeError> {
    value.as_list().ok_or_else(|| mismatch(ty, value, path))
}

fn expect_kind(
    matches: bool,
    ty: &AttrType,
    value: &TreeValue,
    path: &AttributePath,
) -> Result<(), ValueTypeError> {
    if matches {
        Ok(())
    } else {
        Err(mismatch(ty, value, path))
    }
}

fn mismatch(ty: &AttrType, value: &TreeValue, path: &AttributePath) -> ValueTypeError {
    ValueTypeError::TypeMismatch {
        path: path.clone(),
        expected: ty.kind(),
        found: value.kind(),
    }
}
