use std::num::IntErrorKind;

use serde_json::Value;
use thiserror::Error;

use crate::config::VersionRadix;
use crate::state::{SCHEMA_VERSION_KEY, StateMeta};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("unexpected type {found} for {SCHEMA_VERSION_KEY}")]
    UnexpectedType { found: &'static str },
    #[error("'{text}' is not a valid schema version")]
    Invalid { text: String },
    #[error("schema version '{text}' is out of range")]
    OutOfRange { text: String },
}

/// Version the stored attributes were written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: u64,
    /// Whether meta carried a `schema_version` at all.
    pub explicit: bool,
}

pub fn resolve_version(
    meta: &StateMeta,
    radix: VersionRadix,
) -> Result<ResolvedVersion, VersionError> {
    let Some(raw) = meta.get(SCHEMA_VERSION_KEY) else {
        return Ok(ResolvedVersion {
            version: 0,
            explicit: false,
        });
    };
    let Value::String(text) = raw else {
        return Err(VersionError::UnexpectedType {
            found: json_kind(raw),
        });
    };
    Ok(ResolvedVersion {
        version: parse_version(text, radix)?,
        explicit: true,
    })
}

/// Parse a non-negative version that fits a signed 32-bit integer. `Auto`
/// accepts the usual base prefixes and `_` separators between digits.
pub fn parse_version(text: &str, radix: VersionRadix) -> Result<u64, VersionError> {
    let invalid = || VersionError::Invalid {
        text: text.to_string(),
    };
    let body = text.strip_prefix('+').unwrap_or(text);
    let (digits, base, prefixed) = match radix {
        VersionRadix::Decimal => (body, 10, false),
        VersionRadix::Auto => split_base_prefix(body),
    };

    let cleaned = if radix == VersionRadix::Auto {
        // A separator may follow a prefix but never lead a bare number.
        if (!prefixed && digits.starts_with('_')) || digits.ends_with('_') || digits.contains("__")
        {
            return Err(invalid());
        }
        digits.replace('_', "")
    } else {
        digits.to_string()
    };
    if cleaned.is_empty() || cleaned.starts_with(['+', '-']) {
        return Err(invalid());
    }

    match i32::from_str_radix(&cleaned, base) {
        Ok(v) => Ok(v.unsigned_abs().into()),
        Err(err) if *err.kind() == IntErrorKind::PosOverflow => Err(VersionError::OutOfRange {
            text: text.to_string(),
        }),
        Err(_) => Err(invalid()),
    }
}

fn split_base_prefix(body: &str) -> (&str, u32, bool) {
    let lower = body.get(..2).map(str::to_ascii_lowercase);
    match lower.as_deref() {
        Some("0x") => (&body[2..], 16, true),
        Some("0o") => (&body[2..], 8, true),
        Some("0b") => (&body[2..], 2, true),
        _ if body.len() > 1 && body.starts_with('0') => (&body[1..], 8, true),
        _ => (body, 10, false),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
