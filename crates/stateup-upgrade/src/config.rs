/// How the stored `schema_version` string is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionRadix {
    /// Detect `0x`, `0o`, `0b` and leading-zero octal prefixes, base 10 otherwise.
    #[default]
    Auto,
    /// Base 10 only.
    Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOptions {
    pub version_radix: VersionRadix,
    /// Copy the resource id into the working attributes under `id` before decoding.
    pub inject_id: bool,
    /// Fill absent list/set/map attributes with empty collections, not only nested blocks.
    pub normalize_collection_attributes: bool,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            version_radix: VersionRadix::Auto,
            inject_id: true,
            normalize_collection_attributes: true,
        }
    }
}

impl UpgradeOptions {
    /// Build options from `STATEUP_*` environment variables, falling back to defaults
    /// for anything unset or unrecognized.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let version_radix = match lookup("STATEUP_VERSION_RADIX").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("decimal") => VersionRadix::Decimal,
            Some(v) if v.eq_ignore_ascii_case("auto") => VersionRadix::Auto,
            _ => defaults.version_radix,
        };
        Self {
            version_radix,
            inject_id: parse_flag(lookup("STATEUP_INJECT_ID")).unwrap_or(defaults.inject_id),
            normalize_collection_attributes: parse_flag(lookup("STATEUP_NORMALIZE_ATTRIBUTES"))
                .unwrap_or(defaults.normalize_collection_attributes),
        }
    }
}

fn parse_flag(value: Option<String>) -> Option<bool> {
    match value?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
