use std::any::Any;

use stateup_types::TreeValue;

use crate::chain::{apply_legacy_migration, run_upgrade_chain};
use crate::coerce::coerce_block;
use crate::config::UpgradeOptions;
use crate::descriptor::SchemaDescriptor;
use crate::error::UpgradeError;
use crate::flatmap::decode_state;
use crate::materialize::materialize_state;
use crate::normalize::normalize_value;
use crate::prune::remove_attributes;
use crate::state::PersistedState;
use crate::version::resolve_version;

/// A successfully upgraded resource state.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeOutcome {
    /// New state in the flat encoding, ready to be persisted by the caller.
    pub state: PersistedState,
    /// The same attributes as a structured value shaped by the current schema.
    pub value: TreeValue,
    /// Version the input was stored under (0 when unrecorded).
    pub from_version: u64,
    pub to_version: u64,
    /// Source versions of the typed upgraders that ran.
    pub steps_applied: Vec<u64>,
}

/// Upgrade one resource instance's state to `descriptor`'s current schema.
///
/// `provider` is handed to every upgrade function through
/// [`UpgradeContext::provider`](crate::UpgradeContext::provider). `state` is only
/// read, so on error the caller still holds the untouched original.
pub fn upgrade_resource_state(
    descriptor: &SchemaDescriptor,
    state: &PersistedState,
    provider: &(dyn Any + Send + Sync),
    options: &UpgradeOptions,
) -> Result<UpgradeOutcome, UpgradeError> {
    upgrade(descriptor, state, provider, options).inspect_err(|err| {
        log::warn!(
            "{}: failed to upgrade state for '{}': {err}",
            descriptor.resource_type(),
            state.id
        );
    })
}

/// Upgrade many instances independently; one failure does not affect the others.
pub fn upgrade_states(
    descriptor: &SchemaDescriptor,
    states: &[PersistedState],
    provider: &(dyn Any + Send + Sync),
    options: &UpgradeOptions,
) -> Vec<Result<UpgradeOutcome, UpgradeError>> {
    states
        .iter()
        .map(|state| upgrade_resource_state(descriptor, state, provider, options))
        .collect()
}

fn upgrade(
    descriptor: &SchemaDescriptor,
    state: &PersistedState,
    provider: &(dyn Any + Send + Sync),
    options: &UpgradeOptions,
) -> Result<UpgradeOutcome, UpgradeError> {
    let resolved = resolve_version(&state.meta, options.version_radix)?;
    log::debug!(
        "{}: '{}' stored at schema version {} (explicit: {})",
        descriptor.resource_type(),
        state.id,
        resolved.version,
        resolved.explicit
    );
    if resolved.version > descriptor.version() {
        return Err(UpgradeError::UnsupportedVersion {
            found: resolved.version,
            current: descriptor.version(),
        });
    }

    let mut attrs = state.attributes.clone();
    if options.inject_id {
        attrs.insert("id".to_string(), state.id.clone());
    }
    let (attrs, version) = apply_legacy_migration(descriptor, attrs, resolved.version, provider)?;

    let decode_type =
        descriptor
            .type_for_version(version)
            .ok_or(UpgradeError::MissingUpgradeStep {
                version,
                target: descriptor.version(),
            })?;
    let decoded = decode_state(&attrs, decode_type, version)?;

    let chain = run_upgrade_chain(descriptor, decoded, provider)?;
    let to_version = chain.value.version;

    let (pruned, removed) = remove_attributes(chain.value.value, descriptor.implied_type());
    if !removed.is_empty() {
        log::debug!(
            "{}: pruned {} attribute(s) no longer in the schema",
            descriptor.resource_type(),
            removed.len()
        );
    }

    let coerced = coerce_block(pruned, descriptor.block())?;
    let normalized = normalize_value(
        coerced,
        descriptor.block(),
        options.normalize_collection_attributes,
    );

    let new_state = materialize_state(
        &normalized,
        descriptor.implied_type(),
        state,
        resolved,
        to_version,
    )?;

    Ok(UpgradeOutcome {
        state: new_state,
        value: normalized,
        from_version: resolved.version,
        to_version,
        steps_applied: chain.steps_applied,
    })
}
