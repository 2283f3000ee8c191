use std::any::Any;

use stateup_types::TreeValue;

use crate::descriptor::{SchemaDescriptor, UpgradeContext};
use crate::error::UpgradeError;
use crate::flatmap::VersionedValue;
use crate::state::FlatAttributes;

/// Result of walking the upgrade chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub value: VersionedValue,
    /// Source versions of the upgraders that ran, in order.
    pub steps_applied: Vec<u64>,
}

/// Run the descriptor's legacy flat migration when the stored version is below its
/// target. Returns the (possibly rewritten) attributes and the version they are at.
pub fn apply_legacy_migration(
    descriptor: &SchemaDescriptor,
    attrs: FlatAttributes,
    version: u64,
    provider: &(dyn Any + Send + Sync),
) -> Result<(FlatAttributes, u64), UpgradeError> {
    let Some(legacy) = descriptor.legacy_migration() else {
        return Ok((attrs, version));
    };
    if version >= legacy.target_version {
        return Ok((attrs, version));
    }
    let ctx = UpgradeContext::new(version, descriptor, provider);
    let migrated = (legacy.migrate)(&ctx, attrs).map_err(|source| UpgradeError::UpgradeStep {
        at_version: version,
        source,
    })?;
    log::debug!(
        "{}: legacy flat migration {} -> {}",
        descriptor.resource_type(),
        version,
        legacy.target_version
    );
    Ok((migrated, legacy.target_version))
}

/// Apply upgraders for consecutive versions until the value reaches the
/// descriptor's current version. A missing step anywhere on the way is fatal.
pub fn run_upgrade_chain(
    descriptor: &SchemaDescriptor,
    decoded: VersionedValue,
    provider: &(dyn Any + Send + Sync),
) -> Result<ChainOutcome, UpgradeError> {
    let target = descriptor.version();
    let VersionedValue {
        mut version,
        mut value,
    } = decoded;
    if version > target {
        return Err(UpgradeError::UnsupportedVersion {
            found: version,
            current: target,
        });
    }

    let mut steps_applied = Vec::new();
    while version < target {
        let upgrader = descriptor
            .upgrader(version)
            .ok_or(UpgradeError::MissingUpgradeStep { version, target })?;
        let ctx = UpgradeContext::new(version, descriptor, provider);
        value = upgrader
            .apply(&ctx, value)
            .map_err(|source| UpgradeError::UpgradeStep {
                at_version: version,
                source,
            })?;
        if !matches!(value, TreeValue::Map(_)) {
            return Err(UpgradeError::UpgradeStep {
                at_version: version,
                source: anyhow::anyhow!("upgrader returned {}, expected an object", value.kind()),
            });
        }
        log::debug!(
            "{}: upgraded state {} -> {}",
            descriptor.resource_type(),
            version,
            version + 1
        );
        steps_applied.push(version);
        version += 1;
    }

    Ok(ChainOutcome {
        value: VersionedValue { version, value },
        steps_applied,
    })
}
